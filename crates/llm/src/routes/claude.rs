//! Claude messages route (spec.md §6, §9).

use std::{collections::VecDeque, pin::Pin, sync::Arc};

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::{Stream, StreamExt};
use jiff::Timestamp;

use crate::{
    AppState,
    adapter::{self, Dialect},
    error::LlmError,
    ids,
    processors::thinking,
    protocol::claude::{MessagesRequest, StreamEvent, ThinkingConfig as ClaudeThinking, Usage as ClaudeUsage},
    request::extract_context,
    transform, upstream, validators,
};

/// `POST /v1/messages`.
pub async fn messages(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = ids::request_id();

    let context = match extract_context(&headers, request_id.clone()) {
        Ok(context) => context,
        Err(err) => return adapter::error_response(Dialect::Claude, &request_id, &err),
    };

    if let Err(err) = validators::check_body_size(body.len(), state.config.llm.max_body_bytes) {
        return adapter::error_response(Dialect::Claude, &request_id, &err);
    }

    let request: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::Claude, &request_id, &LlmError::validation("body", err.to_string())),
    };

    if let Err(err) = validators::validate_claude(&request) {
        return adapter::error_response(Dialect::Claude, &request_id, &err);
    }

    let client_model = request.model.clone();
    let mapped_model = state.config.llm.models.resolve(&client_model).to_string();
    let limits = state.config.llm.limits.limits_for(&mapped_model);
    let supports_thinking = thinking::model_supports_thinking(&mapped_model);
    let thinking_enabled = matches!(request.thinking, Some(ClaudeThinking::Enabled { .. })) && supports_thinking;

    let (upstream_request, streaming) = match transform::claude::encode(&request, state.config.llm.default_max_tokens, supports_thinking) {
        Ok(pair) => pair,
        Err(err) => return adapter::error_response(Dialect::Claude, &request_id, &err),
    };

    let selected = match state
        .balancer
        .select_key(&context.api_keys, &mapped_model, limits, state.config.llm.default_estimated_tokens, Timestamp::now())
    {
        Ok(key) => key,
        Err(err) => return adapter::error_response(Dialect::Claude, &request_id, &adapter::map_balancer_error(err)),
    };

    if streaming {
        stream_messages(&state, &request_id, &client_model, &mapped_model, thinking_enabled, &upstream_request, &selected).await
    } else {
        unary_messages(&state, &request_id, &client_model, &mapped_model, thinking_enabled, &upstream_request, &selected).await
    }
}

async fn unary_messages(
    state: &Arc<AppState>,
    request_id: &str,
    client_model: &str,
    mapped_model: &str,
    thinking_enabled: bool,
    upstream_request: &upstream::UpstreamRequest,
    selected: &rate_limit::SelectedKey,
) -> Response {
    let (result, meta) = state.upstream.generate_content(mapped_model, upstream_request, &selected.raw, &state.config.llm.retry).await;

    match result {
        Ok(response) => {
            let usage = response.usage_metadata.unwrap_or_default();
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "messages", &meta, usage.prompt_token_count, usage.candidates_token_count, false);

            match transform::claude::decode(&response, client_model, thinking_enabled) {
                Ok(decoded) => adapter::with_request_id(Json(decoded).into_response(), request_id),
                Err(err) => adapter::error_response(Dialect::Claude, request_id, &err),
            }
        }
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "messages", &meta, 0, 0, false);
            adapter::error_response(Dialect::Claude, request_id, &err)
        }
    }
}

/// Drives [`transform::claude::StreamDecoder`] across the upstream chunk
/// stream, then appends its `finish()` events once the source is
/// exhausted (spec.md §9: the state machine closes on `message_stop`).
struct ClaudeStreamState {
    source: Pin<Box<dyn Stream<Item = upstream::UpstreamResponse> + Send>>,
    decoder: transform::claude::StreamDecoder,
    pending: VecDeque<StreamEvent>,
    finish_reason: Option<String>,
    usage: Arc<std::sync::Mutex<upstream::UsageMetadata>>,
    done: bool,
}

async fn next_claude_event(mut state: ClaudeStreamState) -> Option<(StreamEvent, ClaudeStreamState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Some((event, state));
        }

        if state.done {
            return None;
        }

        match state.source.next().await {
            Some(chunk) => {
                if let Some(candidate) = chunk.candidates.first()
                    && let Some(reason) = &candidate.finish_reason
                {
                    state.finish_reason = Some(reason.clone());
                }
                if let Some(observed) = chunk.usage_metadata {
                    *state.usage.lock().expect("usage mutex poisoned") = observed;
                }
                let events = state.decoder.feed(&chunk);
                state.pending.extend(events);
            }
            None => {
                let usage = *state.usage.lock().expect("usage mutex poisoned");
                let final_usage = ClaudeUsage { input_tokens: usage.prompt_token_count, output_tokens: usage.candidates_token_count };
                let events = state.decoder.finish(state.finish_reason.as_deref(), final_usage);
                state.pending.extend(events);
                state.done = true;
            }
        }
    }
}

async fn stream_messages(
    state: &Arc<AppState>,
    request_id: &str,
    client_model: &str,
    mapped_model: &str,
    thinking_enabled: bool,
    upstream_request: &upstream::UpstreamRequest,
    selected: &rate_limit::SelectedKey,
) -> Response {
    let (result, meta) = state
        .upstream
        .stream_generate_content(mapped_model, upstream_request, &selected.raw, &state.config.llm.retry)
        .await;

    let chunk_stream = match result {
        Ok(stream) => stream,
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "messages", &meta, 0, 0, true);
            return adapter::error_stream_response(Dialect::Claude, request_id, &err);
        }
    };

    let usage = Arc::new(std::sync::Mutex::new(upstream::UsageMetadata::default()));
    let decoder_state = ClaudeStreamState {
        source: chunk_stream,
        decoder: transform::claude::StreamDecoder::new(client_model.to_string(), thinking_enabled),
        pending: VecDeque::new(),
        finish_reason: None,
        usage: usage.clone(),
        done: false,
    };

    let event_stream = futures::stream::unfold(decoder_state, next_claude_event).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, std::convert::Infallible>(Event::default().data(data))
    });

    let balancer = state.balancer.clone();
    let key_hash = selected.hash.clone();
    let model_owned = mapped_model.to_string();
    let meta_for_finish = meta.clone();

    let finished = adapter::with_finish(Box::pin(event_stream), move || {
        let usage = *usage.lock().expect("usage mutex poisoned");
        adapter::record_outcome(&balancer, &key_hash, &model_owned, "messages", &meta_for_finish, usage.prompt_token_count, usage.candidates_token_count, true);
    });

    adapter::with_request_id(Sse::new(finished).into_response(), request_id)
}
