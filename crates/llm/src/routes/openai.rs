//! OpenAI chat-completions and embeddings routes (spec.md §6).

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::StreamExt;
use jiff::Timestamp;
use serde_json::Value;

use crate::{
    AppState,
    adapter::{self, Dialect},
    error::LlmError,
    ids, protocol,
    request::extract_context,
    transform, validators,
};

/// `POST /v1/chat/completions`.
pub async fn chat_completions(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = ids::request_id();

    let context = match extract_context(&headers, request_id.clone()) {
        Ok(context) => context,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &err),
    };

    if let Err(err) = validators::check_body_size(body.len(), state.config.llm.max_body_bytes) {
        return adapter::error_response(Dialect::OpenAi, &request_id, &err);
    }

    let request: protocol::openai::ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &LlmError::validation("body", err.to_string())),
    };

    if let Err(err) = validators::validate_openai(&request) {
        return adapter::error_response(Dialect::OpenAi, &request_id, &err);
    }

    let client_model = request.model.clone();
    let mapped_model = state.config.llm.models.resolve(&client_model).to_string();
    let limits = state.config.llm.limits.limits_for(&mapped_model);

    let (upstream_request, streaming) = match transform::openai::encode(&request, state.config.llm.default_max_tokens) {
        Ok(pair) => pair,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &err),
    };

    let selected = match state
        .balancer
        .select_key(&context.api_keys, &mapped_model, limits, state.config.llm.default_estimated_tokens, Timestamp::now())
    {
        Ok(key) => key,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &adapter::map_balancer_error(err)),
    };

    if streaming {
        stream_chat_completion(&state, &request_id, &client_model, &mapped_model, &upstream_request, &selected).await
    } else {
        unary_chat_completion(&state, &request_id, &client_model, &mapped_model, &upstream_request, &selected).await
    }
}

async fn unary_chat_completion(
    state: &Arc<AppState>,
    request_id: &str,
    client_model: &str,
    mapped_model: &str,
    upstream_request: &crate::upstream::UpstreamRequest,
    selected: &rate_limit::SelectedKey,
) -> Response {
    let (result, meta) = state.upstream.generate_content(mapped_model, upstream_request, &selected.raw, &state.config.llm.retry).await;

    match result {
        Ok(response) => {
            let usage = response.usage_metadata.unwrap_or_default();
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "chat.completions", &meta, usage.prompt_token_count, usage.candidates_token_count, false);

            match transform::openai::decode(&response, client_model) {
                Ok(decoded) => adapter::with_request_id(Json(decoded).into_response(), request_id),
                Err(err) => adapter::error_response(Dialect::OpenAi, request_id, &err),
            }
        }
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "chat.completions", &meta, 0, 0, false);
            adapter::error_response(Dialect::OpenAi, request_id, &err)
        }
    }
}

async fn stream_chat_completion(
    state: &Arc<AppState>,
    request_id: &str,
    client_model: &str,
    mapped_model: &str,
    upstream_request: &crate::upstream::UpstreamRequest,
    selected: &rate_limit::SelectedKey,
) -> Response {
    let (result, meta) = state
        .upstream
        .stream_generate_content(mapped_model, upstream_request, &selected.raw, &state.config.llm.retry)
        .await;

    let chunk_stream = match result {
        Ok(stream) => stream,
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, mapped_model, "chat.completions", &meta, 0, 0, true);
            return adapter::error_stream_response(Dialect::OpenAi, request_id, &err);
        }
    };

    let usage = Arc::new(Mutex::new(crate::upstream::UsageMetadata::default()));
    let usage_for_decode = usage.clone();
    let client_model_owned = client_model.to_string();

    let sse_stream = chunk_stream.flat_map(move |chunk| {
        if let Some(observed) = chunk.usage_metadata {
            *usage_for_decode.lock().expect("usage mutex poisoned") = observed;
        }
        let frames = transform::openai::decode_stream_chunk(&chunk, &client_model_owned);
        futures::stream::iter(frames.into_iter().map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data))))
    });

    let balancer = state.balancer.clone();
    let key_hash = selected.hash.clone();
    let model_owned = mapped_model.to_string();
    let meta_for_finish = meta.clone();

    let finished = adapter::with_finish(Box::pin(sse_stream), move || {
        let usage = *usage.lock().expect("usage mutex poisoned");
        adapter::record_outcome(&balancer, &key_hash, &model_owned, "chat.completions", &meta_for_finish, usage.prompt_token_count, usage.candidates_token_count, true);
    });

    adapter::with_request_id(Sse::new(finished).into_response(), request_id)
}

/// `POST /v1/embeddings`: an opaque passthrough to upstream `embedContent`
/// (spec.md §6: "details out of core") — no request/response translation,
/// only key selection, retry, and outcome recording.
pub async fn embeddings(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = ids::request_id();

    let context = match extract_context(&headers, request_id.clone()) {
        Ok(context) => context,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &err),
    };

    if let Err(err) = validators::check_body_size(body.len(), state.config.llm.max_body_bytes) {
        return adapter::error_response(Dialect::OpenAi, &request_id, &err);
    }

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &LlmError::validation("body", err.to_string())),
    };

    let client_model = value.get("model").and_then(Value::as_str).unwrap_or(&state.config.llm.models.default).to_string();
    let mapped_model = state.config.llm.models.resolve(&client_model).to_string();
    let limits = state.config.llm.limits.limits_for(&mapped_model);

    let selected = match state
        .balancer
        .select_key(&context.api_keys, &mapped_model, limits, state.config.llm.default_estimated_tokens, Timestamp::now())
    {
        Ok(key) => key,
        Err(err) => return adapter::error_response(Dialect::OpenAi, &request_id, &adapter::map_balancer_error(err)),
    };

    let (result, meta) = state.upstream.embed_content(&mapped_model, &value, &selected.raw, &state.config.llm.retry).await;
    adapter::record_outcome(&state.balancer, &selected.hash, &mapped_model, "embeddings", &meta, 0, 0, false);

    match result {
        Ok(body) => adapter::with_request_id(Json(body).into_response(), &request_id),
        Err(err) => adapter::error_response(Dialect::OpenAi, &request_id, &err),
    }
}
