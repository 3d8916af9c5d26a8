//! Native Gemini routes (spec.md §6): `{model}:generateContent` and
//! `{model}:streamGenerateContent` share one path segment, split on `:`
//! the way the upstream API itself encodes them.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::StreamExt;
use jiff::Timestamp;

use crate::{
    AppState,
    adapter::{self, Dialect},
    error::LlmError,
    ids,
    request::extract_context,
    transform, upstream, validators,
};

/// `POST /v1beta/models/{model}:generateContent` or
/// `:streamGenerateContent`, dispatched on the action suffix.
pub async fn model_action(State(state): State<Arc<AppState>>, Path(model_action): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = ids::request_id();

    let Some((model, action)) = model_action.rsplit_once(':') else {
        return adapter::error_response(Dialect::Gemini, &request_id, &LlmError::NotFound(format!("malformed model/action path segment: {model_action}")));
    };

    match action {
        "generateContent" => generate_content(&state, &request_id, model, &headers, &body).await,
        "streamGenerateContent" => stream_generate_content(&state, &request_id, model, &headers, &body).await,
        other => adapter::error_response(Dialect::Gemini, &request_id, &LlmError::NotFound(format!("unknown action: {other}"))),
    }
}

async fn generate_content(state: &Arc<AppState>, request_id: &str, model: &str, headers: &HeaderMap, body: &Bytes) -> Response {
    let context = match extract_context(headers, request_id.to_string()) {
        Ok(context) => context,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &err),
    };

    if let Err(err) = validators::check_body_size(body.len(), state.config.llm.max_body_bytes) {
        return adapter::error_response(Dialect::Gemini, request_id, &err);
    }

    let request: upstream::UpstreamRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &LlmError::validation("body", err.to_string())),
    };

    let upstream_request = match transform::native::encode(request) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &err),
    };

    let mapped_model = state.config.llm.models.resolve(model).to_string();
    let limits = state.config.llm.limits.limits_for(&mapped_model);

    let selected = match state
        .balancer
        .select_key(&context.api_keys, &mapped_model, limits, state.config.llm.default_estimated_tokens, Timestamp::now())
    {
        Ok(key) => key,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &adapter::map_balancer_error(err)),
    };

    let (result, meta) = state.upstream.generate_content(&mapped_model, &upstream_request, &selected.raw, &state.config.llm.retry).await;

    match result {
        Ok(response) => {
            let usage = response.usage_metadata.unwrap_or_default();
            adapter::record_outcome(&state.balancer, &selected.hash, &mapped_model, "generateContent", &meta, usage.prompt_token_count, usage.candidates_token_count, false);
            let decoded = transform::native::decode(response);
            adapter::with_request_id(Json(decoded).into_response(), request_id)
        }
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, &mapped_model, "generateContent", &meta, 0, 0, false);
            adapter::error_response(Dialect::Gemini, request_id, &err)
        }
    }
}

async fn stream_generate_content(state: &Arc<AppState>, request_id: &str, model: &str, headers: &HeaderMap, body: &Bytes) -> Response {
    let context = match extract_context(headers, request_id.to_string()) {
        Ok(context) => context,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &err),
    };

    if let Err(err) = validators::check_body_size(body.len(), state.config.llm.max_body_bytes) {
        return adapter::error_response(Dialect::Gemini, request_id, &err);
    }

    let request: upstream::UpstreamRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &LlmError::validation("body", err.to_string())),
    };

    let upstream_request = match transform::native::encode(request) {
        Ok(request) => request,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &err),
    };

    let mapped_model = state.config.llm.models.resolve(model).to_string();
    let limits = state.config.llm.limits.limits_for(&mapped_model);

    let selected = match state
        .balancer
        .select_key(&context.api_keys, &mapped_model, limits, state.config.llm.default_estimated_tokens, Timestamp::now())
    {
        Ok(key) => key,
        Err(err) => return adapter::error_response(Dialect::Gemini, request_id, &adapter::map_balancer_error(err)),
    };

    let (result, meta) = state
        .upstream
        .stream_generate_content(&mapped_model, &upstream_request, &selected.raw, &state.config.llm.retry)
        .await;

    let chunk_stream = match result {
        Ok(stream) => stream,
        Err(err) => {
            adapter::record_outcome(&state.balancer, &selected.hash, &mapped_model, "streamGenerateContent", &meta, 0, 0, true);
            return adapter::error_stream_response(Dialect::Gemini, request_id, &err);
        }
    };

    let usage = std::sync::Arc::new(std::sync::Mutex::new(upstream::UsageMetadata::default()));
    let usage_for_decode = usage.clone();

    let sse_stream = chunk_stream.map(move |chunk| {
        if let Some(observed) = chunk.usage_metadata {
            *usage_for_decode.lock().expect("usage mutex poisoned") = observed;
        }
        let decoded = transform::native::decode(chunk);
        let data = serde_json::to_string(&decoded).unwrap_or_default();
        Ok::<_, std::convert::Infallible>(Event::default().data(data))
    });

    let balancer = state.balancer.clone();
    let key_hash = selected.hash.clone();
    let model_owned = mapped_model.clone();
    let meta_for_finish = meta.clone();

    let finished = adapter::with_finish(Box::pin(sse_stream), move || {
        let usage = *usage.lock().expect("usage mutex poisoned");
        adapter::record_outcome(&balancer, &key_hash, &model_owned, "streamGenerateContent", &meta_for_finish, usage.prompt_token_count, usage.candidates_token_count, true);
    });

    adapter::with_request_id(Sse::new(finished).into_response(), request_id)
}
