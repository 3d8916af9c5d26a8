//! Shared adapter-template plumbing (spec.md §4.7): the parts of the
//! eight-step request sequence that don't vary by dialect — balancer
//! error mapping, error rendering, the request-id stamp, and the
//! stream-outcome-on-drop wrapper. Each dialect's own wire types and
//! encode/decode calls stay in its own handler in [`crate::lib`].

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::{Stream, StreamExt};
use jiff::Timestamp;
use rate_limit::{Balancer, BalancerError, BlacklistStore, CallOutcome, RequestLogStore};
use serde_json::Value;

use crate::{
    error::LlmError,
    upstream_client::CallMeta,
};

/// Which client dialect a response or error must be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// OpenAI chat-completions.
    OpenAi,
    /// Claude messages.
    Claude,
    /// Native Gemini passthrough.
    Gemini,
}

impl Dialect {
    fn error_body(self, err: &LlmError) -> Value {
        match self {
            Dialect::OpenAi => err.to_openai_body(),
            Dialect::Claude => err.to_claude_body(),
            Dialect::Gemini => err.to_gemini_body(),
        }
    }
}

/// Render an [`LlmError`] as a unary JSON error response in `dialect`'s
/// native shape, carrying the request's correlation id (spec.md §7).
pub fn error_response(dialect: Dialect, request_id: &str, err: &LlmError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = dialect.error_body(err);
    with_request_id((status, Json(body)).into_response(), request_id)
}

/// Synthesize a single-frame SSE stream carrying the error (spec.md §4.7
/// step 5: "so the decoder path can format it in the client dialect
/// uniformly"). Used when a streaming request's upstream call fails
/// outright, before any chunk was produced — the client already expects
/// `text/event-stream` framing because it asked to stream, so the error
/// has to arrive in that shape rather than as a bare JSON body.
pub fn error_stream_response(dialect: Dialect, request_id: &str, err: &LlmError) -> Response {
    let frame = dialect.error_body(err);
    let error_event = Event::default().data(frame.to_string());

    let response = match dialect {
        Dialect::OpenAi => {
            let done_event = Event::default().data("[DONE]");
            let stream = futures::stream::iter(vec![error_event, done_event]).map(Ok::<_, std::convert::Infallible>);
            Sse::new(stream).into_response()
        }
        Dialect::Claude | Dialect::Gemini => {
            let stream = futures::stream::once(async move { Ok::<_, std::convert::Infallible>(error_event) });
            Sse::new(stream).into_response()
        }
    };

    with_request_id(response, request_id)
}

/// Stamp a response with the request's correlation id (spec.md §7: "every
/// response... carries a generated `x-request-id` header").
pub fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Map a [`BalancerError`] — the single-candidate paths of spec.md §4.4 —
/// into this gateway's error taxonomy.
pub fn map_balancer_error(err: BalancerError) -> LlmError {
    match err {
        BalancerError::NoCandidates => LlmError::Authentication("no API key supplied".to_string()),
        BalancerError::SoleCandidateBlacklisted { reason, expires_at } => {
            LlmError::Authentication(format!("the supplied API key is quarantined ({}) until {expires_at}", reason.as_str()))
        }
        BalancerError::SoleCandidateQuotaExceeded { reason, reset_at } => LlmError::RateLimit {
            message: format!("{} quota exceeded, resets at {reset_at}", reason.as_str()),
            retry_after_secs: seconds_until(reset_at),
        },
    }
}

fn seconds_until(at: Timestamp) -> Option<u64> {
    let delta = at.as_second() - Timestamp::now().as_second();
    u64::try_from(delta).ok()
}

/// Build a [`CallOutcome`] from an [`UpstreamClient`](crate::upstream_client::UpstreamClient)
/// call and notify the balancer (spec.md §4.4). `record_outcome` is a
/// synchronous, in-memory mutation with no I/O, so calling it directly
/// already satisfies "asynchronously record... without delaying the
/// client response" — there's nothing here a `tokio::spawn` would usefully
/// move off the response path.
#[allow(clippy::too_many_arguments)]
pub fn record_outcome<B: BlacklistStore, L: RequestLogStore>(
    balancer: &Balancer<B, L>,
    key_hash: &str,
    model: &str,
    endpoint: &str,
    meta: &CallMeta,
    prompt_tokens: u32,
    completion_tokens: u32,
    stream: bool,
) {
    balancer.record_outcome(
        CallOutcome {
            key_hash,
            model,
            endpoint,
            response_time_ms: meta.response_time_ms,
            status_code: meta.status,
            prompt_tokens,
            completion_tokens,
            stream,
            error_body: meta.error_body.as_deref(),
        },
        Timestamp::now(),
    );
}

/// Wrap a chunk stream so `on_finish` runs exactly once when the stream is
/// dropped, whether that's because it ran to completion or because the
/// client disconnected mid-stream (spec.md §5: "the task cancels by
/// dropping its end of the upstream streaming read... partial usage...
/// is still recorded").
pub fn with_finish<S>(source: S, on_finish: impl FnOnce() + Send + 'static) -> impl Stream<Item = S::Item> + Send
where
    S: Stream + Unpin + Send,
{
    FinishOnDrop { inner: source, finish: Some(Box::new(on_finish)) }
}

struct FinishOnDrop<S> {
    inner: S,
    finish: Option<Box<dyn FnOnce() + Send>>,
}

impl<S: Stream + Unpin> Stream for FinishOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for FinishOnDrop<S> {
    fn drop(&mut self) {
        if let Some(finish) = self.finish.take() {
            finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    #[tokio::test]
    async fn finish_runs_once_after_natural_exhaustion() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let source = futures::stream::iter(vec![1, 2, 3]);
        let wrapped = with_finish(source, move || flag.store(true, Ordering::SeqCst));
        let collected: Vec<_> = wrapped.collect().await;

        assert_eq!(collected, vec![1, 2, 3]);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn finish_runs_on_early_drop() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let source = futures::stream::iter(vec![1, 2, 3]);
        let wrapped = with_finish(source, move || flag.store(true, Ordering::SeqCst));
        drop(wrapped);

        assert!(ran.load(Ordering::SeqCst));
    }
}
