//! The upstream HTTP call (spec.md §4.7, §6): POSTs the canonical request
//! to Gemini's `generateContent`/`streamGenerateContent` endpoints and
//! retries transient failures with exponential backoff and jitter.
//!
//! Grounded on the teacher's `provider/google.rs`: the status-to-error
//! mapping and the `eventsource_stream::Eventsource` SSE decode follow its
//! shape. Two deliberate departures, both spec-mandated: the chosen key
//! travels in the `x-goog-api-key` header rather than a `?key=` query
//! parameter, and failures land in this gateway's closed taxonomy
//! ([`LlmError`]) instead of the teacher's open `LlmError` enum.

use std::time::{Duration, Instant};

use config::RetryPolicyConfig;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

use crate::{
    error::{LlmError, Result},
    upstream::{UpstreamRequest, UpstreamResponse},
};

/// `POST .../{model}:embedContent`'s response shape is left as opaque JSON
/// (spec.md §6: "passthrough... details out of core") rather than modeled
/// field-by-field.
pub type EmbeddingBody = serde_json::Value;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Status codes worth a retry (spec.md §4.7).
const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504, 520, 521, 522, 523, 524];

/// One completed (possibly retried) HTTP exchange's bookkeeping, common to
/// the unary and streaming paths so the caller can build one
/// [`rate_limit::CallOutcome`] regardless of shape.
#[derive(Debug, Clone)]
pub struct CallMeta {
    /// The upstream (or synthesized) HTTP status.
    pub status: u16,
    /// Wall-clock time spent on the call, including retries.
    pub response_time_ms: u64,
    /// Upstream error body text, present only on a non-2xx terminal
    /// response, for the balancer's blacklist-reason classification
    /// (spec.md §4.4).
    pub error_body: Option<String>,
}

/// Thin wrapper over a [`reqwest::Client`] implementing the retry policy.
/// One instance is shared across the process (spec.md §5: "a small pool of
/// OS threads", one connection pool reused across requests).
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Wrap an already-built client.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// `POST .../{model}:generateContent` (spec.md §4.7 steps 4, 6).
    pub async fn generate_content(&self, model: &str, body: &UpstreamRequest, api_key: &SecretString, retry: &RetryPolicyConfig) -> (Result<UpstreamResponse>, CallMeta) {
        let url = format!("{BASE_URL}/models/{model}:generateContent");
        let started = Instant::now();

        match self.send_with_retry(&url, body, api_key, retry, false).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let meta = CallMeta { status, response_time_ms: elapsed_ms(started), error_body: None };

                let text = match response.text().await {
                    Ok(text) => text,
                    Err(err) => return (Err(LlmError::Transform(format!("failed to read upstream response body: {err}"))), meta),
                };

                match serde_json::from_str::<UpstreamResponse>(&text) {
                    Ok(parsed) if !parsed.candidates.is_empty() => (Ok(parsed), meta),
                    Ok(_) => (Err(LlmError::UpstreamApi { status, message: "upstream response has no candidates".to_string() }), meta),
                    Err(err) => (Err(LlmError::Transform(format!("invalid upstream response: {err}"))), meta),
                }
            }
            Err((error, meta)) => (Err(error), meta),
        }
    }

    /// `POST .../{model}:streamGenerateContent?alt=sse` (spec.md §4.7 steps
    /// 4-5). On a non-2xx initial response the error is returned so the
    /// caller can synthesize a single-frame SSE error stream (step 5);
    /// malformed SSE frames are logged and skipped without aborting the
    /// stream (spec.md §4.3).
    pub async fn stream_generate_content(
        &self,
        model: &str,
        body: &UpstreamRequest,
        api_key: &SecretString,
        retry: &RetryPolicyConfig,
    ) -> (Result<std::pin::Pin<Box<dyn Stream<Item = UpstreamResponse> + Send>>>, CallMeta) {
        let url = format!("{BASE_URL}/models/{model}:streamGenerateContent?alt=sse");
        let started = Instant::now();

        match self.send_with_retry(&url, body, api_key, retry, true).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let meta = CallMeta { status, response_time_ms: elapsed_ms(started), error_body: None };

                let event_stream = response.bytes_stream().eventsource();
                let chunk_stream = event_stream.filter_map(|event| async move {
                    let event = match event {
                        Ok(event) => event,
                        Err(err) => {
                            log::warn!("SSE parsing error in upstream stream: {err}");
                            return None;
                        }
                    };

                    match serde_json::from_str::<UpstreamResponse>(&event.data) {
                        Ok(chunk) => Some(chunk),
                        Err(err) => {
                            log::warn!("failed to parse upstream streaming chunk: {err}");
                            None
                        }
                    }
                });

                (Ok(Box::pin(chunk_stream) as std::pin::Pin<Box<dyn Stream<Item = UpstreamResponse> + Send>>), meta)
            }
            Err((error, meta)) => (Err(error), meta),
        }
    }

    /// `POST .../{model}:embedContent`, a thin opaque-JSON passthrough
    /// (spec.md §6: embeddings support is "details out of core" — no
    /// dialect translation, just key selection and retry).
    pub async fn embed_content(&self, model: &str, body: &EmbeddingBody, api_key: &SecretString, retry: &RetryPolicyConfig) -> (Result<EmbeddingBody>, CallMeta) {
        let url = format!("{BASE_URL}/models/{model}:embedContent");
        let started = Instant::now();

        match self.send_with_retry(&url, body, api_key, retry, false).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let meta = CallMeta { status, response_time_ms: elapsed_ms(started), error_body: None };

                match response.json::<EmbeddingBody>().await {
                    Ok(parsed) => (Ok(parsed), meta),
                    Err(err) => (Err(LlmError::Transform(format!("invalid upstream embedding response: {err}"))), meta),
                }
            }
            Err((error, meta)) => (Err(error), meta),
        }
    }

    /// Send with up to `retry.max_attempts` tries, retrying only transient
    /// network errors and [`RETRYABLE_STATUSES`] (spec.md §4.7). Returns
    /// the successful response, or the classified terminal error paired
    /// with the [`CallMeta`] it observed.
    async fn send_with_retry<T>(&self, url: &str, body: &T, api_key: &SecretString, retry: &RetryPolicyConfig, streaming: bool) -> std::result::Result<reqwest::Response, (LlmError, CallMeta)>
    where
        T: serde::Serialize + ?Sized,
    {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let mut request = self.http.post(url).header("x-goog-api-key", api_key.expose_secret()).header(reqwest::header::CONTENT_TYPE, "application/json");

            if streaming {
                request = request.header(reqwest::header::ACCEPT, "text/event-stream");
            }

            log::debug!("upstream call attempt {attempt}/{} ({})", retry.max_attempts, redacted_url(url));

            let sent = tokio::time::timeout(retry.per_attempt_timeout(), request.json(body).send()).await;

            match sent {
                Ok(Ok(response)) if response.status().is_success() => return Ok(response),
                Ok(Ok(response)) => {
                    let status = response.status().as_u16();
                    let retryable = RETRYABLE_STATUSES.contains(&status);

                    if !retryable || attempt >= retry.max_attempts {
                        let message = response.text().await.unwrap_or_else(|_| "<unreadable upstream body>".to_string());
                        let meta = CallMeta { status, response_time_ms: elapsed_ms(started), error_body: Some(message.clone()) };
                        return Err((classify_status(status, message), meta));
                    }

                    log::warn!("upstream call returned retryable status {status}, attempt {attempt}/{}", retry.max_attempts);
                }
                Ok(Err(err)) => {
                    if attempt >= retry.max_attempts {
                        let meta = CallMeta { status: 502, response_time_ms: elapsed_ms(started), error_body: Some(err.to_string()) };
                        return Err((LlmError::UpstreamApi { status: 502, message: format!("upstream connection failed: {err}") }, meta));
                    }
                    log::warn!("upstream connection error, attempt {attempt}/{}: {err}", retry.max_attempts);
                }
                Err(_elapsed) => {
                    if attempt >= retry.max_attempts {
                        let meta = CallMeta { status: 408, response_time_ms: elapsed_ms(started), error_body: None };
                        return Err((LlmError::Timeout, meta));
                    }
                    log::warn!("upstream call timed out after {:?}, attempt {attempt}/{}", retry.per_attempt_timeout(), retry.max_attempts);
                }
            }

            tokio::time::sleep(backoff_delay(attempt, retry)).await;
        }
    }
}

/// Map a terminal non-2xx upstream status to this gateway's error taxonomy
/// (spec.md §4.8), mirroring the teacher's `provider/google.rs` status
/// match but onto the closed `LlmError` kinds.
fn classify_status(status: u16, message: String) -> LlmError {
    match status {
        401 => LlmError::Authentication(message),
        403 => LlmError::Permission(message),
        404 => LlmError::NotFound(message),
        429 => LlmError::RateLimit { message, retry_after_secs: None },
        400 => LlmError::Validation { field: "body".to_string(), message },
        _ => LlmError::UpstreamApi { status, message },
    }
}

/// Exponential backoff with full jitter: `random(0, base * 2^(attempt-1))`,
/// capped at `max_delay_ms` (spec.md §4.7: "exponential-backoff retry
/// policy with jitter").
fn backoff_delay(attempt: u32, retry: &RetryPolicyConfig) -> Duration {
    let exp = retry.base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let capped = exp.min(retry.max_delay_ms);
    let jittered = rand::rng().random_range(0..=capped.max(1));
    Duration::from_millis(jittered)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// The gateway never puts the key in the URL (spec.md §4.7 diverges from
/// the teacher's `?key=` convention), so this only exists to keep the log
/// line future-proof against a URL shape that does carry one.
fn redacted_url(url: &str) -> String {
    match url.split_once('?') {
        Some((path, _query)) => format!("{path}?<redacted>"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_statuses() {
        assert!(matches!(classify_status(401, "x".into()), LlmError::Authentication(_)));
        assert!(matches!(classify_status(403, "x".into()), LlmError::Permission(_)));
        assert!(matches!(classify_status(404, "x".into()), LlmError::NotFound(_)));
        assert!(matches!(classify_status(429, "x".into()), LlmError::RateLimit { .. }));
        assert!(matches!(classify_status(503, "x".into()), LlmError::UpstreamApi { status: 503, .. }));
    }

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let retry = RetryPolicyConfig { max_attempts: 5, base_delay_ms: 200, max_delay_ms: 1_000, per_attempt_timeout_ms: 30_000 };
        for attempt in 1..=8 {
            let delay = backoff_delay(attempt, &retry);
            assert!(delay.as_millis() <= 1_000);
        }
    }

    #[test]
    fn redacted_url_strips_query_string() {
        assert_eq!(redacted_url("https://example.com/x?key=secret"), "https://example.com/x?<redacted>");
        assert_eq!(redacted_url("https://example.com/x"), "https://example.com/x");
    }
}
