//! The append-only request-log store (spec.md §3: "Request log record")
//! and the sliding-window reads the quota manager scans it with.

use dashmap::DashMap;
use jiff::Timestamp;

use crate::error::StorageError;

/// One completed upstream call, as appended by the balancer's post-call
/// recording path (spec.md §3, §4.4).
#[derive(Debug, Clone)]
pub struct RequestLogRecord {
    /// Hash of the API key used for the call.
    pub key_hash: String,
    /// Upstream model id the call targeted.
    pub model: String,
    /// Endpoint invoked (`generateContent` or `streamGenerateContent`).
    pub endpoint: String,
    /// Wall-clock response time of the upstream call.
    pub response_time_ms: u64,
    /// HTTP status code returned by upstream (or synthesized for local
    /// failures).
    pub status_code: u16,
    /// Prompt tokens charged to the call.
    pub prompt_tokens: u32,
    /// Completion tokens charged to the call.
    pub completion_tokens: u32,
    /// Whether the call used the streaming endpoint.
    pub stream: bool,
    /// Whether the call ended in an error.
    pub has_error: bool,
    /// When the call completed.
    pub timestamp: Timestamp,
}

impl RequestLogRecord {
    /// Total tokens charged (prompt + completion).
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Usage observed for a `(key hash, model)` pair over the quota manager's
/// three sliding windows (spec.md §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowUsage {
    /// Requests in the trailing 60s window.
    pub requests_per_minute: u32,
    /// Tokens in the trailing 60s window.
    pub tokens_per_minute: u32,
    /// Requests in the trailing 86400s window.
    pub requests_per_day: u32,
}

const MINUTE_SECS: i64 = 60;
const DAY_SECS: i64 = 86_400;

/// Storage contract for the append-only request log.
///
/// The concrete relational store is an external collaborator
/// (spec.md §1); this trait is the seam the quota manager and balancer
/// depend on. [`InMemoryRequestLogStore`] is the in-process reference
/// implementation used by default and by tests.
pub trait RequestLogStore: Send + Sync {
    /// Append one completed call. Fire-and-forget from the caller's
    /// perspective (spec.md §4.4): failures are logged, never surfaced.
    fn append(&self, record: RequestLogRecord) -> Result<(), StorageError>;

    /// Read usage for `(key_hash, model)` as of `now`, over the sliding
    /// windows the quota manager checks (spec.md §4.6).
    fn window_usage(&self, key_hash: &str, model: &str, now: Timestamp) -> Result<WindowUsage, StorageError>;

    /// Drop records older than `retention_days` (spec.md §3: "cleaned by
    /// retention policy").
    fn apply_retention(&self, retention_days: u32, now: Timestamp) -> Result<u64, StorageError>;
}

/// In-memory [`RequestLogStore`], keyed by API key hash.
///
/// Grounded on the teacher's span-per-storage-operation pattern
/// (`storage/redis/tracing.rs`): every public method wraps its body in a
/// [`fastrace`] local span so the managers built atop this trait get
/// per-key, per-operation observability regardless of which store backs
/// them.
#[derive(Default)]
pub struct InMemoryRequestLogStore {
    records: DashMap<String, Vec<RequestLogRecord>>,
}

impl InMemoryRequestLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestLogStore for InMemoryRequestLogStore {
    fn append(&self, record: RequestLogRecord) -> Result<(), StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:log_store:append");

        self.records.entry(record.key_hash.clone()).or_default().push(record);

        Ok(())
    }

    fn window_usage(&self, key_hash: &str, model: &str, now: Timestamp) -> Result<WindowUsage, StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:log_store:window_usage");

        let Some(entries) = self.records.get(key_hash) else {
            return Ok(WindowUsage::default());
        };

        let mut usage = WindowUsage::default();

        for record in entries.iter().filter(|r| r.model == model) {
            let age_secs = now.as_second() - record.timestamp.as_second();

            if age_secs < 0 {
                continue;
            }

            if age_secs < DAY_SECS {
                usage.requests_per_day += 1;
            }

            if age_secs < MINUTE_SECS {
                usage.requests_per_minute += 1;
                usage.tokens_per_minute += record.total_tokens();
            }
        }

        Ok(usage)
    }

    fn apply_retention(&self, retention_days: u32, now: Timestamp) -> Result<u64, StorageError> {
        let _span = fastrace::Span::enter_with_local_parent("rate_limit:log_store:apply_retention");

        let cutoff_secs = i64::from(retention_days) * DAY_SECS;
        let mut dropped = 0u64;

        for mut entries in self.records.iter_mut() {
            let before = entries.len();
            entries.retain(|r| now.as_second() - r.timestamp.as_second() <= cutoff_secs);
            dropped += (before - entries.len()) as u64;
        }

        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key_hash: &str, model: &str, tokens: u32, timestamp: Timestamp) -> RequestLogRecord {
        RequestLogRecord {
            key_hash: key_hash.to_string(),
            model: model.to_string(),
            endpoint: "generateContent".to_string(),
            response_time_ms: 120,
            status_code: 200,
            prompt_tokens: tokens / 2,
            completion_tokens: tokens - tokens / 2,
            stream: false,
            has_error: false,
            timestamp,
        }
    }

    #[test]
    fn counts_only_within_window() {
        let store = InMemoryRequestLogStore::new();
        let now = Timestamp::from_second(1_000_000).unwrap();

        store.append(record("hash-a", "gemini-2.5-flash", 100, now)).unwrap();
        store
            .append(record(
                "hash-a",
                "gemini-2.5-flash",
                100,
                now - std::time::Duration::from_secs(30),
            ))
            .unwrap();
        store
            .append(record(
                "hash-a",
                "gemini-2.5-flash",
                100,
                now - std::time::Duration::from_secs(120),
            ))
            .unwrap();

        let usage = store.window_usage("hash-a", "gemini-2.5-flash", now).unwrap();

        assert_eq!(usage.requests_per_minute, 2);
        assert_eq!(usage.tokens_per_minute, 200);
        assert_eq!(usage.requests_per_day, 3);
    }

    #[test]
    fn ignores_other_models() {
        let store = InMemoryRequestLogStore::new();
        let now = Timestamp::from_second(1_000_000).unwrap();

        store.append(record("hash-a", "gemini-2.5-pro", 100, now)).unwrap();

        let usage = store.window_usage("hash-a", "gemini-2.5-flash", now).unwrap();
        assert_eq!(usage.requests_per_minute, 0);
    }

    #[test]
    fn retention_drops_old_records() {
        let store = InMemoryRequestLogStore::new();
        let now = Timestamp::from_second(1_000_000).unwrap();

        store
            .append(record(
                "hash-a",
                "gemini-2.5-flash",
                10,
                now - std::time::Duration::from_secs(40 * 86_400),
            ))
            .unwrap();
        store.append(record("hash-a", "gemini-2.5-flash", 10, now)).unwrap();

        let dropped = store.apply_retention(30, now).unwrap();
        assert_eq!(dropped, 1);

        let usage = store.window_usage("hash-a", "gemini-2.5-flash", now).unwrap();
        assert_eq!(usage.requests_per_day, 1);
    }
}
