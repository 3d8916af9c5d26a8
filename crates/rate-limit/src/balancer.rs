//! Combine the blacklist and quota managers to pick one key per request
//! and record the outcome (spec.md §4.4).

use config::ModelLimits;
use dashmap::DashMap;
use jiff::Timestamp;
use secrecy::SecretString;

use crate::{
    blacklist::{BlacklistManager, BlacklistReason, BlacklistStore},
    hash::key_hash,
    log_store::{RequestLogRecord, RequestLogStore},
    quota::{QuotaManager, QuotaRejectionReason},
};

/// A candidate key as it arrives from the client's `Authorization`/
/// `x-goog-api-key` header (spec.md §6), still paired with its hash.
#[derive(Debug, Clone)]
pub struct ApiKeyCandidate {
    /// The raw key, owned for exactly one request (spec.md §3, §9).
    pub raw: SecretString,
    /// The key's durable, non-secret identifier.
    pub hash: String,
}

impl ApiKeyCandidate {
    /// Wrap a raw key string, computing its hash.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let hash = key_hash(&raw);
        Self { raw: SecretString::from(raw), hash }
    }
}

/// Why the balancer had to fall back rather than make a clean
/// quota/blacklist-respecting pick (spec.md §4.4: "Fallbacks").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// Every candidate was blacklisted; the soonest-to-expire one was
    /// returned anyway so the caller can surface a clear error.
    AllKeysBlacklistedFallback,
    /// Every non-blacklisted candidate was over quota; the first one was
    /// returned anyway.
    FallbackNoQuota,
}

impl FallbackReason {
    /// The wire/log string for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllKeysBlacklistedFallback => "all_keys_blacklisted_fallback",
            Self::FallbackNoQuota => "fallback_no_quota",
        }
    }
}

/// The balancer's pick for one request.
#[derive(Debug, Clone)]
pub struct SelectedKey {
    /// The raw key to send upstream.
    pub raw: SecretString,
    /// The key's hash, for logging/recording.
    pub hash: String,
    /// Set when the pick came from a fallback path rather than a clean
    /// selection.
    pub fallback: Option<FallbackReason>,
}

/// Why [`Balancer::select_key`] could not pick a key at all.
#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    /// No candidates were supplied.
    #[error("no API keys were supplied")]
    NoCandidates,
    /// The sole candidate is blacklisted (spec.md §4.4: single-candidate
    /// path, "authentication-class error").
    #[error("the supplied API key is quarantined ({reason})")]
    SoleCandidateBlacklisted {
        /// The quarantine reason.
        reason: BlacklistReason,
        /// When the quarantine lifts.
        expires_at: Timestamp,
    },
    /// The sole candidate is over quota (spec.md §4.4: single-candidate
    /// path, "rate-limit-class error carrying the resetting time").
    #[error("the supplied API key has exceeded its {reason} quota")]
    SoleCandidateQuotaExceeded {
        /// Which quota axis was exceeded.
        reason: QuotaRejectionReason,
        /// Best-effort reset time for the exceeded window.
        reset_at: Timestamp,
    },
}

/// Selects one key per request and records the outcome (spec.md §4.4).
pub struct Balancer<B, L> {
    blacklist: BlacklistManager<B>,
    quota: QuotaManager<L>,
    consecutive_auth_failures: DashMap<String, u32>,
}

impl<B: BlacklistStore, L: RequestLogStore> Balancer<B, L> {
    /// Build a balancer atop the blacklist and quota managers.
    pub fn new(blacklist: BlacklistManager<B>, quota: QuotaManager<L>) -> Self {
        Self {
            blacklist,
            quota,
            consecutive_auth_failures: DashMap::new(),
        }
    }

    /// Pick one key for `model` from `candidates` (spec.md §4.4).
    pub fn select_key(
        &self,
        candidates: &[ApiKeyCandidate],
        model: &str,
        limits: ModelLimits,
        estimated_tokens: u32,
        now: Timestamp,
    ) -> Result<SelectedKey, BalancerError> {
        match candidates {
            [] => Err(BalancerError::NoCandidates),
            [only] => self.select_single(only, model, limits, estimated_tokens, now),
            many => self.select_many(many, model, limits, estimated_tokens, now),
        }
    }

    fn select_single(
        &self,
        candidate: &ApiKeyCandidate,
        model: &str,
        limits: ModelLimits,
        estimated_tokens: u32,
        now: Timestamp,
    ) -> Result<SelectedKey, BalancerError> {
        if let Some(entry) = self.blacklist.get(&candidate.hash, now) {
            return Err(BalancerError::SoleCandidateBlacklisted {
                reason: entry.reason,
                expires_at: entry.expires_at,
            });
        }

        let decision = self
            .quota
            .has_quota_available(&candidate.hash, model, estimated_tokens, limits, now);

        if let Some(reason) = decision.reason {
            return Err(BalancerError::SoleCandidateQuotaExceeded {
                reason,
                reset_at: reset_time_for(reason, now),
            });
        }

        Ok(SelectedKey {
            raw: candidate.raw.clone(),
            hash: candidate.hash.clone(),
            fallback: None,
        })
    }

    fn select_many(
        &self,
        candidates: &[ApiKeyCandidate],
        model: &str,
        limits: ModelLimits,
        estimated_tokens: u32,
        now: Timestamp,
    ) -> Result<SelectedKey, BalancerError> {
        let pairs: Vec<(String, Timestamp)> = candidates.iter().map(|c| (c.hash.clone(), now)).collect();
        let (clear, blocked) = self.blacklist.filter(&pairs, now);

        let find = |hash: &str| candidates.iter().find(|c| c.hash == hash).expect("hash came from candidates");

        if clear.is_empty() {
            let (hash, _) = blocked
                .into_iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .expect("select_many only called with at least one candidate");

            let candidate = find(hash);
            return Ok(SelectedKey {
                raw: candidate.raw.clone(),
                hash: candidate.hash.clone(),
                fallback: Some(FallbackReason::AllKeysBlacklistedFallback),
            });
        }

        let mut scored: Vec<(&str, f64)> = clear
            .iter()
            .filter_map(|hash| {
                let decision = self.quota.has_quota_available(hash, model, estimated_tokens, limits, now);
                decision.available.then(|| (*hash, decision.utilization_score()))
            })
            .collect();

        if scored.is_empty() {
            let candidate = find(clear[0]);
            return Ok(SelectedKey {
                raw: candidate.raw.clone(),
                hash: candidate.hash.clone(),
                fallback: Some(FallbackReason::FallbackNoQuota),
            });
        }

        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("utilization scores are always finite"));
        let candidate = find(scored[0].0);

        Ok(SelectedKey {
            raw: candidate.raw.clone(),
            hash: candidate.hash.clone(),
            fallback: None,
        })
    }

    /// Record the outcome of an upstream call (spec.md §4.4: "After every
    /// upstream call the balancer is notified of the outcome").
    pub fn record_outcome(&self, outcome: CallOutcome<'_>, now: Timestamp) {
        let has_error = outcome.status_code >= 400;

        self.quota.record(RequestLogRecord {
            key_hash: outcome.key_hash.to_string(),
            model: outcome.model.to_string(),
            endpoint: outcome.endpoint.to_string(),
            response_time_ms: outcome.response_time_ms,
            status_code: outcome.status_code,
            prompt_tokens: outcome.prompt_tokens,
            completion_tokens: outcome.completion_tokens,
            stream: outcome.stream,
            has_error,
            timestamp: now,
        });

        if outcome.status_code == 429 {
            self.consecutive_auth_failures.remove(outcome.key_hash);

            let reason = outcome
                .error_body
                .and_then(|body| BlacklistReason::classify(429, body))
                .unwrap_or(BlacklistReason::RateLimited);

            self.blacklist.add(outcome.key_hash, reason, now);
            return;
        }

        if outcome.status_code == 401 || outcome.status_code == 403 {
            let count = {
                let mut entry = self.consecutive_auth_failures.entry(outcome.key_hash.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };

            if count >= 2 {
                self.blacklist.add(outcome.key_hash, BlacklistReason::AuthFailed, now);
            }

            return;
        }

        self.consecutive_auth_failures.remove(outcome.key_hash);

        if outcome.status_code < 400 {
            self.blacklist.release(outcome.key_hash);
        }
    }
}

/// Everything the balancer needs to record one completed upstream call.
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome<'a> {
    /// Hash of the key used.
    pub key_hash: &'a str,
    /// Upstream model id targeted.
    pub model: &'a str,
    /// Endpoint invoked.
    pub endpoint: &'a str,
    /// Upstream response time.
    pub response_time_ms: u64,
    /// Upstream (or synthesized) HTTP status.
    pub status_code: u16,
    /// Prompt tokens charged.
    pub prompt_tokens: u32,
    /// Completion tokens charged.
    pub completion_tokens: u32,
    /// Whether the streaming endpoint was used.
    pub stream: bool,
    /// Upstream error body text, when available, for reason classification.
    pub error_body: Option<&'a str>,
}

fn reset_time_for(reason: QuotaRejectionReason, now: Timestamp) -> Timestamp {
    use jiff::ToSpan;

    match reason {
        QuotaRejectionReason::RpmExceeded | QuotaRejectionReason::TpmExceeded => now + 60.seconds(),
        QuotaRejectionReason::RpdExceeded => {
            let zoned = now.to_zoned(jiff::tz::TimeZone::UTC);
            zoned
                .date()
                .tomorrow()
                .expect("date arithmetic in range")
                .to_zoned(jiff::tz::TimeZone::UTC)
                .expect("midnight is always a valid UTC instant")
                .timestamp()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::{BlacklistConfig, QuotaConfig};

    use super::*;
    use crate::{blacklist::InMemoryBlacklistStore, log_store::InMemoryRequestLogStore};

    fn limits() -> ModelLimits {
        ModelLimits { rpm: 100, tpm: 100_000, rpd: 1000 }
    }

    fn balancer() -> Balancer<InMemoryBlacklistStore, InMemoryRequestLogStore> {
        let blacklist = BlacklistManager::new(InMemoryBlacklistStore::new(Duration::from_secs(7 * 86_400)), BlacklistConfig::default());
        let quota = QuotaManager::new(InMemoryRequestLogStore::new(), QuotaConfig { enabled: true });
        Balancer::new(blacklist, quota)
    }

    #[test]
    fn single_candidate_happy_path() {
        let balancer = balancer();
        let candidate = ApiKeyCandidate::new("key-a");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        let selected = balancer.select_key(&[candidate.clone()], "gemini-2.5-flash", limits(), 100, now).unwrap();
        assert_eq!(selected.hash, candidate.hash);
        assert!(selected.fallback.is_none());
    }

    #[test]
    fn single_candidate_blacklisted_errors() {
        let balancer = balancer();
        let candidate = ApiKeyCandidate::new("key-a");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        balancer.blacklist.add(&candidate.hash, BlacklistReason::AuthFailed, now);

        let err = balancer.select_key(&[candidate], "gemini-2.5-flash", limits(), 100, now).unwrap_err();
        assert!(matches!(err, BalancerError::SoleCandidateBlacklisted { .. }));
    }

    #[test]
    fn multi_candidate_skips_blacklisted() {
        let balancer = balancer();
        let a = ApiKeyCandidate::new("key-a");
        let b = ApiKeyCandidate::new("key-b");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        balancer.blacklist.add(&a.hash, BlacklistReason::RpdExceeded, now);

        let selected = balancer.select_key(&[a.clone(), b.clone()], "gemini-2.5-flash", limits(), 100, now).unwrap();
        assert_eq!(selected.hash, b.hash);
    }

    #[test]
    fn all_blacklisted_falls_back_to_soonest_expiry() {
        let balancer = balancer();
        let a = ApiKeyCandidate::new("key-a");
        let b = ApiKeyCandidate::new("key-b");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        balancer.blacklist.add(&a.hash, BlacklistReason::AuthFailed, now);
        balancer.blacklist.add(&b.hash, BlacklistReason::RateLimited, now);

        let selected = balancer.select_key(&[a, b.clone()], "gemini-2.5-flash", limits(), 100, now).unwrap();
        assert_eq!(selected.hash, b.hash);
        assert_eq!(selected.fallback, Some(FallbackReason::AllKeysBlacklistedFallback));
    }

    #[test]
    fn picks_least_loaded_candidate() {
        use crate::log_store::RequestLogRecord;

        let balancer = balancer();
        let a = ApiKeyCandidate::new("key-a");
        let b = ApiKeyCandidate::new("key-b");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        for _ in 0..5 {
            balancer.quota.record(RequestLogRecord {
                key_hash: a.hash.clone(),
                model: "gemini-2.5-flash".to_string(),
                endpoint: "generateContent".to_string(),
                response_time_ms: 10,
                status_code: 200,
                prompt_tokens: 50,
                completion_tokens: 50,
                stream: false,
                has_error: false,
                timestamp: now,
            });
        }

        let selected = balancer.select_key(&[a, b.clone()], "gemini-2.5-flash", limits(), 100, now).unwrap();
        assert_eq!(selected.hash, b.hash);
    }

    #[test]
    fn records_rate_limit_outcome_into_blacklist() {
        let balancer = balancer();
        let candidate = ApiKeyCandidate::new("key-a");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        balancer.record_outcome(
            CallOutcome {
                key_hash: &candidate.hash,
                model: "gemini-2.5-flash",
                endpoint: "generateContent",
                response_time_ms: 50,
                status_code: 429,
                prompt_tokens: 0,
                completion_tokens: 0,
                stream: false,
                error_body: Some("daily quota exceeded"),
            },
            now,
        );

        assert!(balancer.blacklist.is_blacklisted(&candidate.hash, now));
    }

    #[test]
    fn blacklists_after_two_consecutive_auth_failures() {
        let balancer = balancer();
        let candidate = ApiKeyCandidate::new("key-a");
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        let outcome = CallOutcome {
            key_hash: &candidate.hash,
            model: "gemini-2.5-flash",
            endpoint: "generateContent",
            response_time_ms: 50,
            status_code: 401,
            prompt_tokens: 0,
            completion_tokens: 0,
            stream: false,
            error_body: Some("invalid key"),
        };

        balancer.record_outcome(outcome, now);
        assert!(!balancer.blacklist.is_blacklisted(&candidate.hash, now));

        balancer.record_outcome(outcome, now);
        assert!(balancer.blacklist.is_blacklisted(&candidate.hash, now));
    }
}
