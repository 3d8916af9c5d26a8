//! Per-key, per-model quota admission (spec.md §4.6).

use config::{ModelLimits, QuotaConfig};
use jiff::Timestamp;

use crate::log_store::{RequestLogRecord, RequestLogStore, WindowUsage};

/// Why a quota check rejected admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRejectionReason {
    /// Requests-per-minute would be exceeded.
    RpmExceeded,
    /// Tokens-per-minute would be exceeded.
    TpmExceeded,
    /// Requests-per-day would be exceeded.
    RpdExceeded,
}

impl QuotaRejectionReason {
    /// The wire/log string for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RpmExceeded => "rpm_exceeded",
            Self::TpmExceeded => "tpm_exceeded",
            Self::RpdExceeded => "rpd_exceeded",
        }
    }
}

/// The outcome of [`QuotaManager::has_quota_available`].
#[derive(Debug, Clone, Copy)]
pub struct QuotaDecision {
    /// Whether the request may be admitted.
    pub available: bool,
    /// Populated when `available` is `false`.
    pub reason: Option<QuotaRejectionReason>,
    /// Usage observed at decision time (including the estimated charge).
    pub usage: WindowUsage,
    /// The limits this decision was evaluated against.
    pub limits: ModelLimits,
}

impl QuotaDecision {
    /// Utilization-weighted load score used by the balancer
    /// (spec.md §4.4 step 4): `0.5*rpmUse + 0.3*tpmUse + 0.2*rpdUse`.
    pub fn utilization_score(&self) -> f64 {
        let rpm_use = f64::from(self.usage.requests_per_minute) / f64::from(self.limits.rpm.max(1));
        let tpm_use = f64::from(self.usage.tokens_per_minute) / f64::from(self.limits.tpm.max(1));
        let rpd_use = f64::from(self.usage.requests_per_day) / f64::from(self.limits.rpd.max(1));

        0.5 * rpm_use + 0.3 * tpm_use + 0.2 * rpd_use
    }
}

/// Reads recent usage and decides whether a key may be admitted for a
/// model (spec.md §4.6).
pub struct QuotaManager<S> {
    store: S,
    config: QuotaConfig,
}

impl<S: RequestLogStore> QuotaManager<S> {
    /// Build a manager over `store`. `config.enabled = false` is the
    /// documented emergency override (spec.md §9 Open Question #2): it
    /// always admits without reading storage.
    pub fn new(store: S, config: QuotaConfig) -> Self {
        if !config.enabled {
            log::warn!("quota enforcement is disabled by configuration override; all requests are admitted");
        }

        Self { store, config }
    }

    /// Decide whether `key_hash` may place one more request against
    /// `model`, charging `estimated_tokens` to the tokens-per-minute
    /// window (spec.md §4.6).
    pub fn has_quota_available(
        &self,
        key_hash: &str,
        model: &str,
        estimated_tokens: u32,
        limits: ModelLimits,
        now: Timestamp,
    ) -> QuotaDecision {
        if !self.config.enabled {
            return QuotaDecision {
                available: true,
                reason: None,
                usage: WindowUsage::default(),
                limits,
            };
        }

        let usage = match self.store.window_usage(key_hash, model, now) {
            Ok(usage) => usage,
            Err(err) => {
                log::warn!("quota read failed for {key_hash}/{model}, failing open: {err}");
                return QuotaDecision {
                    available: true,
                    reason: None,
                    usage: WindowUsage::default(),
                    limits,
                };
            }
        };

        let projected_tpm = usage.tokens_per_minute + estimated_tokens;

        let reason = if usage.requests_per_minute + 1 > limits.rpm {
            Some(QuotaRejectionReason::RpmExceeded)
        } else if projected_tpm > limits.tpm {
            Some(QuotaRejectionReason::TpmExceeded)
        } else if usage.requests_per_day + 1 > limits.rpd {
            Some(QuotaRejectionReason::RpdExceeded)
        } else {
            None
        };

        QuotaDecision {
            available: reason.is_none(),
            reason,
            usage: WindowUsage {
                tokens_per_minute: projected_tpm,
                ..usage
            },
            limits,
        }
    }

    /// Append a completed call's usage to the request log
    /// (spec.md §4.4: "appends a request-log record (fire-and-forget)").
    pub fn record(&self, record: RequestLogRecord) {
        if let Err(err) = self.store.append(record) {
            log::warn!("failed to append request-log record: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_store::InMemoryRequestLogStore;

    fn limits() -> ModelLimits {
        ModelLimits { rpm: 2, tpm: 1000, rpd: 10 }
    }

    #[test]
    fn admits_when_under_limits() {
        let store = InMemoryRequestLogStore::new();
        let manager = QuotaManager::new(store, QuotaConfig { enabled: true });
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        let decision = manager.has_quota_available("hash-a", "gemini-2.5-flash", 100, limits(), now);
        assert!(decision.available);
    }

    #[test]
    fn rejects_rpm_exceeded() {
        use crate::log_store::{RequestLogRecord, RequestLogStore as _};

        let store = InMemoryRequestLogStore::new();
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        for _ in 0..2 {
            store
                .append(RequestLogRecord {
                    key_hash: "hash-a".to_string(),
                    model: "gemini-2.5-flash".to_string(),
                    endpoint: "generateContent".to_string(),
                    response_time_ms: 10,
                    status_code: 200,
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    stream: false,
                    has_error: false,
                    timestamp: now,
                })
                .unwrap();
        }

        let manager = QuotaManager::new(store, QuotaConfig { enabled: true });
        let decision = manager.has_quota_available("hash-a", "gemini-2.5-flash", 100, limits(), now);

        assert!(!decision.available);
        assert_eq!(decision.reason, Some(QuotaRejectionReason::RpmExceeded));
    }

    #[test]
    fn disabled_override_always_admits() {
        let store = InMemoryRequestLogStore::new();
        let manager = QuotaManager::new(store, QuotaConfig { enabled: false });
        let now = Timestamp::from_second(1_700_000_000).unwrap();

        let decision = manager.has_quota_available("hash-a", "gemini-2.5-flash", 999_999, limits(), now);
        assert!(decision.available);
    }

    #[test]
    fn lower_utilization_scores_lower() {
        let lightly_used = QuotaDecision {
            available: true,
            reason: None,
            usage: WindowUsage { requests_per_minute: 1, tokens_per_minute: 10, requests_per_day: 1 },
            limits: limits(),
        };
        let heavily_used = QuotaDecision {
            usage: WindowUsage { requests_per_minute: 2, tokens_per_minute: 900, requests_per_day: 9 },
            ..lightly_used
        };

        assert!(lightly_used.utilization_score() < heavily_used.utilization_score());
    }
}
