//! Gateway-specific configuration: protocol endpoints, the static
//! model-mapping and per-model-limits tables, retry policy, quota
//! override, and blacklist TTLs (spec.md §3, §6).

use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Master switch; when `false` no gateway routes are mounted.
    pub enabled: bool,
    /// Per-dialect endpoint configuration.
    pub protocols: ProtocolsConfig,
    /// Client model name -> upstream Gemini model id.
    pub models: ModelMappingConfig,
    /// Per-model rate limit table.
    pub limits: ModelLimitsConfig,
    /// Upstream HTTP retry policy.
    pub retry: RetryPolicyConfig,
    /// Quota enforcement override.
    pub quota: QuotaConfig,
    /// Blacklist TTL-per-reason configuration.
    pub blacklist: BlacklistConfig,
    /// Default `max_tokens` substituted when the client omits or sends a
    /// non-positive value (spec.md §4.2, §8).
    pub default_max_tokens: u32,
    /// Default estimated token charge used for admission when the client
    /// request doesn't volunteer one (spec.md §4.6).
    pub default_estimated_tokens: u32,
    /// Maximum accepted request body size, checked before JSON decoding.
    pub max_body_bytes: usize,
    /// Retention window for request-log records (spec.md §3).
    pub retention_days: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            protocols: ProtocolsConfig::default(),
            models: ModelMappingConfig::default(),
            limits: ModelLimitsConfig::default(),
            retry: RetryPolicyConfig::default(),
            quota: QuotaConfig::default(),
            blacklist: BlacklistConfig::default(),
            default_max_tokens: 1024,
            default_estimated_tokens: 1000,
            max_body_bytes: 10 * 1024 * 1024,
            retention_days: 30,
        }
    }
}

impl GatewayConfig {
    /// Whether at least one client dialect is mounted.
    pub fn has_protocol_endpoints(&self) -> bool {
        self.protocols.openai.enabled || self.protocols.claude.enabled || self.protocols.gemini.enabled
    }
}

/// Per-dialect endpoint toggles.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolsConfig {
    /// OpenAI chat-completions dialect.
    pub openai: ProtocolEndpoint,
    /// Claude messages dialect.
    pub claude: ProtocolEndpoint,
    /// Native Gemini generate-content dialect.
    pub gemini: ProtocolEndpoint,
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            openai: ProtocolEndpoint {
                enabled: true,
                path: "/v1".to_string(),
            },
            claude: ProtocolEndpoint {
                enabled: true,
                path: "/v1".to_string(),
            },
            gemini: ProtocolEndpoint {
                enabled: true,
                path: "/v1beta".to_string(),
            },
        }
    }
}

/// A single dialect's mount point.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolEndpoint {
    /// Whether this dialect is mounted.
    pub enabled: bool,
    /// Path prefix the dialect's routes nest under.
    pub path: String,
}

impl Default for ProtocolEndpoint {
    fn default() -> Self {
        Self {
            enabled: true,
            path: String::new(),
        }
    }
}

/// Client-facing model name -> upstream Gemini model id, with a documented
/// fallback for unmapped names (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelMappingConfig {
    /// Explicit name mappings, checked first.
    pub map: IndexMap<String, String>,
    /// Upstream id used when a client model name has no entry in `map`.
    pub default: String,
}

impl Default for ModelMappingConfig {
    fn default() -> Self {
        Self {
            map: IndexMap::new(),
            default: "gemini-2.5-flash".to_string(),
        }
    }
}

impl ModelMappingConfig {
    /// Resolve a client-supplied model name to the upstream id.
    pub fn resolve<'a>(&'a self, client_model: &'a str) -> &'a str {
        self.map.get(client_model).map(String::as_str).unwrap_or(client_model)
    }
}

/// Published per-model rate limits (spec.md §3, §4.6).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelLimits {
    /// Requests per minute.
    pub rpm: u32,
    /// Tokens per minute.
    pub tpm: u32,
    /// Requests per day.
    pub rpd: u32,
}

/// Per-model limits table, keyed by upstream model id, with a fallback for
/// models absent from the table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelLimitsConfig {
    /// Explicit per-model entries.
    pub models: IndexMap<String, ModelLimits>,
    /// Upstream model id whose limits apply to models missing from `models`.
    pub default_model: String,
}

impl Default for ModelLimitsConfig {
    fn default() -> Self {
        let mut models = IndexMap::new();

        models.insert(
            "gemini-2.5-flash".to_string(),
            ModelLimits {
                rpm: 1000,
                tpm: 4_000_000,
                rpd: 10_000,
            },
        );

        models.insert(
            "gemini-2.5-pro".to_string(),
            ModelLimits {
                rpm: 360,
                tpm: 4_000_000,
                rpd: 5_000,
            },
        );

        Self {
            models,
            default_model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl ModelLimitsConfig {
    /// Look up the limits for `model`, falling back to `default_model`'s
    /// entry when `model` isn't in the table.
    pub fn limits_for(&self, model: &str) -> ModelLimits {
        self.models
            .get(model)
            .or_else(|| self.models.get(&self.default_model))
            .copied()
            .unwrap_or(ModelLimits {
                rpm: 60,
                tpm: 1_000_000,
                rpd: 1_000,
            })
    }
}

/// Exponential-backoff retry policy for the upstream HTTP call
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicyConfig {
    /// Maximum attempts per request (including the first).
    pub max_attempts: u32,
    /// Base delay for the exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay between attempts.
    pub max_delay_ms: u64,
    /// Per-attempt deadline.
    pub per_attempt_timeout_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            per_attempt_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicyConfig {
    /// The per-attempt deadline as a [`Duration`].
    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }
}

/// Documented emergency override for the quota manager (spec.md §9, Open
/// Question #2): disabling this must be explicit configuration, never the
/// default.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaConfig {
    /// When `false`, `hasQuotaAvailable` always returns available without
    /// reading storage. Logged at `warn!` on startup.
    pub enabled: bool,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// TTL-per-reason table for the blacklist (spec.md §4.5, §9 Open
/// Question #3). Values are left as configuration; only the relative
/// ordering is required: `auth_failed ≫ rpd_exceeded ≥ rate_limited`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlacklistConfig {
    /// TTL for `rate_limited` entries.
    pub rate_limited_secs: u64,
    /// TTL for `auth_failed` entries.
    pub auth_failed_secs: u64,
    /// Minimum TTL applied to a daily-quota entry even if the computed
    /// time-to-midnight is smaller (spec.md §8: "strictly ≥ now + 60s").
    pub min_daily_secs: u64,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            rate_limited_secs: 60,
            auth_failed_secs: 6 * 3600,
            min_daily_secs: 60,
        }
    }
}
