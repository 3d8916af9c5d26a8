//! The multi-protocol inference gateway's core (spec.md §1-§9): dialect
//! transformers hub through a single canonical Gemini wire shape, a
//! multi-key balancer picks and tracks upstream API keys, and an upstream
//! client retries transient failures. This crate owns no transport
//! binding; [`router`] returns an [`axum::Router`] the `server` crate
//! mounts behind its own middleware stack.

#![deny(missing_docs)]

pub mod adapter;
pub mod error;
pub mod ids;
pub mod processors;
pub mod protocol;
pub mod request;
pub mod routes;
pub mod transform;
pub mod upstream;
pub mod upstream_client;
pub mod validators;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::post};
use config::GatewayConfig;
use rate_limit::{Balancer, BlacklistManager, InMemoryBlacklistStore, InMemoryRequestLogStore, QuotaManager};

use crate::upstream_client::UpstreamClient;

/// The balancer instantiation this gateway runs: in-memory blacklist and
/// request-log stores (spec.md §3: durability is out of scope for this
/// core; a durable backend is a drop-in [`rate_limit::BlacklistStore`]/
/// [`rate_limit::RequestLogStore`] implementation).
pub type GatewayBalancer = Balancer<InMemoryBlacklistStore, InMemoryRequestLogStore>;

/// Shared state handed to every route handler.
pub struct AppState {
    /// The loaded gateway configuration.
    pub config: GatewayConfig,
    /// Key selection, quota, and blacklist bookkeeping.
    pub balancer: Arc<GatewayBalancer>,
    /// The upstream HTTP client.
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Build the shared state from configuration, wiring up the in-memory
    /// blacklist/quota stores (spec.md §4.4-§4.6).
    pub fn new(config: GatewayConfig, http: reqwest::Client) -> Self {
        let max_ttl = Duration::from_secs(config.blacklist.auth_failed_secs.max(config.blacklist.rate_limited_secs).max(86_400));
        let blacklist = BlacklistManager::new(InMemoryBlacklistStore::new(max_ttl), config.blacklist);
        let quota = QuotaManager::new(InMemoryRequestLogStore::new(), config.quota);

        Self {
            balancer: Arc::new(Balancer::new(blacklist, quota)),
            upstream: UpstreamClient::new(http),
            config,
        }
    }
}

/// Build the gateway's router, mounting only the dialects enabled in
/// configuration (spec.md §3, §6). Returns `None` entirely when the
/// gateway itself is disabled.
pub fn router(state: Arc<AppState>) -> Option<Router> {
    if !state.config.enabled {
        return None;
    }

    let mut router = Router::new();

    if state.config.protocols.openai.enabled {
        let openai = Router::new()
            .route("/chat/completions", post(routes::openai::chat_completions))
            .route("/embeddings", post(routes::openai::embeddings));
        router = router.nest(&state.config.protocols.openai.path, openai);
    }

    if state.config.protocols.claude.enabled {
        let claude = Router::new().route("/messages", post(routes::claude::messages));
        router = router.nest(&state.config.protocols.claude.path, claude);
    }

    if state.config.protocols.gemini.enabled {
        let gemini = Router::new().route("/models/{model_action}", post(routes::gemini::model_action));
        router = router.nest(&state.config.protocols.gemini.path, gemini);
    }

    Some(router.with_state(state))
}
