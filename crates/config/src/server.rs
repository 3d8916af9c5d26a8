//! HTTP server binding configuration.
//!
//! Auth, CORS, and request-logging middleware live outside the gateway's
//! core (spec §1); this module only holds the knobs the binding crate
//! needs at startup.

use std::net::SocketAddr;

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Health endpoint configuration.
    pub health: HealthConfig,
    /// CORS configuration. `None` falls back to the permissive default.
    pub cors: Option<CorsConfig>,
}

/// Health endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoints are exposed at all.
    pub enabled: bool,
    /// Base path for the health endpoints (`/health`, `/health/ready`, ...).
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
        }
    }
}

/// Allowed-origin list for the outer CORS layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Origins allowed to call the gateway. Ignored when `allow_any` is set.
    pub allow_origins: Vec<String>,
    /// Allow any origin, bypassing `allow_origins`.
    pub allow_any: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            allow_any: false,
        }
    }
}
