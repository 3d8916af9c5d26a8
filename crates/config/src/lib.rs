//! Typed configuration for the gateway's TOML config file.

#![deny(missing_docs)]

mod error;
mod llm;
mod loader;
mod server;

use std::path::Path;

pub use error::Error;
pub use llm::{
    BlacklistConfig, GatewayConfig, ModelLimits, ModelLimitsConfig, ModelMappingConfig, ProtocolEndpoint,
    ProtocolsConfig, QuotaConfig, RetryPolicyConfig,
};
use serde::Deserialize;
pub use server::{CorsConfig, HealthConfig, ServerConfig};

/// Main configuration structure for the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server binding configuration.
    pub server: ServerConfig,
    /// Gateway (protocol translation, balancing, retry) configuration.
    pub llm: GatewayConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validate cross-field invariants that `Deserialize` alone can't
    /// express (at least one dialect mounted, etc).
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use crate::Config;

    #[test]
    fn defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_debug_snapshot!(&config);
    }

    #[test]
    fn model_resolution_falls_back_to_client_name() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.llm.models.resolve("unmapped-model"), "unmapped-model");
    }

    #[test]
    fn model_resolution_uses_explicit_mapping() {
        let toml = indoc::indoc! {r#"
            [llm.models.map]
            "gpt-4o" = "gemini-2.5-pro"
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.llm.models.resolve("gpt-4o"), "gemini-2.5-pro");
    }
}
