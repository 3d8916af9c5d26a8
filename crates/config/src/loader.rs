//! TOML loading and cross-field validation for [`Config`].

use std::path::Path;

use anyhow::bail;
use indoc::indoc;

use crate::Config;

/// Load and validate configuration from a TOML file.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(crate::Error::ConfigOpen)?;

    let config: Config = toml::from_str(&content).map_err(crate::Error::ConfigParse)?;

    validate(&config)?;

    Ok(config)
}

/// Cross-field invariants `Deserialize` alone can't express.
pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    if config.llm.enabled && !config.llm.has_protocol_endpoints() {
        bail!(indoc! {r#"
            The gateway is enabled but no protocol endpoint is mounted. At
            least one of [llm.protocols.openai], [llm.protocols.claude], or
            [llm.protocols.gemini] must have `enabled = true`.
        "#});
    }

    if config.llm.retry.max_attempts == 0 {
        bail!("llm.retry.max_attempts must be at least 1");
    }

    if config.llm.default_max_tokens == 0 {
        bail!("llm.default_max_tokens must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::Config;

    #[test]
    fn rejects_no_protocol_endpoints() {
        let toml = indoc! {r#"
            [llm.protocols.openai]
            enabled = false
            [llm.protocols.claude]
            enabled = false
            [llm.protocols.gemini]
            enabled = false
        "#};

        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.validate().is_ok());
    }
}
