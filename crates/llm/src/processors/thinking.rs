//! Thinking processor (spec.md §4.2): Claude's `thinking` config →
//! upstream `thinkingConfig`.

use crate::{protocol::claude::ThinkingConfig as ClaudeThinking, upstream::ThinkingConfig};

/// Upstream models that currently support the thinking feature: the 2.5
/// family (spec.md §4.2: "the non-2.5 family").
pub fn model_supports_thinking(model: &str) -> bool {
    model.contains("2.5")
}

/// Compute the upstream `thinkingConfig` for a Claude `thinking` directive
/// (spec.md §4.2). Returns `None` when the client didn't send a `thinking`
/// block at all; callers should also omit the field entirely when the
/// model doesn't support thinking (spec.md §4.3).
pub fn process(directive: Option<&ClaudeThinking>, supports_thinking: bool, max_output_tokens: u32) -> Option<ThinkingConfig> {
    let directive = directive?;

    if !supports_thinking {
        return Some(ThinkingConfig { include_thoughts: false, thinking_budget: None });
    }

    match directive {
        ClaudeThinking::Disabled => Some(ThinkingConfig { include_thoughts: false, thinking_budget: Some(0) }),
        ClaudeThinking::Enabled { budget_tokens } => {
            let max = f64::from(max_output_tokens);
            let budget = match budget_tokens {
                Some(requested) => {
                    let upper = (max * 0.5).floor() as u32;
                    (*requested).clamp(256, upper.max(256))
                }
                None => {
                    let default = (max * 0.25).floor() as u32;
                    let upper = (max * 0.33).floor() as u32;
                    default.clamp(256, upper.max(256))
                }
            };
            Some(ThinkingConfig { include_thoughts: true, thinking_budget: Some(budget) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_model_drops_budget_unconditionally() {
        let directive = ClaudeThinking::Enabled { budget_tokens: Some(5000) };
        let config = process(Some(&directive), false, 4096).unwrap();
        assert!(!config.include_thoughts);
        assert_eq!(config.thinking_budget, None);
    }

    #[test]
    fn explicit_disable_zeroes_budget() {
        let config = process(Some(&ClaudeThinking::Disabled), true, 4096).unwrap();
        assert!(!config.include_thoughts);
        assert_eq!(config.thinking_budget, Some(0));
    }

    #[test]
    fn enabled_with_explicit_budget_clamps_to_half_max() {
        let directive = ClaudeThinking::Enabled { budget_tokens: Some(100_000) };
        let config = process(Some(&directive), true, 4096).unwrap();
        assert!(config.include_thoughts);
        assert_eq!(config.thinking_budget, Some(2048));
    }

    #[test]
    fn enabled_with_low_budget_clamps_to_floor() {
        let directive = ClaudeThinking::Enabled { budget_tokens: Some(10) };
        let config = process(Some(&directive), true, 4096).unwrap();
        assert_eq!(config.thinking_budget, Some(256));
    }

    #[test]
    fn enabled_without_budget_defaults_to_quarter_clamped_to_third() {
        let directive = ClaudeThinking::Enabled { budget_tokens: None };
        let config = process(Some(&directive), true, 4096).unwrap();
        assert_eq!(config.thinking_budget, Some(1024));
    }

    #[test]
    fn default_budget_never_below_256() {
        let directive = ClaudeThinking::Enabled { budget_tokens: None };
        let config = process(Some(&directive), true, 512).unwrap();
        assert_eq!(config.thinking_budget, Some(256));
    }

    #[test]
    fn absent_directive_yields_no_config() {
        assert!(process(None, true, 4096).is_none());
    }
}
