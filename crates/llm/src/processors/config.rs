//! Config processor (spec.md §4.2): a dialect's generation knobs → upstream
//! `generationConfig`.

use crate::upstream::GenerationConfig;

/// Maximum accepted stop sequences (spec.md §8).
const MAX_STOP_SEQUENCES: usize = 8;
/// Maximum accepted length, in characters, of one stop sequence (spec.md §8).
const MAX_STOP_SEQUENCE_LEN: usize = 120;

/// A dialect-neutral bundle of generation knobs, built by each
/// transformer's encode step from its own wire shape.
#[derive(Debug, Clone, Default)]
pub struct GenerationKnobs {
    /// Requested max output tokens; non-positive or absent falls back to
    /// the configured default (spec.md §4.2, §8).
    pub max_tokens: Option<i64>,
    /// Sampling temperature, dialect-range-checked by the validator
    /// already; clamped here to the upstream's accepted `[0,2]`.
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Top-k sampling count.
    pub top_k: Option<i64>,
    /// Stop sequences, truncated here to the upstream's accepted shape.
    pub stop_sequences: Option<Vec<String>>,
}

/// Build the upstream `generationConfig` from a dialect-neutral knob
/// bundle (spec.md §4.2).
pub fn process(knobs: &GenerationKnobs, default_max_tokens: u32) -> GenerationConfig {
    let max_output_tokens = match knobs.max_tokens {
        Some(value) if value > 0 => value as u32,
        _ => default_max_tokens,
    };

    let stop_sequences = knobs.stop_sequences.as_ref().map(|sequences| {
        sequences
            .iter()
            .take(MAX_STOP_SEQUENCES)
            .map(|s| s.chars().take(MAX_STOP_SEQUENCE_LEN).collect::<String>())
            .collect::<Vec<_>>()
    });

    GenerationConfig {
        max_output_tokens: Some(max_output_tokens),
        temperature: knobs.temperature.map(|t| t.clamp(0.0, 2.0)),
        top_p: knobs.top_p.map(|p| p.clamp(0.0, 1.0)),
        top_k: knobs.top_k.map(|k| k.clamp(1, 1000) as u32),
        stop_sequences,
        thinking_config: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_tokens_falls_back_to_default() {
        let knobs = GenerationKnobs { max_tokens: Some(0), ..Default::default() };
        let config = process(&knobs, 1024);
        assert_eq!(config.max_output_tokens, Some(1024));
    }

    #[test]
    fn absent_max_tokens_falls_back_to_default() {
        let config = process(&GenerationKnobs::default(), 1024);
        assert_eq!(config.max_output_tokens, Some(1024));
    }

    #[test]
    fn positive_max_tokens_passes_through() {
        let knobs = GenerationKnobs { max_tokens: Some(512), ..Default::default() };
        let config = process(&knobs, 1024);
        assert_eq!(config.max_output_tokens, Some(512));
    }

    #[test]
    fn stop_sequences_truncated_to_eight_entries_of_120_chars() {
        let long = "x".repeat(200);
        let sequences = (0..12).map(|_| long.clone()).collect();
        let knobs = GenerationKnobs { stop_sequences: Some(sequences), ..Default::default() };
        let config = process(&knobs, 1024);
        let stops = config.stop_sequences.unwrap();
        assert_eq!(stops.len(), 8);
        assert_eq!(stops[0].len(), 120);
    }

    #[test]
    fn temperature_clamped_to_upstream_range() {
        let knobs = GenerationKnobs { temperature: Some(5.0), ..Default::default() };
        let config = process(&knobs, 1024);
        assert_eq!(config.temperature, Some(2.0));
    }
}
