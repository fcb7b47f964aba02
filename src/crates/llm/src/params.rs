//! Generation parameters.
//!
//! Parameters travel as a loose JSON map so model definitions, run
//! configuration and provider clients can each contribute keys without a
//! shared struct. Clients pick out the keys they understand.

use serde_json::{Map, Value};

/// Generation parameters keyed by name (`temperature`, `max_tokens`, ...).
pub type Parameters = Map<String, Value>;

/// Sampling temperature.
pub const TEMPERATURE: &str = "temperature";
/// Nucleus sampling.
pub const TOP_P: &str = "top_p";
/// Top-k sampling (Gemini, Anthropic).
pub const TOP_K: &str = "top_k";
/// Maximum output tokens.
pub const MAX_TOKENS: &str = "max_tokens";
/// Frequency penalty (OpenAI-compatible).
pub const FREQUENCY_PENALTY: &str = "frequency_penalty";
/// Presence penalty (OpenAI-compatible).
pub const PRESENCE_PENALTY: &str = "presence_penalty";
/// Stop sequences.
pub const STOP: &str = "stop";
/// Reasoning effort for OpenAI reasoning models.
pub const REASONING_EFFORT: &str = "reasoning_effort";

/// Read a float parameter.
pub fn get_f32(params: &Parameters, key: &str) -> Option<f32> {
    params.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

/// Read a non-negative integer parameter.
///
/// Accepts floats with no fractional part, which is how TOML/YAML configs
/// sometimes hand them over.
pub fn get_usize(params: &Parameters, key: &str) -> Option<usize> {
    let value = params.get(key)?;
    if let Some(n) = value.as_u64() {
        return usize::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
        .map(|f| f as usize)
}

/// Read a string parameter.
pub fn get_str<'a>(params: &'a Parameters, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Read stop sequences; a single string is treated as one sequence.
pub fn get_stop(params: &Parameters) -> Option<Vec<String>> {
    match params.get(STOP)? {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => {
            let stops: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if stops.is_empty() {
                None
            } else {
                Some(stops)
            }
        }
        _ => None,
    }
}

/// Overlay `overrides` on top of `base`, returning the merged map.
pub fn merge(base: &Parameters, overrides: &Parameters) -> Parameters {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
