// src/utils/config.rs
//! Episode configuration.
//!
//! `EnvConfig` carries trainer-level settings shared by every episode;
//! `EnvExtras` carries the per-sample fields (ground truth, turn budget).

use crate::env::reward::GroundTruth;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MAX_TURNS: usize = 2;

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Registered tool call parser name, e.g. `qwen3` or `glm4`
    pub tool_call_parser: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSpec {
    pub ground_truth: GroundTruth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvExtras {
    pub reward_spec: RewardSpec,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

/// Load a JSON config file
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open config {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extras_default_max_turns() {
        let extras: EnvExtras =
            serde_json::from_value(json!({"reward_spec": {"ground_truth": {"target": "Paris"}}}))
                .unwrap();
        assert_eq!(extras.max_turns, DEFAULT_MAX_TURNS);
        assert_eq!(extras.reward_spec.ground_truth.target, vec!["Paris"]);
    }

    #[test]
    fn extras_require_ground_truth() {
        let err = serde_json::from_value::<EnvExtras>(json!({"reward_spec": {}, "max_turns": 4}));
        assert!(err.is_err());
        let err = serde_json::from_value::<EnvExtras>(json!({"max_turns": 4}));
        assert!(err.is_err());
    }

    #[test]
    fn load_json_reports_missing_file() {
        let err = load_json::<EnvConfig>("/nonexistent/browse-rs/config.json").unwrap_err();
        assert!(err.to_string().contains("failed to open config"));
    }
}
