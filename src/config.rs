/// Engine configuration, loaded from RON or built in code.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for the engine RNG.
    pub seed: u64,
    /// Participant utterances a dialogue may produce before it stops.
    pub max_steps: usize,
    /// Flush the context once this many utterances are resident. `None`
    /// flushes only on request.
    pub flush_after: Option<usize>,
    /// Utterances left resident after a flush.
    pub flush_keep: usize,
    /// Where flushed context lines go. `None` drops them.
    pub context_log: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
    /// `var_name` of the participant under evaluation. Falls back to the
    /// entity carrying the `main` attribute.
    pub primary: Option<String>,
    /// Chance that the primary participant is the agent in an evaluation
    /// dialogue.
    pub agent_prob: f64,
    /// Keys besides `location` whose values exclude each other.
    pub exclusive_keys: Vec<String>,
    /// Accept ground-truth answers the agent could not have observed.
    pub reward_ground_truth: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps: 10,
            flush_after: None,
            flush_keep: 0,
            context_log: None,
            error_log: None,
            primary: None,
            agent_prob: 0.5,
            exclusive_keys: Vec::new(),
            reward_ground_truth: true,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.agent_prob) {
            return Err(ConfigError::Invalid(format!(
                "agent_prob {} is outside [0, 1]",
                self.agent_prob
            )));
        }
        if let Some(after) = self.flush_after {
            if self.flush_keep >= after {
                return Err(ConfigError::Invalid(format!(
                    "flush_keep ({}) must be below flush_after ({after})",
                    self.flush_keep
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::parse_ron("(seed: 9, primary: Some(\"ada\"))").unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.primary.as_deref(), Some("ada"));
        assert_eq!(config.max_steps, EngineConfig::default().max_steps);
        assert!(config.reward_ground_truth);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            EngineConfig::parse_ron("(agent_prob: 1.5)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::parse_ron("(flush_after: Some(4), flush_keep: 4)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::parse_ron("(seed: \"x\")"),
            Err(ConfigError::Ron(_))
        ));
    }
}
