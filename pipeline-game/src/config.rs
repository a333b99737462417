//! Engine tuning knobs, loadable from JSON.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{DEFAULT_TRANSITION_DELAY_MS, MAX_TRANSITION_DELAY_MS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("transition delay of {0} ms exceeds the 60000 ms limit")]
    DelayTooLong(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pause between a selection and its commit.
    pub transition_delay_ms: u64,
    /// Seed for the hook RNG stream.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transition_delay_ms: DEFAULT_TRANSITION_DELAY_MS,
            seed: 0,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.transition_delay_ms = delay_ms;
        self
    }

    /// Parse and validate a JSON config; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::DelayTooLong`] when the delay exceeds the limit.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.transition_delay_ms > MAX_TRANSITION_DELAY_MS {
            return Err(ConfigError::DelayTooLong(self.transition_delay_ms));
        }
        Ok(())
    }

    #[must_use]
    pub const fn transition_delay(&self) -> Duration {
        Duration::from_millis(self.transition_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.transition_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_json(r#"{"seed": 99}"#).unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.transition_delay_ms, DEFAULT_TRANSITION_DELAY_MS);
    }

    #[test]
    fn rejects_long_delays_and_bad_json() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"transition_delay_ms": 60001}"#),
            Err(ConfigError::DelayTooLong(60_001))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
        assert!(EngineConfig::default().with_delay_ms(0).validate().is_ok());
    }
}
