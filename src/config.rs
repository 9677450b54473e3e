//! Engine configuration.
//!
//! Built once at startup and handed to [`crate::engine::Engine`] by value;
//! nothing else in the crate reads configuration from the environment.
//!
//! ```
//! use tee_sheet::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     title = "Sunday Swindle"
//!     max_group_size = 4
//!
//!     [slots]
//!     start_time = "08:00"
//!     interval_minutes = 8
//!     num_slots = 3
//! "#).unwrap();
//!
//! assert_eq!(config.min_group_size, 3);
//! assert_eq!(config.slots.num_slots, 3);
//! ```

use std::path::Path;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::slot_utils::{parse_slot_time, SlotConfig};

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by every component of the engine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name printed in the tee sheet header.
    pub title: String,

    /// Hard ceiling on players per group.
    pub max_group_size: usize,

    /// Preferred floor; groups below it are merged or topped up when possible.
    pub min_group_size: usize,

    /// Day of the week the groups play on.
    pub play_day: Weekday,

    /// A re-extraction smaller than `existing × ratio` is rejected.
    pub min_refresh_ratio: f64,

    /// Seed for neutral-block shuffling; entropy when unset.
    pub random_seed: Option<u64>,

    /// Auto-generated slot sequence.
    pub slots: SlotConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Golf".to_string(),
            max_group_size: 4,
            min_group_size: 3,
            play_day: Weekday::Sun,
            min_refresh_ratio: 0.7,
            random_seed: None,
            slots: SlotConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_slots(mut self, slots: SlotConfig) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_group_sizes(mut self, min: usize, max: usize) -> Self {
        self.min_group_size = min;
        self.max_group_size = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_group_size == 0 {
            return Err(ConfigError::Invalid("max_group_size must be at least 1".into()));
        }
        if self.min_group_size > self.max_group_size {
            return Err(ConfigError::Invalid(format!(
                "min_group_size {} exceeds max_group_size {}",
                self.min_group_size, self.max_group_size
            )));
        }
        if !(self.min_refresh_ratio > 0.0 && self.min_refresh_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "min_refresh_ratio {} must be in (0, 1]",
                self.min_refresh_ratio
            )));
        }
        if self.slots.interval_minutes == 0 {
            return Err(ConfigError::Invalid("interval_minutes must be positive".into()));
        }
        if parse_slot_time(&self.slots.start_time).is_err() {
            return Err(ConfigError::Invalid(format!(
                "start_time '{}' is not HH:MM",
                self.slots.start_time
            )));
        }
        Ok(())
    }
}
