//! Engine configuration.
//!
//! Configuration is fixed for the lifetime of an engine. Everything that may
//! change while playing lives in `ParameterState` instead.

use flurry_params::BucketGranularity;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::harmony::ScaleFamily;

/// Lowest supported sample rate.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Highest supported sample rate.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Where stretch renders run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchExecution {
    /// On the calling thread, at submission. Reproducible regardless of
    /// timing; for offline rendering.
    Inline,
    /// On the worker thread; results arrive when ready.
    #[default]
    Background,
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_max_block_size() -> usize {
    512
}

fn default_channels() -> u16 {
    2
}

fn default_grain_batch_size() -> usize {
    256
}

fn default_message_capacity() -> usize {
    64
}

/// Construction-time engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Largest block the audio graph renders in one pass.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
    /// Output channels. Only stereo is supported.
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Bucket width for the current bucket when the caller names none.
    #[serde(default)]
    pub bucket_granularity: BucketGranularity,
    #[serde(default)]
    pub stretch_execution: StretchExecution,
    /// Upper bound on grains generated per phrase.
    #[serde(default = "default_grain_batch_size")]
    pub grain_batch_size: usize,
    /// Custom scale families; the built-in table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_table: Option<Vec<ScaleFamily>>,
    /// Forces a reverb topology by name, ignoring the `reverb_preset` slider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverb_preset_override: Option<String>,
    /// Capacity of the control-to-audio message ring.
    #[serde(default = "default_message_capacity")]
    pub message_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            max_block_size: default_max_block_size(),
            channels: default_channels(),
            bucket_granularity: BucketGranularity::default(),
            stretch_execution: StretchExecution::default(),
            grain_batch_size: default_grain_batch_size(),
            scale_table: None,
            reverb_preset_override: None,
            message_capacity: default_message_capacity(),
        }
    }
}

impl EngineConfig {
    /// Parses a JSON config and validates it.
    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::invalid_config("json", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks structural limits.
    ///
    /// The scale table and reverb override are checked when the engine is
    /// built, where a bad value falls back to the default instead of failing.
    pub fn validate(&self) -> EngineResult<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(EngineError::invalid_config(
                "sample_rate",
                format!(
                    "{} outside {}..={}",
                    self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                ),
            ));
        }
        if self.max_block_size == 0 || self.max_block_size > 16_384 {
            return Err(EngineError::invalid_config(
                "max_block_size",
                "must be between 1 and 16384",
            ));
        }
        if self.channels != 2 {
            return Err(EngineError::invalid_config(
                "channels",
                "only stereo output is supported",
            ));
        }
        if self.grain_batch_size == 0 {
            return Err(EngineError::invalid_config(
                "grain_batch_size",
                "must be at least 1",
            ));
        }
        if self.message_capacity < 8 {
            return Err(EngineError::invalid_config(
                "message_capacity",
                "must be at least 8",
            ));
        }
        Ok(())
    }

    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = EngineConfig::from_json_str(r#"{"sample_rate": 44100}"#).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.max_block_size, 512);
        assert_eq!(config.stretch_execution, StretchExecution::Background);
    }

    #[test]
    fn test_execution_names() {
        let config = EngineConfig::from_json_str(r#"{"stretch_execution": "inline"}"#).unwrap();
        assert_eq!(config.stretch_execution, StretchExecution::Inline);
    }

    #[test]
    fn test_rejects_bad_values() {
        for json in [
            r#"{"sample_rate": 1000}"#,
            r#"{"max_block_size": 0}"#,
            r#"{"channels": 1}"#,
            r#"{"grain_batch_size": 0}"#,
            r#"{"unknown": true}"#,
        ] {
            let err = EngineConfig::from_json_str(json).unwrap_err();
            assert_eq!(err.code(), "ENGINE_004", "{json}");
        }
    }

    #[test]
    fn test_custom_scale_table_parses() {
        let json = r#"{"scale_table": [
            {"name": "triad", "intervals": [0, 4, 7], "tension": 0.1, "class": "consonant"}
        ]}"#;
        let config = EngineConfig::from_json_str(json).unwrap();
        let table = config.scale_table.unwrap();
        assert_eq!(table[0].weight, 1.0);
    }
}
