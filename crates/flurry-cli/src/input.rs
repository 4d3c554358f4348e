//! Loading presets, engine configs and time buckets from the command line.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use flurry_engine::EngineConfig;
use flurry_params::{BucketGranularity, ParameterState, TimeBucket};

/// Loads a parameter preset, or the defaults when no path is given.
pub fn load_params(path: Option<&str>) -> Result<ParameterState> {
    let Some(path) = path else {
        return Ok(ParameterState::default());
    };
    let json = read(path)?;
    ParameterState::from_json_str(&json)
        .with_context(|| format!("Failed to load parameter preset: {}", path))
}

/// Loads an engine config, or the defaults when no path is given.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = read(path)?;
    EngineConfig::from_json_str(&json)
        .with_context(|| format!("Failed to load engine config: {}", path))
}

/// Parses an explicit bucket, or takes the current one at `granularity`,
/// falling back to `default` when no granularity is given.
pub fn resolve_bucket(
    bucket: Option<&str>,
    granularity: Option<&str>,
    default: BucketGranularity,
) -> Result<TimeBucket> {
    match bucket {
        Some(bucket) => Ok(TimeBucket::parse(bucket)?),
        None => {
            let granularity = match granularity {
                Some(granularity) => granularity.parse()?,
                None => default,
            };
            Ok(TimeBucket::now(granularity))
        }
    }
}

fn read(path: &str) -> Result<String> {
    fs::read_to_string(Path::new(path)).with_context(|| format!("Failed to read file: {}", path))
}
