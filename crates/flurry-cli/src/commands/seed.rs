//! Seed command implementation
//!
//! Prints the seed a listener in the given bucket would hear.

use anyhow::Result;
use colored::Colorize;
use flurry_params::{derive_seed, seed_material, BucketGranularity};
use serde_json::json;
use std::process::ExitCode;

use crate::input::{load_params, resolve_bucket};

/// Run the seed command
///
/// # Arguments
/// * `bucket` - Explicit time bucket; the current one when absent
/// * `granularity` - Bucket width used for the current bucket (hour when absent)
/// * `params_path` - Optional parameter preset
/// * `show_material` - Also print the hashed seed material
/// * `json_output` - Whether to output machine-readable JSON
pub fn run(
    bucket: Option<&str>,
    granularity: Option<&str>,
    params_path: Option<&str>,
    show_material: bool,
    json_output: bool,
) -> Result<ExitCode> {
    let bucket = resolve_bucket(bucket, granularity, BucketGranularity::default())?;
    let params = load_params(params_path)?;
    let seed = derive_seed(&bucket, &params);

    if json_output {
        let mut output = json!({
            "bucket": bucket.as_str(),
            "granularity": bucket.granularity().as_str(),
            "seed": seed,
        });
        if show_material {
            output["material"] = json!(seed_material(&bucket, &params));
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Bucket:".cyan().bold(), bucket);
    println!("{} {} ({:#010x})", "Seed:".cyan().bold(), seed, seed);
    if show_material {
        println!("{} {}", "Material:".dimmed(), seed_material(&bucket, &params));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_for_fixed_bucket() {
        let code = run(Some("2024-01-01T00"), Some("hour"), None, true, false).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn test_bad_bucket_is_an_error() {
        assert!(run(Some("yesterday"), None, None, false, true).is_err());
    }
}
