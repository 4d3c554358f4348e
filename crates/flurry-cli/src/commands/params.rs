//! Params command implementation
//!
//! Lists the parameter table, prints presets in pretty or canonical form, and
//! validates preset files.

use anyhow::Result;
use colored::Colorize;
use flurry_params::{ParameterState, PARAMETERS};
use serde_json::json;
use std::fs;
use std::process::ExitCode;

use crate::input::load_params;

/// What the params command should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsAction {
    /// Print the table of names, sections, ranges and defaults.
    List,
    /// Print the preset (or defaults) as pretty JSON.
    Show,
    /// Print the canonical string that feeds the seed.
    Canonical,
    /// Check a preset file and report the first problem.
    Validate,
}

/// Run the params command
///
/// # Arguments
/// * `action` - What to print
/// * `params_path` - Preset file; defaults are used when absent (required for validate)
/// * `json_output` - Whether to output machine-readable JSON
///
/// # Returns
/// Exit code: 0 on success, 1 if validation failed
pub fn run(action: ParamsAction, params_path: Option<&str>, json_output: bool) -> Result<ExitCode> {
    match action {
        ParamsAction::List => list(json_output),
        ParamsAction::Show => {
            let params = load_params(params_path)?;
            println!("{}", params.to_json_pretty()?);
            Ok(ExitCode::SUCCESS)
        }
        ParamsAction::Canonical => {
            let params = load_params(params_path)?;
            println!("{}", params.canonical_string());
            Ok(ExitCode::SUCCESS)
        }
        ParamsAction::Validate => {
            let path = params_path
                .ok_or_else(|| anyhow::anyhow!("--params is required with --validate"))?;
            validate(path, json_output)
        }
    }
}

fn list(json_output: bool) -> Result<ExitCode> {
    if json_output {
        let rows: Vec<_> = PARAMETERS
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "section": spec.section.as_str(),
                    "default": spec.default,
                    "min": spec.min,
                    "max": spec.max,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut section = None;
    for spec in PARAMETERS {
        if section != Some(spec.section) {
            println!("{}", spec.section.as_str().cyan().bold());
            section = Some(spec.section);
        }
        println!(
            "  {:<28} {:>10} {}",
            spec.name,
            spec.default,
            format!("[{}, {}]", spec.min, spec.max).dimmed()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(path: &str, json_output: bool) -> Result<ExitCode> {
    let json = fs::read_to_string(path)?;
    let result = ParameterState::from_json_str(&json);

    if json_output {
        let output = match &result {
            Ok(_) => json!({ "ok": true, "path": path }),
            Err(e) => json!({
                "ok": false,
                "path": path,
                "code": e.code(),
                "message": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {}", "Validating:".cyan().bold(), path);
        match &result {
            Ok(_) => println!("{} preset is valid", "OK".green().bold()),
            Err(e) => println!("  {} [{}]: {}", "x".red(), e.code(), e),
        }
    }

    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, json: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, json).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_validate_accepts_partial_preset() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(&tmp, "ok.json", r#"{"tension": 0.5}"#);
        let code = run(ParamsAction::Validate, Some(&path), false).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(&tmp, "bad.json", r#"{"tension": 4.0}"#);
        let code = run(ParamsAction::Validate, Some(&path), true).unwrap();
        assert_eq!(code, ExitCode::from(1));
    }

    #[test]
    fn test_validate_requires_a_path() {
        assert!(run(ParamsAction::Validate, None, false).is_err());
    }

    #[test]
    fn test_list_and_show_succeed() {
        assert_eq!(run(ParamsAction::List, None, true).unwrap(), ExitCode::SUCCESS);
        assert_eq!(run(ParamsAction::Show, None, false).unwrap(), ExitCode::SUCCESS);
        assert_eq!(
            run(ParamsAction::Canonical, None, false).unwrap(),
            ExitCode::SUCCESS
        );
    }
}
