//! Inspect command implementation
//!
//! Prints the decisions of the first phrases for a bucket and preset without
//! rendering any audio.

use anyhow::Result;
use colored::Colorize;
use flurry_engine::{Composer, Composition, ScaleTable};
use flurry_params::derive_seed;
use std::process::ExitCode;
use tracing::warn;

use crate::input::{load_config, load_params, resolve_bucket};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Run the inspect command
///
/// # Arguments
/// * `phrases` - Number of phrases to decide
/// * `bucket` - Explicit time bucket; the current one when absent
/// * `granularity` - Bucket width used for the current bucket; the config's when absent
/// * `params_path` - Optional parameter preset
/// * `config_path` - Optional engine config (scale table, grain cap)
/// * `json_output` - Whether to output machine-readable JSON
pub fn run(
    phrases: usize,
    bucket: Option<&str>,
    granularity: Option<&str>,
    params_path: Option<&str>,
    config_path: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let params = load_params(params_path)?;
    let config = load_config(config_path)?;
    let bucket = resolve_bucket(bucket, granularity, config.bucket_granularity)?;
    let table = match config.scale_table {
        Some(families) => ScaleTable::new(families).unwrap_or_else(|err| {
            warn!(%err, "custom scale table rejected, using the built-in one");
            ScaleTable::default()
        }),
        None => ScaleTable::default(),
    };

    let seed = derive_seed(&bucket, &params);
    let compositions = compose(seed, table, config.grain_batch_size, &params, phrases);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&compositions)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {} (seed {})", "Bucket:".cyan().bold(), bucket, seed);
    for composition in &compositions {
        print_composition(composition);
    }
    Ok(ExitCode::SUCCESS)
}

/// Decides `count` phrases in the same order a playing engine would with
/// fixed parameters: the stretch bed is only requested for the first phrase.
pub fn compose(
    seed: u32,
    table: ScaleTable,
    grain_cap: usize,
    params: &flurry_params::ParameterState,
    count: usize,
) -> Vec<Composition> {
    let mut composer = Composer::new(seed, table, grain_cap);
    (0..count)
        .map(|i| composer.compose(params, i == 0 && params.stretch_enabled()))
        .collect()
}

fn print_composition(composition: &Composition) {
    let phrase = &composition.phrase;
    println!();
    println!(
        "{} {} {}",
        format!("Phrase {}", phrase.index).bold(),
        format!("@ {:.0}s", phrase.start_seconds).dimmed(),
        phrase.scale.name.green()
    );
    for (chord, voicing) in phrase.progression.chords.iter().zip(&phrase.voicings) {
        let notes: Vec<String> = voicing.notes.iter().map(|&n| note_name(n)).collect();
        let kind = if chord.has_seventh() { "7" } else { "" };
        println!(
            "  {:<6} {}",
            format!("{}{}", degree_name(chord.root_degree), kind),
            notes.join(" ")
        );
    }
    println!(
        "  {} {} grains, {} lead notes",
        "Texture:".dimmed(),
        composition.grains.len(),
        phrase.lead.len()
    );
    if let Some(seed) = composition.stretch_seed {
        println!("  {} phase seed {}", "Stretch:".dimmed(), seed);
    }
}

/// Scientific pitch name, e.g. 40 -> "E2".
pub fn note_name(midi: u8) -> String {
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[midi as usize % 12], octave)
}

fn degree_name(degree: usize) -> String {
    const ROMAN: [&str; 12] = [
        "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
    ];
    ROMAN
        .get(degree)
        .map(|s| s.to_string())
        .unwrap_or_else(|| (degree + 1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flurry_params::ParameterState;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(40), "E2");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
    }

    #[test]
    fn test_stretch_seed_only_on_first_phrase() {
        let params = ParameterState::default();
        let compositions = compose(11, ScaleTable::default(), 64, &params, 3);
        assert_eq!(compositions.len(), 3);
        assert!(compositions[0].stretch_seed.is_some());
        assert!(compositions[1..].iter().all(|c| c.stretch_seed.is_none()));
        assert_eq!(compositions[2].phrase.index, 2);
    }

    #[test]
    fn test_run_fixed_bucket() {
        let code = run(2, Some("2024-01-01"), Some("day"), None, None, true).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
    }
}
