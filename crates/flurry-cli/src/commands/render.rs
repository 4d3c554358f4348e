//! Render command implementation
//!
//! Renders the engine offline to a 16-bit stereo WAV file. Stretch beds are
//! rendered inline, so the same bucket and preset always produce the same
//! file.

use anyhow::{Context, Result};
use colored::Colorize;
use flurry_engine::{Engine, EngineEvent, StretchExecution};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, info};

use crate::input::{load_config, load_params, resolve_bucket};

/// Longest render accepted, in seconds.
pub const MAX_SECONDS: f64 = 3600.0;

/// Options for one render.
#[derive(Debug, Clone)]
pub struct RenderOptions<'a> {
    pub out: &'a str,
    pub seconds: f64,
    pub params_path: Option<&'a str>,
    pub config_path: Option<&'a str>,
    pub bucket: Option<&'a str>,
    /// Bucket width for the current bucket; the config's when absent.
    pub granularity: Option<&'a str>,
    /// Forces a reverb topology by name.
    pub preset: Option<&'a str>,
    /// Writes engine events as JSON lines.
    pub events_path: Option<&'a str>,
}

/// Summary of a finished render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    pub sample_rate: u32,
    pub seed: u32,
    pub peak: f64,
    pub phrases: usize,
    pub hash: String,
}

/// Run the render command
///
/// # Returns
/// Exit code: 0 on success
pub fn run(options: &RenderOptions<'_>, json_output: bool) -> Result<ExitCode> {
    let start = Instant::now();
    if !json_output {
        println!("{} {}", "Rendering:".cyan().bold(), options.out);
    }

    let summary = render(options)?;
    let duration_ms = start.elapsed().as_millis() as u64;

    if json_output {
        let output = json!({
            "out": options.out,
            "frames": summary.frames,
            "sample_rate": summary.sample_rate,
            "seed": summary.seed,
            "peak": summary.peak,
            "phrases": summary.phrases,
            "hash": summary.hash,
            "duration_ms": duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{} {}", "Seed:".dimmed(), summary.seed);
        println!(
            "{} {} frames @ {} Hz, {} phrase(s), peak {:.3}",
            "Audio:".dimmed(),
            summary.frames,
            summary.sample_rate,
            summary.phrases,
            summary.peak
        );
        println!("{} {}", "Hash:".dimmed(), &summary.hash[..16]);
        println!("{} in {}ms", "Done".green().bold(), duration_ms);
    }
    Ok(ExitCode::SUCCESS)
}

/// Renders to `options.out` and returns what was written.
pub fn render(options: &RenderOptions<'_>) -> Result<RenderSummary> {
    if !(options.seconds > 0.0 && options.seconds <= MAX_SECONDS) {
        anyhow::bail!(
            "--seconds must be in (0, {}], got {}",
            MAX_SECONDS,
            options.seconds
        );
    }

    let params = load_params(options.params_path)?;
    let mut config = load_config(options.config_path)?;
    config.stretch_execution = StretchExecution::Inline;
    if let Some(preset) = options.preset {
        config.reverb_preset_override = Some(preset.to_string());
    }
    let bucket = resolve_bucket(options.bucket, options.granularity, config.bucket_granularity)?;

    let sample_rate = config.sample_rate;
    let block = config.max_block_size;
    let mut engine = Engine::new(config, &params, bucket)?;
    engine.start();
    info!(bucket = %engine.bucket(), seed = engine.seed(), "render started");

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(options.out, spec)
        .with_context(|| format!("Failed to create WAV file: {}", options.out))?;

    let total = (options.seconds * sample_rate as f64).round() as usize;
    let mut written = 0;
    let mut peak = 0.0f64;
    let mut events = Vec::new();
    while written < total {
        let n = block.min(total - written);
        let audio = engine.tick(&params, n);
        peak = peak.max(audio.peak());
        for sample in audio.interleaved() {
            writer.write_sample(to_i16(sample))?;
        }
        written += n;
        events.extend(engine.drain_events());
    }
    writer.finalize()?;
    debug!(frames = written, events = events.len(), "render finished");

    if let Some(path) = options.events_path {
        write_events(Path::new(path), &events)?;
    }

    let bytes = fs::read(options.out)?;
    let phrases = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PhraseBoundary { .. }))
        .count();

    Ok(RenderSummary {
        frames: written,
        sample_rate,
        seed: engine.seed(),
        peak,
        phrases,
        hash: blake3::hash(&bytes).to_hex().to_string(),
    })
}

fn to_i16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16
}

fn write_events(path: &Path, events: &[EngineEvent]) -> Result<()> {
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create events file: {}", path.display()))?;
    for event in events {
        writeln!(file, "{}", serde_json::to_string(event)?)?;
    }
    Ok(())
}
