//! Flurry CLI - Command-line interface for the generative ambient engine
//!
//! This binary derives seeds, inspects phrase decisions, manages parameter
//! presets and renders the engine offline to WAV.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use flurry_cli::commands;
use flurry_cli::commands::params::ParamsAction;
use flurry_cli::commands::render::RenderOptions;

/// Flurry - Deterministic Generative Ambient Music
#[derive(Parser)]
#[command(name = "flurry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the seed for a time bucket and parameter preset
    Seed {
        /// Time bucket (YYYY-MM-DD or YYYY-MM-DDTHH); the current one when absent
        #[arg(short, long)]
        bucket: Option<String>,

        /// Bucket width used for the current bucket (default: hour)
        #[arg(short, long, value_parser = ["hour", "day"])]
        granularity: Option<String>,

        /// Path to a parameter preset (JSON)
        #[arg(short, long)]
        params: Option<String>,

        /// Also print the hashed seed material
        #[arg(long)]
        material: bool,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// List, print or validate parameter presets
    Params {
        /// Path to a parameter preset (JSON); defaults when absent
        #[arg(short, long)]
        params: Option<String>,

        /// List every parameter with its section, default and range
        #[arg(long, conflicts_with_all = ["canonical", "validate"])]
        list: bool,

        /// Print the canonical string that feeds the seed
        #[arg(long, conflicts_with = "validate")]
        canonical: bool,

        /// Validate the preset given with --params
        #[arg(long)]
        validate: bool,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Print the decisions of the first phrases without rendering audio
    Inspect {
        /// Number of phrases to decide
        #[arg(short = 'n', long, default_value_t = 4)]
        phrases: usize,

        /// Time bucket (YYYY-MM-DD or YYYY-MM-DDTHH); the current one when absent
        #[arg(short, long)]
        bucket: Option<String>,

        /// Bucket width used for the current bucket (default: from the config)
        #[arg(short, long, value_parser = ["hour", "day"])]
        granularity: Option<String>,

        /// Path to a parameter preset (JSON)
        #[arg(short, long)]
        params: Option<String>,

        /// Path to an engine config (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Render the engine offline to a 16-bit stereo WAV file
    Render {
        /// Output WAV path
        #[arg(short, long)]
        out: String,

        /// Duration in seconds
        #[arg(short, long, default_value_t = 32.0)]
        seconds: f64,

        /// Time bucket (YYYY-MM-DD or YYYY-MM-DDTHH); the current one when absent
        #[arg(short, long)]
        bucket: Option<String>,

        /// Bucket width used for the current bucket (default: from the config)
        #[arg(short, long, value_parser = ["hour", "day"])]
        granularity: Option<String>,

        /// Path to a parameter preset (JSON)
        #[arg(short, long)]
        params: Option<String>,

        /// Path to an engine config (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Force a reverb topology (plate, hall, cathedral, dark-hall)
        #[arg(long)]
        preset: Option<String>,

        /// Write engine events to this file as JSON lines
        #[arg(long)]
        events: Option<String>,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Seed {
            bucket,
            granularity,
            params,
            material,
            json,
        } => commands::seed::run(
            bucket.as_deref(),
            granularity.as_deref(),
            params.as_deref(),
            material,
            json,
        ),
        Commands::Params {
            params,
            list,
            canonical,
            validate,
            json,
        } => {
            let action = if list {
                ParamsAction::List
            } else if validate {
                ParamsAction::Validate
            } else if canonical {
                ParamsAction::Canonical
            } else {
                ParamsAction::Show
            };
            commands::params::run(action, params.as_deref(), json)
        }
        Commands::Inspect {
            phrases,
            bucket,
            granularity,
            params,
            config,
            json,
        } => commands::inspect::run(
            phrases,
            bucket.as_deref(),
            granularity.as_deref(),
            params.as_deref(),
            config.as_deref(),
            json,
        ),
        Commands::Render {
            out,
            seconds,
            bucket,
            granularity,
            params,
            config,
            preset,
            events,
            json,
        } => {
            let options = RenderOptions {
                out: &out,
                seconds,
                params_path: params.as_deref(),
                config_path: config.as_deref(),
                bucket: bucket.as_deref(),
                granularity: granularity.as_deref(),
                preset: preset.as_deref(),
                events_path: events.as_deref(),
            };
            commands::render::run(&options, json)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
