//! Stretchbox command line
//!
//! ```text
//! stretchbox stretch -T 1.25 -P 1.0 -Q 2 -f drums.wav bass.wav
//! stretchbox regions song.wav regions.yaml -o song-edit.wav
//! stretchbox config --write stretchbox.yaml
//! ```

mod paths;
mod regions;
mod settings;
mod stretch;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use stretchbox_core::config::{save_config, ProcessingConfig};
use stretchbox_core::EngineKind;

#[derive(Parser, Debug)]
#[command(
    name = "stretchbox",
    version,
    about = "Time-stretch and pitch-shift WAV files, whole or region by region"
)]
struct Cli {
    /// YAML processing settings (default: ./stretchbox.yaml if present); flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Engine settings shared by the processing commands
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine implementation
    #[arg(long, value_parser = parse_engine)]
    engine: Option<EngineKind>,
    /// Quality level, 0 (preview) to 3 (best)
    #[arg(short = 'Q', long, value_parser = clap::value_parser!(u8).range(0..=3))]
    quality: Option<u8>,
    /// Frames requested from the engine per call
    #[arg(long)]
    block: Option<usize>,
    /// Output bit depth: 8, 16, 24 or 32 (float); defaults to each input's
    #[arg(long)]
    bit_depth: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stretch whole files; several files are processed as one multi-channel stream
    Stretch {
        /// Input WAV files
        #[arg(short = 'f', long, required = true, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Time factor (output duration / input duration)
        #[arg(short = 'T', long)]
        time: Option<f64>,
        /// Pitch factor (2.0 = one octave up)
        #[arg(short = 'P', long)]
        pitch: Option<f64>,
        /// Formant factor (defaults to 1 / pitch)
        #[arg(short = 'F', long)]
        formant: Option<f64>,
        /// Directory for output files (defaults to next to each input)
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,
        /// Prefix for output file names
        #[arg(long, default_value = paths::DEFAULT_OUTPUT_PREFIX)]
        prefix: String,
        /// Process each file on its own, in parallel, instead of multiplexing
        #[arg(long)]
        separate: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Render a list of regions from one file into one output
    Regions {
        /// Input WAV file
        input: PathBuf,
        /// YAML region list
        regions: PathBuf,
        /// Output WAV file
        #[arg(short = 'o', long)]
        output: PathBuf,
        /// Fade length at region edges, in frames
        #[arg(long)]
        margin: Option<usize>,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Write the effective settings as YAML
    Config {
        /// Destination file
        #[arg(long)]
        write: PathBuf,
    },
}

fn parse_engine(value: &str) -> std::result::Result<EngineKind, String> {
    value.parse::<EngineKind>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let base = settings::load(
        cli.config.as_deref(),
        std::path::Path::new(settings::DEFAULT_SETTINGS_FILE),
    )?;

    match cli.command {
        Commands::Stretch {
            files,
            time,
            pitch,
            formant,
            output_dir,
            prefix,
            separate,
            engine,
        } => {
            let mut config = settings::apply_engine_args(base, &engine);
            if let Some(time) = time {
                config.time_factor = time;
            }
            if let Some(pitch) = pitch {
                config.pitch_factor = pitch;
            }
            if formant.is_some() {
                config.formant_factor = formant;
            }
            config.validate()?;

            let outputs = paths::output_paths(&files, output_dir.as_deref(), &prefix)?;
            if separate {
                stretch::run_separate(&files, &outputs, &config)
            } else {
                stretch::run_multiplexed(&files, &outputs, &config)
            }
        }
        Commands::Regions {
            input,
            regions,
            output,
            margin,
            engine,
        } => {
            let mut config = settings::apply_engine_args(base, &engine);
            if let Some(margin) = margin {
                config.crossfade_margin = margin;
            }
            config.validate()?;
            regions::run(&input, &regions, &output, &config)
        }
        Commands::Config { write } => write_config(&base, &write),
    }
}

fn write_config(config: &ProcessingConfig, path: &std::path::Path) -> Result<()> {
    save_config(config, path)?;
    println!("Wrote settings to {}", path.display());
    Ok(())
}
