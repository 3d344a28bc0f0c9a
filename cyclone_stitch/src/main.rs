//! Cyclone Stitch CLI
//!
//! Stitch the track files of two overlapping windows, or fill step gaps in one.

use clap::{Parser, Subcommand};
use cyclone_core::StitchError;
use cyclone_stitch::{PairPaths, StitchConfig, Window, WindowPairRunner};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Cyclone track stitching across overlapping windows
#[derive(Parser, Debug)]
#[command(name = "cyclone-stitch")]
#[command(about = "Stitch tropical cyclone tracks across overlapping windows", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove duplicate tracks between two windows and extend truncated ones
    Stitch {
        /// Window-pair config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Track file of the earlier window
        #[arg(long)]
        previous: PathBuf,

        /// Track file of the later window
        #[arg(long)]
        current: PathBuf,

        /// Rewritten earlier-window file
        #[arg(long)]
        previous_out: PathBuf,

        /// Rewritten later-window file
        #[arg(long)]
        current_out: PathBuf,
    },

    /// Rebuild missed detections inside every track of a file
    Fill {
        /// Window-pair config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Window the file belongs to (previous, current)
        #[arg(short, long, default_value = "current")]
        window: Window,
    },

    /// List the variable columns with units and descriptive names
    Describe {
        /// Window-pair config (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn load_runner(path: &Path) -> Result<WindowPairRunner, StitchError> {
    let config = StitchConfig::from_path(path)?;
    WindowPairRunner::new(config)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), StitchError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(args: &Args) -> Result<(), StitchError> {
    match &args.command {
        Command::Stitch {
            config,
            previous,
            current,
            previous_out,
            current_out,
        } => {
            let runner = load_runner(config)?;
            let paths = PairPaths {
                previous_in: previous.clone(),
                current_in: current.clone(),
                previous_out: previous_out.clone(),
                current_out: current_out.clone(),
            };
            let report = runner.stitch(&paths)?;

            if args.json {
                print_json(&report)?;
            } else {
                for m in &report.matches {
                    info!(
                        "  track {} (current) ~ track {} (previous) at {}: {:?}, offset {}",
                        m.late_track, m.early_track, m.first_shared, m.method, m.offset
                    );
                }
                info!(
                    "✓ Dropped {} of {} previous tracks, extended {} of {} current tracks",
                    report.merge.previous_dropped,
                    report.previous_tracks,
                    report.merge.current_extended,
                    report.current_tracks
                );
                if report.merge.extend_odd > 0 {
                    info!("  {} unresolved same-start matches left as they were", report.merge.extend_odd);
                }
            }
        }
        Command::Fill {
            config,
            input,
            output,
            window,
        } => {
            let runner = load_runner(config)?;
            let report = runner.fill(input, output, *window)?;

            if args.json {
                print_json(&report)?;
            } else {
                info!(
                    "✓ {} tracks, {} points read, {} written",
                    report.tracks, report.points_read, report.points_written
                );
            }
        }
        Command::Describe { config } => {
            let runner = load_runner(config)?;
            let described = runner.describe_variables()?;

            if args.json {
                print_json(&described)?;
            } else {
                for variable in &described {
                    info!(
                        "{:<12} [{}] {} ({})",
                        variable.name,
                        variable.metadata.units,
                        variable.metadata.standard_name,
                        variable.metadata.long_name
                    );
                }
            }
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    if !args.json {
        info!("Cyclone Stitch v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Exit with proper code for scripts
    if let Err(e) = run(&args) {
        error!("✗ {}", e);
        std::process::exit(1);
    }
}
