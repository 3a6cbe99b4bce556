//! pointfuse: Command-line interface for point cloud processing.
//!
//! Loads ASCII PLY scans, derives normals and densities, removes outliers,
//! registers scans onto each other and merges them into a single cloud.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=pointfuse=info` - Basic operation logging
//! - `RUST_LOG=pointfuse=debug` - Detailed progress logging
//! - `RUST_LOG=pointfuse::timing=debug` - Performance timing
//!
//! # Example
//!
//! ```bash
//! # Align back.ply onto front.ply and merge both at 0.5 resolution
//! pointfuse unify front.ply back.ply --register --resolution 0.5 -o merged.ply
//!
//! # Normals with a tuned config
//! pointfuse --config scan.toml normals merged.ply -o merged_normals.ply
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use pointfuse::{LogProgress, NoProgress, ProcessingConfig, ProgressSink};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{config, cull, density, info, normals, register, unify};

/// pointfuse - Merge and clean up 3D scans.
///
/// Process scanned point clouds stored as ASCII PLY files.
#[derive(Parser)]
#[command(name = "pointfuse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TOML file with processing parameters; command-line flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display cloud statistics
    Info {
        /// Input PLY file
        input: PathBuf,

        /// Also compute density statistics
        #[arg(long)]
        detailed: bool,
    },

    /// Estimate consistently oriented normals
    Normals {
        /// Input PLY file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Neighborhood size for plane fitting
        #[arg(long, short)]
        k: Option<usize>,

        /// Neighborhood size for the orientation graph
        #[arg(long)]
        graph_k: Option<usize>,

        /// Flip the orientation of the whole cloud
        #[arg(long)]
        flip: bool,
    },

    /// Report local point densities
    Density {
        /// Input PLY file
        input: PathBuf,

        /// Neighbor count for the density radius
        #[arg(long, short)]
        k: Option<usize>,
    },

    /// Remove the least dense fraction of points
    Cull {
        /// Input PLY file
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Fraction of points to remove (0.0-1.0)
        #[arg(long, short)]
        ratio: Option<f64>,

        /// Neighbor count for the density radius
        #[arg(long, short)]
        k: Option<usize>,
    },

    /// Align a scan onto a reference scan with trimmed ICP
    Register {
        /// Reference scan, left in place
        reference: PathBuf,

        /// Scan to move onto the reference
        moving: PathBuf,

        /// Output file for the moved scan, in reference coordinates
        #[arg(short, long)]
        output: PathBuf,

        /// Sampled points per iteration
        #[arg(long)]
        samples: Option<usize>,

        /// Number of iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Fraction of worst correspondences to discard (0.0-1.0)
        #[arg(long)]
        outlier_fraction: Option<f64>,

        /// Seed for correspondence sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Merge scans on a voxel grid
    Unify {
        /// Input PLY files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Voxel edge length
        #[arg(long)]
        resolution: Option<f64>,

        /// Register the second input onto the first before merging
        #[arg(long)]
        register: bool,
    },

    /// Print or write the effective processing configuration
    Config {
        /// Write the configuration to this TOML file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// The processing parameters from `--config`, or the defaults.
    pub fn processing_config(&self) -> Result<ProcessingConfig> {
        let Some(path) = &self.config else {
            return Ok(ProcessingConfig::default());
        };
        let config = ProcessingConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded processing config");
        Ok(config)
    }

    /// Progress goes to the log only when someone is listening.
    pub fn progress(&self) -> Box<dyn ProgressSink> {
        if self.verbose > 0 && !self.quiet {
            Box::new(LogProgress::new())
        } else {
            Box::new(NoProgress)
        }
    }
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over the -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "pointfuse=info",
            2 => "pointfuse=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Info { input, detailed } => info::run(input, *detailed, &cli),
        Commands::Normals {
            input,
            output,
            k,
            graph_k,
            flip,
        } => normals::run(input, output, *k, *graph_k, *flip, &cli),
        Commands::Density { input, k } => density::run(input, *k, &cli),
        Commands::Cull {
            input,
            output,
            ratio,
            k,
        } => cull::run(input, output, *ratio, *k, &cli),
        Commands::Register {
            reference,
            moving,
            output,
            samples,
            iterations,
            outlier_fraction,
            seed,
        } => register::run(
            reference,
            moving,
            output,
            register::Overrides {
                samples: *samples,
                iterations: *iterations,
                outlier_fraction: *outlier_fraction,
                seed: *seed,
            },
            &cli,
        ),
        Commands::Unify {
            inputs,
            output,
            resolution,
            register,
        } => unify::run(inputs, output, *resolution, *register, &cli),
        Commands::Config { output } => config::run(output.as_deref(), &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(cloud_err) = e.downcast_ref::<pointfuse::CloudError>() {
                eprintln!("{}: {}", "Error".red().bold(), cloud_err);
                eprintln!("  {}: {}", "Code".cyan(), cloud_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    cloud_err.recovery_suggestion()
                );
                if let Some(location) = cloud_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
