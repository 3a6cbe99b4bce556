//! pointfuse unify command - merge scans on a voxel grid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use pointfuse::CloudSet;
use serde::Serialize;

use super::store_cloud;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct UnifyResult {
    inputs: Vec<String>,
    output: String,
    resolution: f64,
    registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_rms: Option<f64>,
    input_points: usize,
    output_points: usize,
}

pub fn run(
    inputs: &[PathBuf],
    output_path: &Path,
    resolution: Option<f64>,
    register: bool,
    cli: &Cli,
) -> Result<()> {
    let config = cli.processing_config()?;
    let mut params = config.unify;
    if let Some(resolution) = resolution {
        params.resolution = resolution;
    }

    let mut set = CloudSet::new();
    for input in inputs {
        let name = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cloud".to_string());
        set.load_new(input, name)
            .with_context(|| format!("Failed to load point cloud from {:?}", input))?;
    }
    let input_points = set.point_count();

    let progress = cli.progress();
    let registration_rms = if register {
        output::info("Registering second scan onto the first...", cli.format, cli.quiet);
        set.register(&config.icp, progress.as_ref())?.final_rms()
    } else {
        None
    };

    output::info(
        &format!(
            "Unifying {} clouds at resolution {}...",
            set.len(),
            params.resolution
        ),
        cli.format,
        cli.quiet,
    );
    let name = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unified".to_string());
    let merged = set.unify(&params, name)?;
    store_cloud(merged, output_path)?;

    let result = UnifyResult {
        inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
        output: output_path.display().to_string(),
        resolution: params.resolution,
        registered: register,
        registration_rms,
        input_points,
        output_points: merged.len(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Unify".bold().underline());
                println!("  {}: {}", "Clouds".cyan(), result.inputs.len());
                if let Some(rms) = result.registration_rms {
                    println!("  {}: {:.6}", "Registration RMS".cyan(), rms);
                }
                println!(
                    "  {}: {} -> {}",
                    "Points".cyan(),
                    result.input_points,
                    result.output_points
                );
                output::success(
                    &format!("Unified cloud saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}
