//! pointfuse cull command - remove low-density outliers.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pointfuse::cull;
use serde::Serialize;

use super::{load_cloud, store_cloud};
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CullResult {
    input: String,
    output: String,
    ratio: f64,
    k: usize,
    input_points: usize,
    output_points: usize,
    removed: usize,
}

pub fn run(
    input: &Path,
    output_path: &Path,
    ratio: Option<f64>,
    k: Option<usize>,
    cli: &Cli,
) -> Result<()> {
    let mut cloud = load_cloud(input)?;

    let mut params = cli.processing_config()?.cull;
    if let Some(ratio) = ratio {
        params.ratio = ratio;
    }
    if let Some(k) = k {
        params.k = k;
    }

    output::info(
        &format!(
            "Culling {:.1}% of {} points...",
            params.ratio * 100.0,
            cloud.len()
        ),
        cli.format,
        cli.quiet,
    );
    let progress = cli.progress();
    let report = cull(&mut cloud, &params, progress.as_ref())?;
    store_cloud(&cloud, output_path)?;

    let result = CullResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        ratio: params.ratio,
        k: params.k,
        input_points: report.before,
        output_points: report.after,
        removed: report.removed(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Cull".bold().underline());
                println!(
                    "  {}: {} -> {} ({} removed)",
                    "Points".cyan(),
                    result.input_points,
                    result.output_points,
                    result.removed
                );
                output::success(
                    &format!("Culled cloud saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}
