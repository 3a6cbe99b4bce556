//! pointfuse density command - report local point densities.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pointfuse::compute_densities;
use serde::Serialize;

use super::info::DensityStats;
use super::load_cloud;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct DensityResult {
    input: String,
    points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<DensityStats>,
    /// Points with no distinct neighbor (coincident with `k` others).
    unbounded: usize,
}

pub fn run(input: &Path, k: Option<usize>, cli: &Cli) -> Result<()> {
    let cloud = load_cloud(input)?;
    let k = match k {
        Some(k) => k,
        None => cli.processing_config()?.density.k,
    };

    output::info(
        &format!("Estimating density of {} points (k = {})...", cloud.len(), k),
        cli.format,
        cli.quiet,
    );
    let progress = cli.progress();
    let densities = compute_densities(cloud.points(), k, progress.as_ref())?;

    let result = DensityResult {
        input: input.display().to_string(),
        points: cloud.len(),
        stats: DensityStats::from_densities(k, &densities),
        unbounded: densities.iter().filter(|d| d.is_infinite()).count(),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Density".bold().underline());
                println!("  {}: {}", "Points".cyan(), result.points);
                if let Some(ref stats) = result.stats {
                    stats.print_text();
                }
                if result.unbounded > 0 {
                    println!(
                        "  {}: {} points coincide with all their neighbors",
                        "Warning".yellow(),
                        result.unbounded
                    );
                }
            }
        }
    }

    Ok(())
}
