//! pointfuse normals command - estimate and orient normals.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pointfuse::recalc_normals;
use serde::Serialize;

use super::{load_cloud, store_cloud};
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct NormalsResult {
    input: String,
    output: String,
    points: usize,
    k: usize,
    graph_k: usize,
    flipped: usize,
    tree_weight: f64,
}

pub fn run(
    input: &Path,
    output_path: &Path,
    k: Option<usize>,
    graph_k: Option<usize>,
    flip: bool,
    cli: &Cli,
) -> Result<()> {
    let mut cloud = load_cloud(input)?;

    let mut params = cli.processing_config()?.normals;
    if let Some(k) = k {
        params.k = k;
    }
    if graph_k.is_some() {
        params.graph_k = graph_k;
    }
    params.flip_root |= flip;

    output::info(
        &format!("Estimating normals for {} points...", cloud.len()),
        cli.format,
        cli.quiet,
    );
    let progress = cli.progress();
    let report = recalc_normals(&mut cloud, &params, progress.as_ref())?;
    store_cloud(&cloud, output_path)?;

    let result = NormalsResult {
        input: input.display().to_string(),
        output: output_path.display().to_string(),
        points: report.points,
        k: params.k,
        graph_k: params.effective_graph_k(),
        flipped: report.flipped,
        tree_weight: report.tree_weight,
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Normals".bold().underline());
                println!("  {}: {}", "Points".cyan(), result.points);
                println!("  {}: {} / {}", "k / graph k".cyan(), result.k, result.graph_k);
                println!("  {}: {}", "Flipped".cyan(), result.flipped);
                println!("  {}: {:.4}", "Tree weight".cyan(), result.tree_weight);
                output::success(
                    &format!("Cloud with normals saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}
