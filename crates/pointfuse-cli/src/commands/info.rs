//! pointfuse info command - display cloud statistics.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use pointfuse::compute_densities;
use serde::Serialize;

use super::load_cloud;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct CloudInfo {
    path: String,
    name: String,
    points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<BoundsInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    centroid: Option<[f64; 3]>,
    has_normals: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    density: Option<DensityStats>,
}

#[derive(Serialize)]
struct BoundsInfo {
    min: [f64; 3],
    max: [f64; 3],
    dimensions: [f64; 3],
}

#[derive(Serialize)]
pub(crate) struct DensityStats {
    pub k: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl DensityStats {
    /// Summary of a set of densities; `None` when there are none.
    pub(crate) fn from_densities(k: usize, densities: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = densities.iter().copied().filter(|d| d.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            k,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: sorted[sorted.len() / 2],
        })
    }

    pub(crate) fn print_text(&self) {
        println!("  {}: {}", "Density k".cyan(), self.k);
        println!(
            "  {}: {:.4} / {:.4} / {:.4}",
            "Min / median / max".cyan(),
            self.min,
            self.median,
            self.max
        );
        println!("  {}: {:.4}", "Mean density".cyan(), self.mean);
    }
}

pub fn run(input: &Path, detailed: bool, cli: &Cli) -> Result<()> {
    let cloud = load_cloud(input)?;

    let bounds = cloud.bounds().map(|(min, max)| {
        let dims = max - min;
        BoundsInfo {
            min: [min.x, min.y, min.z],
            max: [max.x, max.y, max.z],
            dimensions: [dims.x, dims.y, dims.z],
        }
    });

    let density = if detailed {
        let k = cli.processing_config()?.density.k;
        let progress = cli.progress();
        let densities = compute_densities(cloud.points(), k, progress.as_ref())?;
        DensityStats::from_densities(k, &densities)
    } else {
        None
    };

    let info = CloudInfo {
        path: input.display().to_string(),
        name: cloud.name().to_string(),
        points: cloud.len(),
        bounds,
        centroid: cloud.centroid().map(|c| [c.x, c.y, c.z]),
        has_normals: cloud.has_normals(),
        density,
    };

    match cli.format {
        OutputFormat::Json => output::print(&info, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Point Cloud Information".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!("  {}: {}", "Name".cyan(), info.name);
                println!("  {}: {}", "Points".cyan(), info.points);

                if let Some(ref b) = info.bounds {
                    println!(
                        "  {}: {:.3} x {:.3} x {:.3}",
                        "Dimensions".cyan(),
                        b.dimensions[0],
                        b.dimensions[1],
                        b.dimensions[2]
                    );
                    println!("  {}: {}", "Min bounds".cyan(), output::vec3(b.min));
                    println!("  {}: {}", "Max bounds".cyan(), output::vec3(b.max));
                }
                if let Some(c) = info.centroid {
                    println!("  {}: {}", "Centroid".cyan(), output::vec3(c));
                }
                println!(
                    "  {}: {}",
                    "Has normals".cyan(),
                    if info.has_normals { "yes" } else { "no" }
                );
                if let Some(ref stats) = info.density {
                    stats.print_text();
                }
            }
        }
    }

    Ok(())
}
