//! pointfuse register command - align one scan onto another.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use nalgebra::Matrix4;
use pointfuse::{IcpParams, icp};
use serde::Serialize;

use super::{load_cloud, store_cloud};
use crate::{Cli, OutputFormat, output};

/// Command-line values that take precedence over the config file.
pub struct Overrides {
    pub samples: Option<usize>,
    pub iterations: Option<usize>,
    pub outlier_fraction: Option<f64>,
    pub seed: Option<u64>,
}

impl Overrides {
    fn apply(&self, mut params: IcpParams) -> IcpParams {
        if let Some(samples) = self.samples {
            params.samples = samples;
        }
        if let Some(iterations) = self.iterations {
            params.iterations = iterations;
        }
        if let Some(fraction) = self.outlier_fraction {
            params.outlier_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }
        params
    }
}

#[derive(Serialize)]
struct RegisterResult {
    reference: String,
    moving: String,
    output: String,
    iterations: usize,
    retained: usize,
    rms_per_iteration: Vec<f64>,
    /// Row-major pose of the moving scan in the reference frame.
    pose: [[f64; 4]; 4],
}

/// Row-major rows of a 4x4 matrix.
fn matrix_rows(m: &Matrix4<f64>) -> [[f64; 4]; 4] {
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

pub fn run(
    reference: &Path,
    moving: &Path,
    output_path: &Path,
    overrides: Overrides,
    cli: &Cli,
) -> Result<()> {
    let params = overrides.apply(cli.processing_config()?.icp);

    let reference_cloud = load_cloud(reference)?;
    let mut moved = load_cloud(moving)?;

    output::info(
        &format!(
            "Registering {} points onto {} points...",
            moved.len(),
            reference_cloud.len()
        ),
        cli.format,
        cli.quiet,
    );
    let progress = cli.progress();
    let outcome = icp(&reference_cloud, &mut moved, &params, progress.as_ref())?;

    // Loaded clouds sit at identity, so the moved pose is already relative
    // to the reference.
    moved.apply_pose()?;
    store_cloud(&moved, output_path)?;

    let result = RegisterResult {
        reference: reference.display().to_string(),
        moving: moving.display().to_string(),
        output: output_path.display().to_string(),
        iterations: outcome.rms_per_iteration.len(),
        retained: outcome.retained,
        rms_per_iteration: outcome.rms_per_iteration.clone(),
        pose: matrix_rows(&outcome.pose),
    };

    match cli.format {
        OutputFormat::Json => output::print(&result, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Registration".bold().underline());
                println!("  {}: {}", "Iterations".cyan(), result.iterations);
                println!("  {}: {}", "Correspondences kept".cyan(), result.retained);
                if let (Some(first), Some(last)) =
                    (result.rms_per_iteration.first(), outcome.final_rms())
                {
                    println!("  {}: {:.6} -> {:.6}", "RMS".cyan(), first, last);
                }
                println!("  {}:", "Pose".cyan());
                for row in &result.pose {
                    println!(
                        "    [{:>10.6} {:>10.6} {:>10.6} {:>10.6}]",
                        row[0], row[1], row[2], row[3]
                    );
                }
                output::success(
                    &format!("Registered scan saved to {}", output_path.display()),
                    cli.format,
                    cli.quiet,
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_matrix_rows_are_row_major() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let rows = matrix_rows(&m);
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows[2], [0.0, 0.0, 1.0, 3.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        let overrides = Overrides {
            samples: None,
            iterations: Some(5),
            outlier_fraction: None,
            seed: Some(9),
        };
        let params = overrides.apply(IcpParams::default());
        assert_eq!(params.samples, IcpParams::default().samples);
        assert_eq!(params.iterations, 5);
        assert_eq!(params.seed, 9);
    }
}
