//! pointfuse config command - show the effective processing parameters.

use std::path::Path;

use anyhow::{Context, Result};

use crate::{Cli, OutputFormat, output};

pub fn run(output_path: Option<&Path>, cli: &Cli) -> Result<()> {
    let config = cli.processing_config()?;

    if let Some(path) = output_path {
        config
            .save_toml(path)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        output::success(
            &format!("Configuration written to {}", path.display()),
            cli.format,
            cli.quiet,
        );
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => output::print(&config, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}
