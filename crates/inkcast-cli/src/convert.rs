//! Converts an image into an 800x480 palette PNG for the panel.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use inkcast_epd::{prepare, FitMode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inkcast-convert")]
#[command(about = "Fit and dither an image onto the 7-color panel palette")]
#[command(version)]
struct Cli {
    /// Image to convert
    input: PathBuf,

    /// Output PNG path
    #[arg(default_value = "output.png")]
    output: PathBuf,

    /// Letterbox the whole image instead of cropping to fill the panel
    #[arg(long)]
    contain: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let image = image::open(&cli.input)
        .with_context(|| format!("Failed to open {}", cli.input.display()))?;
    let mode = if cli.contain {
        FitMode::Contain
    } else {
        FitMode::Cover
    };

    let canvas = prepare(&image, mode).context("Failed to convert image")?;
    let file = File::create(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    canvas
        .write_png(BufWriter::new(file))
        .context("Failed to write palette image")?;

    info!(
        "Converted {} ({}) to {}",
        cli.input.display(),
        mode,
        cli.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let cli = Cli::try_parse_from(["inkcast-convert", "in.jpg"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("output.png"));
        assert!(!cli.contain);

        let cli =
            Cli::try_parse_from(["inkcast-convert", "in.jpg", "out.png", "--contain"]).unwrap();
        assert_eq!(cli.output, PathBuf::from("out.png"));
        assert!(cli.contain);

        assert!(Cli::try_parse_from(["inkcast-convert"]).is_err());
    }
}
