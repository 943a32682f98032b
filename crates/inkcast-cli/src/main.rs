//! Inkcast
//!
//! Shows a weather illustration for a location on a 7-color e-paper panel,
//! or clears the panel.

mod config;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::DynamicImage;
use inkcast_epd::bus::mock::{mock_device, Transcript, WireEvent};
use inkcast_epd::bus::{SpidevBus, SysfsLine};
use inkcast_epd::epd::{Command, ControlLines, LineRole};
use inkcast_epd::{
    prepare, session, CancelFlag, Canvas, Delay, DigitalLine, EpdDevice, Error, FitMode, Outcome,
    PaletteColor, PhysicalBus, StdDelay, EPD_HEIGHT, EPD_WIDTH,
};
use inkcast_source::WeatherIllustrator;
use tokio::runtime::Runtime;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "inkcast")]
#[command(about = "Weather illustrations on a 7-color e-paper panel")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: config/inkcast.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run the panel protocol against a recording bus instead of hardware
    #[arg(long, global = true)]
    dry_run: bool,

    /// With --dry-run, write the transmitted frame to this PNG
    #[arg(long, global = true, requires = "dry_run")]
    preview: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the weather for a location
    Show {
        /// Place name, e.g. "Stockholm" or "Hobbiton"
        location: String,
    },
    /// Clear the display to a solid color
    Clear {
        /// Color: black, white, green, blue, red, yellow, orange
        #[arg(long, default_value_t = PaletteColor::White)]
        color: PaletteColor,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    let fit = config.fit_mode()?;

    // Build the illustrator before touching the panel so a missing key fails fast
    let illustrator = match &cli.command {
        Commands::Show { .. } => Some(WeatherIllustrator::from_env(config.source.clone())?),
        Commands::Clear { .. } => None,
    };

    let runtime = Runtime::new().context("Failed to start async runtime")?;
    let cancel = CancelFlag::new();

    // Setup Unix signal handlers
    let (mut sigterm, mut sigint) = {
        let _guard = runtime.enter();
        (
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
        )
    };
    let signal_cancel = cancel.clone();
    runtime.spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, finishing up"),
            _ = sigint.recv() => info!("Received SIGINT, finishing up"),
        }
        signal_cancel.cancel();
    });

    let job = Job {
        command: &cli.command,
        source: illustrator.as_ref(),
        runtime: &runtime,
        fit,
    };

    let outcome = if cli.dry_run {
        let (mut device, transcript) = mock_device(config.driver());
        let outcome = job.run(&mut device, &cancel);
        report_dry_run(&transcript, cli.preview.as_deref())?;
        outcome?
    } else {
        let mut device = open_panel(&config)?;
        job.run(&mut device, &cancel)?
    };

    match outcome {
        Outcome::Completed => info!("Done"),
        Outcome::Cancelled => info!("Interrupted by user"),
    }
    Ok(())
}

/// Acquires the spidev bus and the four sysfs GPIO lines.
fn open_panel(config: &Config) -> Result<EpdDevice<SpidevBus, SysfsLine, StdDelay>> {
    let pins = &config.pins;
    let lines = ControlLines::acquire(|role| match role {
        LineRole::Reset => SysfsLine::output(role.name(), pins.reset),
        LineRole::DataCommand => SysfsLine::output(role.name(), pins.data_command),
        LineRole::Busy => SysfsLine::input(role.name(), pins.busy),
        LineRole::Power => SysfsLine::output(role.name(), pins.power),
    })
    .context("Failed to export GPIO lines")?;
    Ok(EpdDevice::new(
        SpidevBus::new(&config.display.spi_device),
        lines,
        StdDelay,
        config.driver(),
    ))
}

/// Where `show` gets its picture.
trait ImageSource {
    async fn fetch_image(&self, location: &str) -> anyhow::Result<DynamicImage>;
}

impl ImageSource for WeatherIllustrator {
    async fn fetch_image(&self, location: &str) -> anyhow::Result<DynamicImage> {
        self.illustrate(location).await
    }
}

/// One command bound to everything it needs.
struct Job<'a, S> {
    command: &'a Commands,
    source: Option<&'a S>,
    runtime: &'a Runtime,
    fit: FitMode,
}

impl<S: ImageSource> Job<'_, S> {
    fn run<B, L, D>(&self, device: &mut EpdDevice<B, L, D>, cancel: &CancelFlag) -> Result<Outcome>
    where
        B: PhysicalBus,
        L: DigitalLine,
        D: Delay,
    {
        let outcome = session::run(device, cancel, |device, cancel| match self.command {
            Commands::Show { location } => {
                let source = self
                    .source
                    .ok_or_else(|| Error::UpstreamFetch("no image source configured".into()))?;
                info!("Getting an illustration for {}", location);
                let image = match self.fetch(source, location, cancel) {
                    Some(image) => image?,
                    None => return Ok(Outcome::Cancelled),
                };
                if cancel.is_cancelled() {
                    return Ok(Outcome::Cancelled);
                }

                let canvas = prepare(&image, self.fit)?;
                info!("Displaying the image");
                device.render(&canvas)?;
                Ok(Outcome::Completed)
            }
            Commands::Clear { color } => {
                device.clear(*color)?;
                Ok(Outcome::Completed)
            }
        })?;
        Ok(outcome)
    }

    /// Waits for the image unless the user cancels first.
    fn fetch(
        &self,
        source: &S,
        location: &str,
        cancel: &CancelFlag,
    ) -> Option<inkcast_epd::Result<DynamicImage>> {
        self.runtime.block_on(async {
            tokio::select! {
                result = source.fetch_image(location) => Some(
                    result.map_err(|e| Error::UpstreamFetch(format!("{:#}", e))),
                ),
                _ = cancel.cancelled() => None,
            }
        })
    }
}

/// Logs what the recording bus saw and optionally renders the frame.
fn report_dry_run(transcript: &Transcript, preview: Option<&Path>) -> Result<()> {
    let wire = transcript.wire_log();
    let commands = wire
        .iter()
        .filter(|event| matches!(event, WireEvent::Command(_)))
        .count();
    info!(
        "Dry run: {} transactions, {} commands, {:?} of panel time",
        transcript.transactions().len(),
        commands,
        transcript.elapsed()
    );

    let Some(path) = preview else {
        return Ok(());
    };
    match transmitted_frame(&wire) {
        Some(frame) => {
            let canvas = Canvas::from_packed(EPD_WIDTH, EPD_HEIGHT, frame)?;
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            canvas.write_png(BufWriter::new(file))?;
            info!("Preview written to {}", path.display());
        }
        None => warn!("No frame was transmitted, skipping preview"),
    }
    Ok(())
}

/// The data that followed the last start-of-frame command.
fn transmitted_frame(wire: &[WireEvent]) -> Option<&[u8]> {
    let start = Command::DataStartTransmission as u8;
    let frame = wire.windows(2).rev().find_map(|pair| match pair {
        [WireEvent::Command(c), WireEvent::Data(data)] if *c == start => Some(data.as_slice()),
        _ => None,
    });
    if let Some(frame) = frame {
        debug!("Found transmitted frame of {} bytes", frame.len());
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use inkcast_epd::DriverConfig;

    /// Cancels the run and never delivers an image.
    struct CancellingSource(CancelFlag);

    impl ImageSource for CancellingSource {
        async fn fetch_image(&self, _location: &str) -> anyhow::Result<DynamicImage> {
            self.0.cancel();
            std::future::pending().await
        }
    }

    /// Returns a solid image in one palette color.
    struct SolidSource(PaletteColor);

    impl ImageSource for SolidSource {
        async fn fetch_image(&self, _location: &str) -> anyhow::Result<DynamicImage> {
            let c = self.0.color();
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                1600,
                960,
                Rgb([c.r, c.g, c.b]),
            )))
        }
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["inkcast", "--dry-run", "clear", "--color", "red"]).unwrap();
        assert!(cli.dry_run);
        assert!(matches!(
            cli.command,
            Commands::Clear {
                color: PaletteColor::Red
            }
        ));

        let cli = Cli::try_parse_from(["inkcast", "show", "Reykjavik"]).unwrap();
        assert!(matches!(cli.command, Commands::Show { ref location } if location == "Reykjavik"));
    }

    #[test]
    fn test_cli_rejects_bad_usage() {
        assert!(Cli::try_parse_from(["inkcast"]).is_err());
        assert!(Cli::try_parse_from(["inkcast", "show"]).is_err());
        assert!(Cli::try_parse_from(["inkcast", "clear", "extra"]).is_err());
        assert!(Cli::try_parse_from(["inkcast", "clear", "--color", "purple"]).is_err());
        assert!(Cli::try_parse_from(["inkcast", "--preview", "a.png", "clear"]).is_err());
    }

    #[test]
    fn test_dry_run_clear_preview() {
        let runtime = Runtime::new().unwrap();
        let command = Commands::Clear {
            color: PaletteColor::Green,
        };
        let job = Job {
            command: &command,
            source: None::<&WeatherIllustrator>,
            runtime: &runtime,
            fit: FitMode::Cover,
        };
        let (mut device, transcript) = mock_device(DriverConfig::default());

        let outcome = job.run(&mut device, &CancelFlag::new()).unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let wire = transcript.wire_log();
        let frame = transmitted_frame(&wire).unwrap();
        let canvas = Canvas::from_packed(EPD_WIDTH, EPD_HEIGHT, frame).unwrap();
        assert!(canvas.indices().iter().all(|&i| i == PaletteColor::Green.index()));
    }

    #[test]
    fn test_show_without_source_still_sleeps() {
        let runtime = Runtime::new().unwrap();
        let command = Commands::Show {
            location: "Lisbon".to_string(),
        };
        let job = Job {
            command: &command,
            source: None::<&WeatherIllustrator>,
            runtime: &runtime,
            fit: FitMode::Cover,
        };
        let (mut device, transcript) = mock_device(DriverConfig::default());

        let err = job.run(&mut device, &CancelFlag::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UpstreamFetch(_))
        ));
        assert!(transcript
            .wire_log()
            .contains(&WireEvent::Command(Command::DeepSleep as u8)));
    }

    #[test]
    fn test_no_frame_without_start_command() {
        assert!(transmitted_frame(&[WireEvent::Command(0x04)]).is_none());
    }

    #[test]
    fn test_cancelled_fetch_skips_render_and_sleeps() {
        let runtime = Runtime::new().unwrap();
        let cancel = CancelFlag::new();
        let source = CancellingSource(cancel.clone());
        let command = Commands::Show {
            location: "Tromso".to_string(),
        };
        let job = Job {
            command: &command,
            source: Some(&source),
            runtime: &runtime,
            fit: FitMode::Cover,
        };
        let (mut device, transcript) = mock_device(DriverConfig::default());

        let outcome = job.run(&mut device, &cancel).unwrap();
        assert_eq!(outcome, Outcome::Cancelled);

        let wire = transcript.wire_log();
        assert!(!wire.contains(&WireEvent::Command(Command::DataStartTransmission as u8)));
        assert!(wire.contains(&WireEvent::Command(Command::DeepSleep as u8)));
        assert!(transmitted_frame(&wire).is_none());
    }

    #[test]
    fn test_show_renders_fetched_image() {
        let runtime = Runtime::new().unwrap();
        let source = SolidSource(PaletteColor::Blue);
        let command = Commands::Show {
            location: "Nuuk".to_string(),
        };
        let job = Job {
            command: &command,
            source: Some(&source),
            runtime: &runtime,
            fit: FitMode::Cover,
        };
        let (mut device, transcript) = mock_device(DriverConfig::default());

        let outcome = job.run(&mut device, &CancelFlag::new()).unwrap();
        assert_eq!(outcome, Outcome::Completed);

        let wire = transcript.wire_log();
        let frame = transmitted_frame(&wire).unwrap();
        let canvas = Canvas::from_packed(EPD_WIDTH, EPD_HEIGHT, frame).unwrap();
        let blue = canvas
            .indices()
            .iter()
            .filter(|&&i| i == PaletteColor::Blue.index())
            .count();
        assert!(blue * 100 >= canvas.indices().len() * 99);
        assert!(wire.contains(&WireEvent::Command(Command::DeepSleep as u8)));
    }
}
