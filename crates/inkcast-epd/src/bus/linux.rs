//! spidev bus and sysfs GPIO lines for Linux boards.

use std::io::{self, Write};
use std::path::PathBuf;

use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::{self, Direction, Pin};
use tracing::{debug, info};

use super::{BusConfig, DigitalLine, PhysicalBus, SpiMode};
use crate::{Error, Result};

/// Largest single spidev transfer (the kernel's default `bufsiz`).
const SPI_CHUNK_SIZE: usize = 4096;

/// SPI bus backed by a `/dev/spidevB.C` node.
pub struct SpidevBus {
    path: PathBuf,
    spi: Option<Spidev>,
}

impl SpidevBus {
    /// Creates a bus for the given device node. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            spi: None,
        }
    }
}

fn mode_flags(mode: SpiMode) -> SpiModeFlags {
    match mode {
        SpiMode::Mode0 => SpiModeFlags::SPI_MODE_0,
        SpiMode::Mode1 => SpiModeFlags::SPI_MODE_1,
        SpiMode::Mode2 => SpiModeFlags::SPI_MODE_2,
        SpiMode::Mode3 => SpiModeFlags::SPI_MODE_3,
    }
}

impl PhysicalBus for SpidevBus {
    fn open(&mut self, config: BusConfig) -> Result<()> {
        let mut spi = Spidev::open(&self.path).map_err(|e| Error::bus("open", e))?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.clock_hz)
            .mode(mode_flags(config.mode))
            .build();
        spi.configure(&options)
            .map_err(|e| Error::bus("configure", e))?;

        info!(
            "SPI opened: {} at {}Hz, {:?}",
            self.path.display(),
            config.clock_hz,
            config.mode
        );
        self.spi = Some(spi);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        let spi = self.spi.as_mut().ok_or_else(|| {
            Error::bus(
                "write",
                io::Error::new(io::ErrorKind::NotConnected, "bus is not open"),
            )
        })?;
        for chunk in data.chunks(SPI_CHUNK_SIZE) {
            spi.write_all(chunk).map_err(|e| Error::bus("write", e))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.spi.take().is_some() {
            debug!("SPI closed: {}", self.path.display());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.spi.is_some()
    }
}

/// A GPIO line driven through `/sys/class/gpio`.
pub struct SysfsLine {
    name: &'static str,
    pin: Pin,
}

fn gpio_error(line: &'static str, err: sysfs_gpio::Error) -> Error {
    let source = match err {
        sysfs_gpio::Error::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    };
    Error::line(line, source)
}

impl SysfsLine {
    /// Exports `number` as an output, initially low.
    pub fn output(name: &'static str, number: u64) -> Result<Self> {
        Self::export(name, number, Direction::Low)
    }

    /// Exports `number` as an input.
    pub fn input(name: &'static str, number: u64) -> Result<Self> {
        Self::export(name, number, Direction::In)
    }

    fn export(name: &'static str, number: u64, direction: Direction) -> Result<Self> {
        let pin = Pin::new(number);
        pin.export().map_err(|e| gpio_error(name, e))?;
        if let Err(e) = pin.set_direction(direction) {
            // Leave no exported pin behind
            let _ = pin.unexport();
            return Err(gpio_error(name, e));
        }
        debug!("GPIO {} exported as {} line", number, name);
        Ok(Self { name, pin })
    }
}

impl DigitalLine for SysfsLine {
    fn set_high(&mut self) -> Result<()> {
        self.pin.set_value(1).map_err(|e| gpio_error(self.name, e))
    }

    fn set_low(&mut self) -> Result<()> {
        self.pin.set_value(0).map_err(|e| gpio_error(self.name, e))
    }

    fn read(&mut self) -> Result<bool> {
        let value = self.pin.get_value().map_err(|e| gpio_error(self.name, e))?;
        Ok(value != 0)
    }

    fn release(&mut self) -> Result<()> {
        self.pin.unexport().map_err(|e| gpio_error(self.name, e))
    }
}
