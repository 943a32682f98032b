//! Bus, control line and timing capabilities used by the panel driver.
//!
//! The driver only talks to hardware through these traits, so the same
//! protocol code runs against spidev/sysfs on a Raspberry Pi and against the
//! recording implementations in [`mock`].

mod linux;
pub mod mock;

pub use linux::{SpidevBus, SysfsLine};

use std::time::Duration;

use crate::Result;

/// SPI clock polarity/phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    #[default]
    Mode0,
    Mode1,
    Mode2,
    Mode3,
}

/// Bus parameters the controller requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    pub clock_hz: u32,
    pub mode: SpiMode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            clock_hz: 4_000_000,
            mode: SpiMode::Mode0,
        }
    }
}

/// A serial bus the panel controller listens on.
pub trait PhysicalBus {
    /// Opens the bus with the given clock rate and mode.
    fn open(&mut self, config: BusConfig) -> Result<()>;

    /// Writes bytes to the bus.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Closes the bus.
    fn close(&mut self) -> Result<()>;

    /// Returns true while the bus is open.
    fn is_open(&self) -> bool;
}

/// A single digital control line.
pub trait DigitalLine {
    fn set_high(&mut self) -> Result<()>;

    fn set_low(&mut self) -> Result<()>;

    /// Reads the line level; true means high.
    fn read(&mut self) -> Result<bool>;

    /// Gives the line back to the system.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Blocking delays.
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Delay backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
