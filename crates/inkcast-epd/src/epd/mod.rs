//! E-paper panel module.
//!
//! Provides control over the 800x480 7-color panel via SPI and GPIO.

mod device;

pub mod packing;
pub mod protocol;

pub use device::{ControlLines, DriverConfig, EpdDevice, LineRole, PanelState};
pub use packing::{pack, unpack};
pub use protocol::{Command, InitStep, FRAME_BYTES, INIT_SEQUENCE};
