//! Inkcast e-paper library
//!
//! Drives 7-color 800x480 e-paper panels over SPI: fits arbitrary images to
//! the panel, dithers them onto the fixed palette, packs them into the
//! controller's 4-bit wire format and sequences the controller protocol.

pub mod bus;
pub mod canvas;
pub mod epd;
pub mod error;
pub mod fit;
pub mod palette;
pub mod quantize;
pub mod session;

pub use bus::{BusConfig, Delay, DigitalLine, PhysicalBus, SpiMode, StdDelay};
pub use canvas::Canvas;
pub use epd::{DriverConfig, EpdDevice, PanelState};
pub use error::{Error, Result};
pub use fit::{fit, prepare, FitMode};
pub use palette::{Color, PaletteColor, PALETTE};
pub use quantize::quantize;
pub use session::{CancelFlag, Outcome};

/// Panel dimensions
pub const EPD_WIDTH: u32 = 800;
pub const EPD_HEIGHT: u32 = 480;
