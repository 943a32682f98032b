//! Error types for the e-paper library.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing images or talking to the panel.
#[derive(Error, Debug)]
pub enum Error {
    /// Canvas does not have the panel's exact dimensions.
    #[error("Invalid canvas dimensions: {}x{}, expected {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Canvas holds an index outside the 7-color palette.
    #[error("Palette index {index} at pixel {position} is outside the 7-color palette")]
    PaletteMismatch { index: u8, position: usize },

    /// Pixel buffer length does not match the canvas dimensions.
    #[error("Pixel buffer size mismatch: expected {expected}, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Packing needs pixel pairs.
    #[error("Cannot pack an odd number of pixels: {0}")]
    OddPixelCount(usize),

    /// Source image or target canvas has a zero dimension.
    #[error("Image has no area: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    /// SPI bus open, write or close failed.
    #[error("Bus error during {operation}: {source}")]
    Bus {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Control line could not be driven, read or released.
    #[error("GPIO error on {line} line: {source}")]
    Line {
        line: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Busy line never reported idle.
    #[error("Panel still busy after {0:?}")]
    BusyTimeout(Duration),

    /// Operation not allowed in the driver's current state.
    #[error("Cannot {operation} while panel is {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::epd::PanelState,
    },

    /// Image source failed.
    #[error("Image source failed: {0}")]
    UpstreamFetch(String),

    /// Palette PNG could not be written.
    #[error("PNG encoding error: {0}")]
    Encode(#[from] png::EncodingError),
}

impl Error {
    /// Wraps an I/O error from a bus operation.
    pub fn bus(operation: &'static str, source: std::io::Error) -> Self {
        Error::Bus { operation, source }
    }

    /// Wraps an I/O error from a control line.
    pub fn line(line: &'static str, source: std::io::Error) -> Self {
        Error::Line { line, source }
    }

    /// Returns true for failures of the physical bus or its control lines.
    pub fn is_bus_failure(&self) -> bool {
        matches!(
            self,
            Error::Bus { .. } | Error::Line { .. } | Error::BusyTimeout(_)
        )
    }
}
