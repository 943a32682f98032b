//! Palette-indexed canvas for the e-paper panel.

use std::io::Write;

use image::{Rgb, RgbImage};

use crate::epd::packing::{check_indices, unpack};
use crate::palette::{PaletteColor, PALETTE};
use crate::{Error, Result, EPD_HEIGHT, EPD_WIDTH};

/// Raster of palette indices, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Canvas {
    /// One palette index per pixel.
    indices: Vec<u8>,
    width: u32,
    height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(EPD_WIDTH, EPD_HEIGHT, PaletteColor::White)
    }
}

impl Canvas {
    /// Creates a canvas filled with a single color.
    pub fn new(width: u32, height: u32, fill: PaletteColor) -> Self {
        Self {
            indices: vec![fill.index(); width as usize * height as usize],
            width,
            height,
        }
    }

    /// Creates a canvas from raw indices.
    ///
    /// Only the length is checked here; index conformance is checked when
    /// the canvas is packed or rendered.
    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if indices.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: indices.len(),
            });
        }
        Ok(Self {
            indices,
            width,
            height,
        })
    }

    /// Rebuilds a canvas from a packed wire buffer.
    pub fn from_packed(width: u32, height: u32, packed: &[u8]) -> Result<Self> {
        Self::from_indices(width, height, unpack(packed))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns the raw palette indices.
    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Fills the whole canvas with one color.
    pub fn fill(&mut self, color: PaletteColor) {
        self.indices.fill(color.index());
    }

    /// Sets a pixel at the given coordinates.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: PaletteColor) {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            self.indices[idx] = color.index();
        }
    }

    /// Gets the raw index at the given coordinates.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            Some(self.indices[idx])
        } else {
            None
        }
    }

    /// Expands the canvas to RGB.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        check_indices(&self.indices)?;
        let mut image = RgbImage::new(self.width, self.height);
        for (pixel, &index) in image.pixels_mut().zip(&self.indices) {
            let color = PALETTE[index as usize];
            *pixel = Rgb([color.r, color.g, color.b]);
        }
        Ok(image)
    }

    /// Writes an 8-bit indexed PNG whose palette is exactly the panel palette.
    pub fn write_png<W: Write>(&self, writer: W) -> Result<()> {
        check_indices(&self.indices)?;

        let plte: Vec<u8> = PALETTE.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
        let mut encoder = png::Encoder::new(writer, self.width, self.height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(plte);

        let mut png_writer = encoder.write_header()?;
        png_writer.write_image_data(&self.indices)?;
        png_writer.finish()?;
        Ok(())
    }
}
