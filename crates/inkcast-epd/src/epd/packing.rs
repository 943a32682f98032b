//! 4-bit-per-pixel wire packing.

use crate::canvas::Canvas;
use crate::palette::PaletteColor;
use crate::{Error, Result};

/// Highest index the palette defines.
const MAX_INDEX: u8 = 6;

/// Fails on the first index outside the palette.
pub fn check_indices(indices: &[u8]) -> Result<()> {
    match indices.iter().position(|&i| i > MAX_INDEX) {
        Some(position) => Err(Error::PaletteMismatch {
            index: indices[position],
            position,
        }),
        None => Ok(()),
    }
}

/// Packs a canvas row-major, two pixels per byte, high nibble first.
pub fn pack(canvas: &Canvas) -> Result<Vec<u8>> {
    pack_indices(canvas.indices())
}

/// Packs raw palette indices.
pub fn pack_indices(indices: &[u8]) -> Result<Vec<u8>> {
    if indices.len() % 2 != 0 {
        return Err(Error::OddPixelCount(indices.len()));
    }
    check_indices(indices)?;
    Ok(indices
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Splits packed bytes back into per-pixel indices.
pub fn unpack(packed: &[u8]) -> Vec<u8> {
    packed.iter().flat_map(|&b| [b >> 4, b & 0x0F]).collect()
}

/// A buffer of `len` bytes with both nibbles set to `color`.
pub fn solid_frame(color: PaletteColor, len: usize) -> Vec<u8> {
    let index = color.index();
    vec![(index << 4) | index; len]
}
