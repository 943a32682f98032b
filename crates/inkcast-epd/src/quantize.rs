//! Floyd-Steinberg quantization onto the 7-color palette.

use image::{DynamicImage, RgbImage};
use tracing::debug;

use crate::canvas::Canvas;
use crate::palette::PaletteColor;
use crate::{Error, Result};

/// Diffusion weights out of 16: right, below-left, below, below-right.
const RIGHT: i16 = 7;
const BELOW_LEFT: i16 = 3;
const BELOW: i16 = 5;
const BELOW_RIGHT: i16 = 1;

/// Quantizes an image to palette indices with error diffusion.
///
/// Alpha and any existing palette are dropped first. The result depends only
/// on the input pixels.
pub fn quantize(image: &DynamicImage) -> Result<Canvas> {
    quantize_rgb(image.to_rgb8())
}

/// Quantizes an RGB image and returns its palette indices.
///
/// Pixels are visited row-major. Each pixel's quantization error is spread
/// to its unvisited neighbors; neighbors past the image edge are skipped.
pub fn quantize_rgb(image: RgbImage) -> Result<Canvas> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }

    let w = width as usize;
    let h = height as usize;
    let mut work: Vec<[i16; 3]> = image
        .pixels()
        .map(|p| [p.0[0] as i16, p.0[1] as i16, p.0[2] as i16])
        .collect();
    let mut indices = Vec::with_capacity(w * h);

    for y in 0..h {
        for x in 0..w {
            let [r, g, b] = work[y * w + x].map(|c| c.clamp(0, 255) as u8);
            let nearest = PaletteColor::nearest(r, g, b);
            indices.push(nearest.index());

            let target = nearest.color();
            let error = [
                r as i16 - target.r as i16,
                g as i16 - target.g as i16,
                b as i16 - target.b as i16,
            ];

            if x + 1 < w {
                diffuse(&mut work[y * w + x + 1], error, RIGHT);
            }
            if y + 1 < h {
                let below = (y + 1) * w + x;
                if x > 0 {
                    diffuse(&mut work[below - 1], error, BELOW_LEFT);
                }
                diffuse(&mut work[below], error, BELOW);
                if x + 1 < w {
                    diffuse(&mut work[below + 1], error, BELOW_RIGHT);
                }
            }
        }
    }

    debug!("Quantized {}x{} image to 7-color palette", width, height);
    Canvas::from_indices(width, height, indices)
}

fn diffuse(pixel: &mut [i16; 3], error: [i16; 3], weight: i16) {
    for (channel, e) in pixel.iter_mut().zip(error) {
        *channel += e * weight / 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 7 % 256) as u8,
            ])
        }))
    }

    #[test]
    fn test_palette_colors_map_exactly() {
        for color in PaletteColor::ALL {
            let c = color.color();
            let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([c.r, c.g, c.b])));
            let canvas = quantize(&image).unwrap();
            assert!(canvas.indices().iter().all(|&i| i == color.index()));
        }
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let image = gradient(120, 72);
        let first = quantize(&image).unwrap();
        let second = quantize(&image).unwrap();
        assert_eq!(first.indices(), second.indices());
    }

    #[test]
    fn test_only_palette_indices() {
        let canvas = quantize(&gradient(200, 100)).unwrap();
        assert_eq!(canvas.dimensions(), (200, 100));
        assert!(canvas.indices().iter().all(|&i| i <= 6));
    }

    #[test]
    fn test_dithering_mixes_colors() {
        let gray = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([128, 128, 128])));
        let canvas = quantize(&gray).unwrap();
        let mut seen = [false; 7];
        for &i in canvas.indices() {
            seen[i as usize] = true;
        }
        assert!(seen.iter().filter(|&&s| s).count() >= 2);
    }

    #[test]
    fn test_error_carries_to_neighbors() {
        // Pale yellow alone maps to white; the blue deficit tips its neighbor to yellow
        let image = RgbImage::from_pixel(2, 1, Rgb([255, 255, 130]));
        let canvas = quantize_rgb(image).unwrap();
        assert_eq!(canvas.indices(), &[1, 5]);
    }

    #[test]
    fn test_alpha_is_discarded() {
        let rgba = RgbaImage::from_pixel(6, 4, Rgba([0, 0, 255, 0]));
        let canvas = quantize(&DynamicImage::ImageRgba8(rgba)).unwrap();
        assert!(canvas.indices().iter().all(|&i| i == PaletteColor::Blue.index()));
    }

    #[test]
    fn test_single_column_and_row() {
        let column = quantize_rgb(RgbImage::from_pixel(1, 4, Rgb([255, 0, 0]))).unwrap();
        assert_eq!(column.dimensions(), (1, 4));
        assert!(column.indices().iter().all(|&i| i == PaletteColor::Red.index()));

        let row = quantize_rgb(RgbImage::from_pixel(5, 1, Rgb([128, 128, 128]))).unwrap();
        assert_eq!(row.dimensions(), (5, 1));
        assert!(row.indices().iter().all(|&i| i <= 6));

        let pixel = quantize(&gradient(1, 1)).unwrap();
        assert_eq!(pixel.indices().len(), 1);
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(matches!(
            quantize_rgb(RgbImage::new(0, 0)),
            Err(Error::EmptyImage { width: 0, height: 0 })
        ));
        assert!(matches!(
            quantize(&DynamicImage::ImageRgb8(RgbImage::new(3, 0))),
            Err(Error::EmptyImage { width: 3, height: 0 })
        ));
    }
}
