//! Fitting arbitrary images onto the fixed-size panel canvas.
//!
//! Cover mode scales the image until it fills the canvas and crops the
//! overflow; contain mode scales it until it fits and letterboxes the rest
//! with white.

use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use tracing::debug;

use crate::canvas::Canvas;
use crate::quantize::quantize_rgb;
use crate::{Error, Result, EPD_HEIGHT, EPD_WIDTH};

/// Canvas background for letterboxed areas.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Scaling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Fill the canvas, cropping what does not fit.
    #[default]
    Cover,
    /// Fit inside the canvas, centered on white.
    Contain,
}

impl FitMode {
    /// Returns the scaled size of a `width` x `height` image for `canvas`.
    ///
    /// In cover mode this is the nominal size before cropping and can be far
    /// larger than the canvas; [`fit`] never allocates it.
    pub fn scaled_size(&self, width: u32, height: u32, canvas: (u32, u32)) -> (u32, u32) {
        let image_ratio = width as f64 / height as f64;
        let canvas_ratio = canvas.0 as f64 / canvas.1 as f64;
        let wider = image_ratio > canvas_ratio;

        let (new_width, new_height) = match (self, wider) {
            (FitMode::Contain, true) | (FitMode::Cover, false) => {
                (canvas.0, (canvas.0 as f64 / image_ratio).round() as u32)
            }
            (FitMode::Contain, false) | (FitMode::Cover, true) => {
                ((canvas.1 as f64 * image_ratio).round() as u32, canvas.1)
            }
        };
        (new_width.max(1), new_height.max(1))
    }
}

impl FromStr for FitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            _ => Err(format!("Invalid fit mode: {}. Use: cover, contain", s)),
        }
    }
}

impl std::fmt::Display for FitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitMode::Cover => write!(f, "cover"),
            FitMode::Contain => write!(f, "contain"),
        }
    }
}

/// Returns a new image exactly `canvas_size`, holding `image` scaled per `mode`
/// and centered.
pub fn fit(image: &DynamicImage, canvas_size: (u32, u32), mode: FitMode) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    if canvas_size.0 == 0 || canvas_size.1 == 0 {
        return Err(Error::EmptyImage {
            width: canvas_size.0,
            height: canvas_size.1,
        });
    }

    if mode == FitMode::Cover {
        let (x, y, crop_width, crop_height) = cover_crop(width, height, canvas_size);
        debug!(
            "Fitting {}x{} image to {}x{} (cover): cropped to {}x{} at ({}, {})",
            width, height, canvas_size.0, canvas_size.1, crop_width, crop_height, x, y
        );
        return Ok(image
            .crop_imm(x, y, crop_width, crop_height)
            .resize_exact(canvas_size.0, canvas_size.1, FilterType::Lanczos3)
            .to_rgb8());
    }

    let (new_width, new_height) = mode.scaled_size(width, height, canvas_size);
    debug!(
        "Fitting {}x{} image to {}x{} ({}): scaled to {}x{}",
        width, height, canvas_size.0, canvas_size.1, mode, new_width, new_height
    );

    let scaled = image
        .resize_exact(new_width, new_height, FilterType::Lanczos3)
        .to_rgb8();

    // Contained content never exceeds the canvas, so offsets are non-negative
    let x = (canvas_size.0 as i64 - new_width as i64).div_euclid(2);
    let y = (canvas_size.1 as i64 - new_height as i64).div_euclid(2);

    let mut canvas = RgbImage::from_pixel(canvas_size.0, canvas_size.1, BACKGROUND);
    imageops::replace(&mut canvas, &scaled, x, y);
    Ok(canvas)
}

/// Centered source rectangle with the canvas aspect ratio, as
/// `(x, y, width, height)`.
fn cover_crop(width: u32, height: u32, canvas: (u32, u32)) -> (u32, u32, u32, u32) {
    let (w, h) = (width as u64, height as u64);
    let (cw, ch) = (canvas.0 as u64, canvas.1 as u64);
    if w * ch > h * cw {
        // Wider than the canvas: keep full height
        let crop = ((h * cw + ch / 2) / ch).clamp(1, w) as u32;
        ((width - crop) / 2, 0, crop, height)
    } else {
        let crop = ((w * ch + cw / 2) / cw).clamp(1, h) as u32;
        (0, (height - crop) / 2, width, crop)
    }
}

/// Fits `image` to the panel and quantizes it, ready for rendering.
pub fn prepare(image: &DynamicImage, mode: FitMode) -> Result<Canvas> {
    let fitted = fit(image, (EPD_WIDTH, EPD_HEIGHT), mode)?;
    quantize_rgb(fitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    fn is_white(pixel: &Rgb<u8>) -> bool {
        pixel.0 == [255, 255, 255]
    }

    #[test]
    fn test_scaled_size() {
        // Wider than 5:3
        assert_eq!(FitMode::Cover.scaled_size(1792, 1024, (800, 480)), (840, 480));
        assert_eq!(FitMode::Contain.scaled_size(1792, 1024, (800, 480)), (800, 457));
        // Taller than 5:3
        assert_eq!(FitMode::Cover.scaled_size(1000, 1000, (800, 480)), (800, 800));
        assert_eq!(FitMode::Contain.scaled_size(1000, 1000, (800, 480)), (480, 480));
        // Degenerate strips never scale to zero
        assert_eq!(FitMode::Contain.scaled_size(10_000, 1, (800, 480)), (800, 1));
    }

    #[test]
    fn test_cover_fills_canvas() {
        for (w, h) in [(1792, 1024), (300, 900), (800, 480), (17, 5)] {
            let image = solid(w, h, [0, 0, 0]);
            let out = fit(&image, (800, 480), FitMode::Cover).unwrap();
            assert_eq!(out.dimensions(), (800, 480));
            assert!(
                out.pixels().all(|p| p.0[0] < 8 && p.0[1] < 8 && p.0[2] < 8),
                "background visible for {}x{}",
                w,
                h
            );
        }
    }

    #[test]
    fn test_cover_crop_is_centered() {
        assert_eq!(cover_crop(1792, 1024, (800, 480)), (42, 0, 1707, 1024));
        assert_eq!(cover_crop(1000, 1000, (800, 480)), (0, 200, 1000, 600));
        assert_eq!(cover_crop(800, 480, (800, 480)), (0, 0, 800, 480));
        assert_eq!(cover_crop(10_000, 1, (800, 480)), (4999, 0, 2, 1));
        assert_eq!(cover_crop(1, 10_000, (800, 480)), (0, 4999, 1, 1));
    }

    #[test]
    fn test_cover_thin_strips() {
        for (w, h) in [(10_000, 1), (1, 10_000)] {
            let image = solid(w, h, [0, 0, 255]);
            let out = fit(&image, (800, 480), FitMode::Cover).unwrap();
            assert_eq!(out.dimensions(), (800, 480));
            assert!(out.pixels().all(|p| p.0[2] > 247 && p.0[0] < 8));
        }
    }

    #[test]
    fn test_contain_letterboxes_with_white() {
        let image = solid(1000, 1000, [0, 0, 0]);
        let out = fit(&image, (800, 480), FitMode::Contain).unwrap();
        assert_eq!(out.dimensions(), (800, 480));

        // 480x480 content centered at x = 160
        for y in [0, 240, 479] {
            assert!(is_white(out.get_pixel(0, y)));
            assert!(is_white(out.get_pixel(159, y)));
            assert!(!is_white(out.get_pixel(160, y)));
            assert!(!is_white(out.get_pixel(639, y)));
            assert!(is_white(out.get_pixel(640, y)));
            assert!(is_white(out.get_pixel(799, y)));
        }
    }

    #[test]
    fn test_contain_keeps_aspect_ratio() {
        let image = solid(1792, 1024, [0, 0, 0]);
        let out = fit(&image, (800, 480), FitMode::Contain).unwrap();
        let content_rows = (0..480).filter(|&y| !is_white(out.get_pixel(400, y))).count();
        assert_eq!(content_rows, 457);
        let ratio = 800.0 / content_rows as f64;
        assert!((ratio - 1792.0 / 1024.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 0));
        assert!(matches!(
            fit(&image, (800, 480), FitMode::Cover),
            Err(Error::EmptyImage { width: 100, height: 0 })
        ));
        let image = solid(4, 4, [0, 0, 0]);
        assert!(fit(&image, (0, 480), FitMode::Cover).is_err());
    }

    #[test]
    fn test_prepare_produces_panel_canvas() {
        let canvas = prepare(&solid(640, 480, [255, 0, 0]), FitMode::Cover).unwrap();
        assert_eq!(canvas.dimensions(), (EPD_WIDTH, EPD_HEIGHT));
        assert!(canvas.indices().iter().all(|&i| i == 4));
    }

    #[test]
    fn test_fit_mode_from_str() {
        assert_eq!("cover".parse::<FitMode>(), Ok(FitMode::Cover));
        assert_eq!("Contain".parse::<FitMode>(), Ok(FitMode::Contain));
        assert!("stretch".parse::<FitMode>().is_err());
    }
}
