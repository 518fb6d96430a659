//! Downscaling of uploaded images to the configured bounding box.

use image::DynamicImage;
use image::imageops::FilterType;
use std::io::Cursor;

use crate::config::UploadsConfig;

#[derive(Debug, Clone, Copy)]
pub struct ImageOptimizer {
    max_width: u32,
    max_height: u32,
    jpeg_quality: u8,
}

/// Uniform scale factor `min(maxW/w, maxH/h)` capped at 1.0 — images are
/// never upscaled. `None` means the image already fits.
#[must_use]
pub fn target_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }

    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );

    if scale >= 1.0 {
        return None;
    }

    let target_w = (f64::from(width) * scale).round().max(1.0) as u32;
    let target_h = (f64::from(height) * scale).round().max(1.0) as u32;
    Some((target_w, target_h))
}

impl ImageOptimizer {
    #[must_use]
    pub const fn new(max_width: u32, max_height: u32, jpeg_quality: u8) -> Self {
        Self {
            max_width,
            max_height,
            jpeg_quality,
        }
    }

    #[must_use]
    pub fn from_config(config: &UploadsConfig) -> Self {
        Self::new(
            config.image_max_width,
            config.image_max_height,
            config.jpeg_quality,
        )
    }

    /// Downscale an already decoded image. Returns `None` when the image
    /// fits the bounding box or re-encoding fails; callers fall back to
    /// storing the original bytes.
    #[must_use]
    pub fn shrink(&self, img: &DynamicImage, extension: &str) -> Option<Vec<u8>> {
        let (target_w, target_h) =
            target_dimensions(img.width(), img.height(), self.max_width, self.max_height)?;

        let resized = img.resize_exact(target_w, target_h, FilterType::Lanczos3);

        let mut out = Vec::new();
        match extension {
            // PNG keeps the alpha channel through the resample.
            "png" => {
                resized
                    .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
                    .ok()?;
            }
            _ => {
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, self.jpeg_quality);
                DynamicImage::ImageRgb8(resized.to_rgb8())
                    .write_with_encoder(encoder)
                    .ok()?;
            }
        }

        Some(out)
    }

    /// Decode + shrink in one step, soft-failing on undecodable input.
    #[must_use]
    pub fn optimize(&self, data: &[u8], extension: &str) -> Option<Vec<u8>> {
        let img = image::load_from_memory(data).ok()?;
        self.shrink(&img, extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_scales_to_width_bound() {
        // scale = min(1920/2000, 1080/1000) = 0.96
        assert_eq!(target_dimensions(2000, 1000, 1920, 1080), Some((1920, 960)));
    }

    #[test]
    fn small_image_is_never_upscaled() {
        assert_eq!(target_dimensions(800, 600, 1920, 1080), None);
    }

    #[test]
    fn exact_fit_needs_no_work() {
        assert_eq!(target_dimensions(1920, 1080, 1920, 1080), None);
    }

    #[test]
    fn square_scales_to_height_bound() {
        assert_eq!(
            target_dimensions(4000, 4000, 1920, 1080),
            Some((1080, 1080))
        );
    }

    #[test]
    fn shrink_produces_the_expected_dimensions() {
        let optimizer = ImageOptimizer::new(1920, 1080, 85);
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(2000, 1000));

        let out = optimizer.shrink(&img, "jpg").expect("should downscale");
        let reloaded = image::load_from_memory(&out).expect("re-encoded image decodes");
        assert_eq!((reloaded.width(), reloaded.height()), (1920, 960));
    }

    #[test]
    fn shrink_keeps_alpha_for_png() {
        let optimizer = ImageOptimizer::new(100, 100, 85);
        let img = DynamicImage::ImageRgba8(image::RgbaImage::new(400, 200));

        let out = optimizer.shrink(&img, "png").expect("should downscale");
        let reloaded = image::load_from_memory(&out).expect("png decodes");
        assert_eq!((reloaded.width(), reloaded.height()), (100, 50));
        assert!(reloaded.color().has_alpha());
    }

    #[test]
    fn optimize_soft_fails_on_garbage() {
        let optimizer = ImageOptimizer::new(1920, 1080, 85);
        assert!(optimizer.optimize(b"definitely not an image", "jpg").is_none());
    }
}
