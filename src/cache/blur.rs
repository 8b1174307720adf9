//! Background-blur preview rendering.

use crate::segmentation::Mask;
use image::{imageops, Rgb, RgbImage};

/// Quantize a 0..1 blur intensity into `0..=buckets`.
pub fn intensity_bucket(intensity: f32, buckets: u8) -> u8 {
    let buckets = buckets.max(1);
    let clamped = if intensity.is_finite() { intensity.clamp(0.0, 1.0) } else { 0.0 };
    (clamped * buckets as f32).round() as u8
}

/// Blur radius in pixels for a bucket.
pub fn bucket_radius(bucket: u8, buckets: u8, max_radius: f32) -> f32 {
    max_radius * bucket as f32 / buckets.max(1) as f32
}

/// Preview dimensions: longest side capped at `max_side`, aspect kept.
pub fn preview_size(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (width, height);
    }
    let scale = max_side as f64 / longest as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Keep the foreground sharp and blur what the mask marks as background.
pub fn render_preview(image: &RgbImage, mask: &Mask, radius: f32) -> RgbImage {
    let _span = tracing::debug_span!("render_preview", radius).entered();
    if radius < 0.5 {
        return image.clone();
    }
    let mask = if mask.dimensions() == image.dimensions() {
        mask.clone()
    } else {
        mask.resampled(image.width(), image.height())
    };
    // Gaussian sigma covering roughly the requested radius.
    let blurred = imageops::blur(image, radius / 2.0);
    composite(image, &blurred, &mask)
}

/// `alpha * foreground + (1 - alpha) * background`, per pixel.
pub fn composite(foreground: &RgbImage, background: &RgbImage, mask: &Mask) -> RgbImage {
    RgbImage::from_fn(foreground.width(), foreground.height(), |x, y| {
        let a = mask.get(x, y) as u32;
        let f = foreground.get_pixel(x, y);
        let b = background.get_pixel(x, y);
        let mix = |c: usize| ((f[c] as u32 * a + b[c] as u32 * (255 - a) + 127) / 255) as u8;
        Rgb([mix(0), mix(1), mix(2)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_clamp_and_round() {
        assert_eq!(intensity_bucket(-1.0, 10), 0);
        assert_eq!(intensity_bucket(0.44, 10), 4);
        assert_eq!(intensity_bucket(0.46, 10), 5);
        assert_eq!(intensity_bucket(3.0, 10), 10);
        assert_eq!(intensity_bucket(f32::NAN, 10), 0);
        assert_eq!(bucket_radius(5, 10, 24.0), 12.0);
    }

    #[test]
    fn preview_size_caps_longest_side() {
        assert_eq!(preview_size(1920, 1080, 512), (512, 288));
        assert_eq!(preview_size(300, 400, 512), (300, 400));
        assert_eq!(preview_size(1000, 4000, 512), (128, 512));
    }

    #[test]
    fn foreground_stays_sharp() {
        let image = RgbImage::from_fn(40, 40, |x, _| if x % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let mask = Mask::from_fn(40, 40, |x, _| if x < 20 { 255 } else { 0 });
        let out = render_preview(&image, &mask, 8.0);
        assert_eq!(out.get_pixel(10, 20), image.get_pixel(10, 20));
        // Background stripes are smeared toward gray.
        let bg = out.get_pixel(30, 20)[0];
        assert!(bg > 60 && bg < 200, "{bg}");
    }

    #[test]
    fn zero_radius_is_passthrough() {
        let image = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let mask = Mask::from_fn(8, 8, |_, _| 0);
        assert_eq!(render_preview(&image, &mask, 0.0), image);
    }
}
