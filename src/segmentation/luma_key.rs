use super::types::{Mask, SegmentationModel};
use anyhow::Result;
use image::RgbImage;

/// Model-free fallback: pixels whose luminance departs from the frame border
/// are foreground. Good enough for previews against plain backdrops.
#[derive(Debug, Clone)]
pub struct LumaKeySegmenter {
    /// Luma distance at which alpha starts rising.
    pub low: f32,
    /// Luma distance at which alpha saturates.
    pub high: f32,
}

impl Default for LumaKeySegmenter {
    fn default() -> Self {
        Self {
            low: 12.0,
            high: 48.0,
        }
    }
}

fn luma(p: &image::Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

impl LumaKeySegmenter {
    fn border_luma(image: &RgbImage) -> f32 {
        let (w, h) = image.dimensions();
        let mut sum = 0.0f64;
        let mut n = 0u64;
        for (x, y, p) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                sum += luma(p) as f64;
                n += 1;
            }
        }
        if n == 0 {
            0.0
        } else {
            (sum / n as f64) as f32
        }
    }
}

impl SegmentationModel for LumaKeySegmenter {
    fn segment(&mut self, image: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("luma_key").entered();
        let background = Self::border_luma(image);
        let span = (self.high - self.low).max(1.0);
        Ok(Mask::from_fn(image.width(), image.height(), |x, y| {
            let d = (luma(image.get_pixel(x, y)) - background).abs();
            (((d - self.low) / span).clamp(0.0, 1.0) * 255.0).round() as u8
        }))
    }

    fn input_size(&self) -> (u32, u32) {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn bright_subject_on_dark_backdrop() {
        let image = RgbImage::from_fn(20, 20, |x, y| {
            if (5..15).contains(&x) && (5..15).contains(&y) {
                Rgb([220, 220, 220])
            } else {
                Rgb([20, 20, 20])
            }
        });
        let mask = LumaKeySegmenter::default().segment(&image).unwrap();
        assert_eq!(mask.get(10, 10), 255);
        assert_eq!(mask.get(1, 1), 0);
    }
}
