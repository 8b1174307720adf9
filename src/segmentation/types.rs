use crate::error::{EngineError, Result};
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};

/// Per-pixel alpha matte: 0 = background, 255 = foreground, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl Mask {
    pub fn new(width: u32, height: u32, alpha: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if alpha.len() != expected {
            return Err(EngineError::MaskSize {
                width,
                height,
                expected,
                actual: alpha.len(),
            });
        }
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Self {
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                alpha.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            alpha,
        }
    }

    /// Build from a float matte in 0.0..=1.0.
    pub fn from_matte(matte: &[f32], width: u32, height: u32) -> Result<Self> {
        let alpha = matte
            .iter()
            .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        Self::new(width, height, alpha)
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

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.alpha[y as usize * self.width as usize + x as usize]
    }

    /// Bytes held by this mask, for cache accounting.
    pub fn cost(&self) -> usize {
        self.alpha.len() + std::mem::size_of::<Self>()
    }

    /// Bilinear resample to a new size.
    pub fn resampled(&self, width: u32, height: u32) -> Mask {
        if (width, height) == self.dimensions() {
            return self.clone();
        }
        if self.alpha.is_empty() || width == 0 || height == 0 {
            return Mask::from_fn(width, height, |_, _| 0);
        }
        let _span = tracing::debug_span!("mask_resample").entered();
        let gray = GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]));
        let resized = imageops::resize(&gray, width, height, imageops::FilterType::Triangle);
        Mask {
            width,
            height,
            alpha: resized.into_raw(),
        }
    }

    /// Mean absolute alpha difference against a mask of the same size.
    pub fn mean_abs_diff(&self, other: &Mask) -> Option<f64> {
        if self.dimensions() != other.dimensions() || self.alpha.is_empty() {
            return None;
        }
        let total: u64 = self
            .alpha
            .iter()
            .zip(&other.alpha)
            .map(|(a, b)| a.abs_diff(*b) as u64)
            .sum();
        Some(total as f64 / self.alpha.len() as f64)
    }

    /// Grayscale silhouette for visualisation.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let v = self.get(x, y);
            Rgb([v, v, v])
        })
    }
}

/// Foreground/background separation backend.
///
/// Implementations may keep temporal state between calls (recurrent mattes);
/// the cache calls [`reset_state`](SegmentationModel::reset_state) before each
/// unrelated still image.
pub trait SegmentationModel: Send {
    /// Alpha mask at the dimensions of `image`.
    fn segment(&mut self, image: &RgbImage) -> anyhow::Result<Mask>;

    /// Drop temporal state, e.g. when switching cameras or images.
    fn reset_state(&mut self) {}

    /// Preferred network input `(width, height)`.
    fn input_size(&self) -> (u32, u32);
}
