//! Downsampled luminance grid shared by the composition and signal stages.
//!
//! Every per-pixel analysis in the engine runs on a small grayscale copy of the
//! frame, never on the full capture buffer.

use image::{imageops, GrayImage, RgbImage};

type Kernel3 = [[f32; 3]; 3];

const SOBEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Row-major luminance samples in 0..255.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaGrid {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

/// Sobel derivatives and magnitude per grid cell.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
    pub mag: Vec<f32>,
}

impl LumaGrid {
    /// Downsample so the longest side is at most `max_side`, keeping aspect.
    pub fn from_image(image: &RgbImage, max_side: u32) -> Self {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 || max_side == 0 {
            return Self::empty();
        }
        let scale = (max_side as f64 / w.max(h) as f64).min(1.0);
        let tw = ((w as f64 * scale).round() as u32).max(1);
        let th = ((h as f64 * scale).round() as u32).max(1);
        Self::resized(image, tw, th)
    }

    /// Downsample to exactly `width` x `height`.
    pub fn resized(image: &RgbImage, width: u32, height: u32) -> Self {
        if image.width() == 0 || image.height() == 0 || width == 0 || height == 0 {
            return Self::empty();
        }
        let _span = tracing::debug_span!("luma_grid").entered();
        let gray: GrayImage = imageops::grayscale(image);
        let small = if gray.dimensions() == (width, height) {
            gray
        } else {
            imageops::resize(&gray, width, height, imageops::FilterType::Triangle)
        };
        Self {
            width: width as usize,
            height: height as usize,
            data: small.pixels().map(|p| p[0] as f32).collect(),
        }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Sobel gradients with border clamping.
    pub fn gradients(&self) -> Gradients {
        let (w, h) = (self.width, self.height);
        let mut gx = vec![0.0f32; w * h];
        let mut gy = vec![0.0f32; w * h];
        let mut mag = vec![0.0f32; w * h];

        for y in 0..h {
            let rows = [
                self.row(y.saturating_sub(1)),
                self.row(y),
                self.row((y + 1).min(h - 1)),
            ];
            for x in 0..w {
                let xs = [x.saturating_sub(1), x, (x + 1).min(w - 1)];
                let mut sx = 0.0;
                let mut sy = 0.0;
                for (ky, row) in rows.iter().enumerate() {
                    for (kx, &xx) in xs.iter().enumerate() {
                        sx += row[xx] * SOBEL_X[ky][kx];
                        sy += row[xx] * SOBEL_Y[ky][kx];
                    }
                }
                let idx = y * w + x;
                gx[idx] = sx;
                gy[idx] = sy;
                mag[idx] = (sx * sx + sy * sy).sqrt();
            }
        }

        Gradients {
            width: w,
            height: h,
            gx,
            gy,
            mag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_keeps_aspect() {
        let img = RgbImage::from_pixel(1920, 1080, image::Rgb([200, 200, 200]));
        let grid = LumaGrid::from_image(&img, 160);
        assert_eq!(grid.width, 160);
        assert_eq!(grid.height, 90);
        assert!(grid.data.iter().all(|&v| (v - 200.0).abs() < 1.0));
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let img = RgbImage::from_pixel(40, 20, image::Rgb([10, 10, 10]));
        let grid = LumaGrid::from_image(&img, 160);
        assert_eq!((grid.width, grid.height), (40, 20));
    }

    #[test]
    fn empty_image_gives_empty_grid() {
        let img = RgbImage::new(0, 0);
        assert!(LumaGrid::from_image(&img, 64).is_empty());
    }

    #[test]
    fn vertical_edge_has_horizontal_gradient() {
        let grid = LumaGrid::from_fn(10, 10, |x, _| if x < 5 { 0.0 } else { 255.0 });
        let g = grid.gradients();
        let idx = 5 * 10 + 5;
        assert!(g.gx[idx] > 0.0);
        assert!(g.gy[idx].abs() < 1e-3);
        assert_eq!(g.mag[0], 0.0);
    }
}
