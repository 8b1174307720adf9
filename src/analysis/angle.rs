//! Dominant edge orientation, used as a horizon tilt hint.

use crate::config::AnalysisConfig;
use crate::luma::LumaGrid;
use crate::workers::CancelToken;
use std::f32::consts::PI;

const ORIENTATION_BINS: usize = 180;
/// Edge pixels needed, as a share of the grid, before an angle is reported.
const MIN_EDGE_SHARE: f32 = 0.01;

/// Circular histogram over [0, π).
struct OrientationHistogram {
    bins: Vec<f32>,
    bin_width: f32,
}

impl OrientationHistogram {
    fn new(num_bins: usize) -> Self {
        Self {
            bins: vec![0.0; num_bins],
            bin_width: PI / num_bins as f32,
        }
    }

    fn accumulate(&mut self, angle: f32, weight: f32) {
        if !angle.is_finite() {
            return;
        }
        let n = self.bins.len();
        let idx = (angle / self.bin_width).round() as usize % n;
        self.bins[idx] += weight.max(0.0);
    }

    /// Circular [1, 2, 1]/4 smoothing against quantization noise.
    fn smooth_121(&mut self) {
        let n = self.bins.len();
        if n <= 1 {
            return;
        }
        let smoothed: Vec<f32> = (0..n)
            .map(|i| {
                (self.bins[(i + n - 1) % n] + 2.0 * self.bins[i] + self.bins[(i + 1) % n]) * 0.25
            })
            .collect();
        self.bins = smoothed;
    }

    fn peak(&self) -> Option<f32> {
        let (idx, &value) = self
            .bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        (value > 0.0).then_some(idx as f32 * self.bin_width)
    }
}

/// Dominant line orientation in degrees, in (-90, 90], counter-clockwise from
/// horizontal as seen on screen. `None` when the frame has too few edges.
pub fn dominant_angle(luma: &LumaGrid, config: &AnalysisConfig, cancel: &CancelToken) -> Option<f64> {
    if luma.is_empty() {
        return None;
    }
    let grad = luma.gradients();
    if cancel.is_cancelled() {
        return None;
    }

    let mut histogram = OrientationHistogram::new(ORIENTATION_BINS);
    let mut edges = 0usize;
    for y in 0..grad.height {
        if cancel.is_cancelled() {
            return None;
        }
        for x in 0..grad.width {
            let i = y * grad.width + x;
            if grad.mag[i] < config.edge_threshold {
                continue;
            }
            // The edge runs perpendicular to the gradient; y is flipped so the
            // angle reads counter-clockwise on screen.
            let angle = (-grad.gx[i]).atan2(-grad.gy[i]).rem_euclid(PI);
            histogram.accumulate(angle, grad.mag[i]);
            edges += 1;
        }
    }

    if (edges as f32) < MIN_EDGE_SHARE * (grad.width * grad.height) as f32 {
        return None;
    }

    histogram.smooth_121();
    let degrees = histogram.peak()?.to_degrees() as f64;
    Some(if degrees > 90.0 { degrees - 180.0 } else { degrees })
}
