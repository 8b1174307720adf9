//! Center-surround saliency: cells that differ from their wide neighborhood
//! stand out. Salient cells are grouped into boxes by connected components.

use crate::config::AnalysisConfig;
use crate::geometry::Rect;
use crate::luma::LumaGrid;
use crate::workers::CancelToken;

/// Surround window radius as a fraction of the longer grid side.
const SURROUND_FRACTION: f32 = 0.125;
/// Salient cells must exceed mean + K * stddev of the saliency map.
const SIGMA_K: f32 = 2.0;
/// ...and differ from their surround by at least this much luma.
const MIN_SALIENCY: f32 = 16.0;
/// Components smaller than this share of the grid are noise.
const MIN_REGION_SHARE: f32 = 0.002;

/// Summed-area table for O(1) box means.
struct Integral {
    width: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(luma: &LumaGrid) -> Self {
        let w = luma.width + 1;
        let mut sums = vec![0.0f64; w * (luma.height + 1)];
        for y in 0..luma.height {
            let mut row_sum = 0.0;
            for x in 0..luma.width {
                row_sum += luma.get(x, y) as f64;
                sums[(y + 1) * w + x + 1] = sums[y * w + x + 1] + row_sum;
            }
        }
        Self { width: w, sums }
    }

    /// Mean over the clamped window centred at `(x, y)`.
    fn box_mean(&self, x: usize, y: usize, radius: usize, gw: usize, gh: usize) -> f32 {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius + 1).min(gw);
        let y1 = (y + radius + 1).min(gh);
        let s = |xx: usize, yy: usize| self.sums[yy * self.width + xx];
        let total = s(x1, y1) - s(x0, y1) - s(x1, y0) + s(x0, y0);
        (total / ((x1 - x0) * (y1 - y0)) as f64) as f32
    }
}

/// Salient boxes, normalized to the frame with a top-left origin, strongest
/// first.
pub fn salient_regions(luma: &LumaGrid, config: &AnalysisConfig, cancel: &CancelToken) -> Option<Vec<Rect>> {
    if luma.is_empty() {
        return None;
    }
    let (w, h) = (luma.width, luma.height);
    let integral = Integral::new(luma);
    let surround = ((w.max(h) as f32 * SURROUND_FRACTION) as usize).max(2);

    let mut map = vec![0.0f32; w * h];
    for y in 0..h {
        if cancel.is_cancelled() {
            return None;
        }
        for x in 0..w {
            let center = integral.box_mean(x, y, 1, w, h);
            let around = integral.box_mean(x, y, surround, w, h);
            map[y * w + x] = (center - around).abs();
        }
    }

    let n = map.len() as f32;
    let mean = map.iter().sum::<f32>() / n;
    let var = map.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let threshold = (mean + SIGMA_K * var.sqrt()).max(MIN_SALIENCY);

    let mut visited = vec![false; w * h];
    let mut regions: Vec<(f32, Rect)> = Vec::new();
    let min_cells = ((n * MIN_REGION_SHARE) as usize).max(4);
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..map.len() {
        if visited[start] || map[start] < threshold {
            continue;
        }
        if cancel.is_cancelled() {
            return None;
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0usize, 0usize);
        let mut weight = 0.0f32;
        let mut cells = 0usize;
        visited[start] = true;
        stack.push(start);

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            weight += map[i];
            cells += 1;

            let neighbors = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for j in neighbors.into_iter().flatten() {
                if !visited[j] && map[j] >= threshold {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        if cells >= min_cells {
            regions.push((
                weight,
                Rect::new(
                    min_x as f64 / w as f64,
                    min_y as f64 / h as f64,
                    (max_x + 1 - min_x) as f64 / w as f64,
                    (max_y + 1 - min_y) as f64 / h as f64,
                ),
            ));
        }
    }

    regions.sort_by(|a, b| b.0.total_cmp(&a.0));
    Some(
        regions
            .into_iter()
            .take(config.max_salient_regions)
            .map(|(_, r)| r)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions_of(grid: &LumaGrid) -> Vec<Rect> {
        salient_regions(grid, &AnalysisConfig::default(), &CancelToken::new()).unwrap_or_default()
    }

    #[test]
    fn bright_patch_on_gray_is_salient() {
        let grid = LumaGrid::from_fn(100, 100, |x, y| {
            if (60..70).contains(&x) && (20..30).contains(&y) {
                250.0
            } else {
                90.0
            }
        });
        let regions = regions_of(&grid);
        assert!(!regions.is_empty());
        let c = regions[0].center();
        assert!((c.x - 0.65).abs() < 0.08, "{:?}", regions[0]);
        assert!((c.y - 0.25).abs() < 0.08, "{:?}", regions[0]);
    }

    #[test]
    fn uniform_frame_has_no_salient_regions() {
        let grid = LumaGrid::from_fn(50, 50, |_, _| 128.0);
        assert!(regions_of(&grid).is_empty());
    }

    #[test]
    fn region_count_is_capped() {
        let grid = LumaGrid::from_fn(120, 120, |x, y| {
            if (x / 20) % 2 == 0 && (y / 20) % 2 == 0 && x % 20 < 6 && y % 20 < 6 {
                255.0
            } else {
                40.0
            }
        });
        let config = AnalysisConfig::default();
        let regions = salient_regions(&grid, &config, &CancelToken::new()).unwrap_or_default();
        assert!(regions.len() <= config.max_salient_regions);
    }
}
