//! Leading-line extraction with an orientation-guided Hough transform.
//!
//! Each edge pixel only votes for normals within a few degrees of its own
//! gradient direction, which keeps the accumulator clean on busy frames.

use crate::config::AnalysisConfig;
use crate::luma::LumaGrid;
use crate::workers::CancelToken;
use std::f32::consts::PI;

const THETA_BINS: usize = 180;
/// Votes go to normals within this many degrees of the gradient direction.
const VOTE_SPREAD: isize = 3;
/// Peaks closer than this (in theta bins, rho pixels) are the same line.
const PEAK_RADIUS_THETA: isize = 6;
const PEAK_RADIUS_RHO: isize = 6;

/// A line `x cos(theta) + y sin(theta) = rho` in grid pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    pub theta: f32,
    pub rho: f32,
    pub votes: u32,
}

pub fn extract_lines(luma: &LumaGrid, config: &AnalysisConfig, cancel: &CancelToken) -> Option<Vec<HoughLine>> {
    if luma.is_empty() {
        return None;
    }
    let grad = luma.gradients();

    let (w, h) = (grad.width, grad.height);
    let max_rho = ((w * w + h * h) as f32).sqrt().ceil() as isize;
    let rho_bins = (2 * max_rho + 1) as usize;
    let mut acc = vec![0u32; THETA_BINS * rho_bins];

    let trig: Vec<(f32, f32)> = (0..THETA_BINS)
        .map(|t| {
            let theta = t as f32 * PI / THETA_BINS as f32;
            (theta.cos(), theta.sin())
        })
        .collect();

    for y in 0..h {
        if cancel.is_cancelled() {
            return None;
        }
        for x in 0..w {
            let i = y * w + x;
            if grad.mag[i] < config.edge_threshold {
                continue;
            }
            let normal = grad.gy[i].atan2(grad.gx[i]).rem_euclid(PI);
            let center = (normal / PI * THETA_BINS as f32).round() as isize;
            for dt in -VOTE_SPREAD..=VOTE_SPREAD {
                let t = (center + dt).rem_euclid(THETA_BINS as isize) as usize;
                let (cos, sin) = trig[t];
                let rho = (x as f32 * cos + y as f32 * sin).round() as isize;
                acc[t * rho_bins + (rho + max_rho) as usize] += 1;
            }
        }
    }

    let min_votes = (config.min_line_votes * w.min(h) as f32).max(1.0) as u32;
    let mut peaks: Vec<HoughLine> = Vec::new();
    for t in 0..THETA_BINS {
        if cancel.is_cancelled() {
            return None;
        }
        for r in 0..rho_bins {
            let votes = acc[t * rho_bins + r];
            if votes < min_votes || !is_local_max(&acc, rho_bins, t as isize, r as isize, votes) {
                continue;
            }
            peaks.push(HoughLine {
                theta: t as f32 * PI / THETA_BINS as f32,
                rho: (r as isize - max_rho) as f32,
                votes,
            });
        }
    }

    peaks.sort_by(|a, b| b.votes.cmp(&a.votes));
    peaks.truncate(config.max_lines);
    Some(peaks)
}

/// Strict maximum in its neighborhood; plateaus resolve to the first cell.
/// Theta wraps at π, where the same line reappears with negated rho.
fn is_local_max(acc: &[u32], rho_bins: usize, t: isize, r: isize, votes: u32) -> bool {
    let n = THETA_BINS as isize;
    let mirror = rho_bins as isize - 1;
    for dt in -PEAK_RADIUS_THETA..=PEAK_RADIUS_THETA {
        let wrapped = t + dt < 0 || t + dt >= n;
        let tt = (t + dt).rem_euclid(n);
        for dr in -PEAK_RADIUS_RHO..=PEAK_RADIUS_RHO {
            if dt == 0 && dr == 0 {
                continue;
            }
            let rr = if wrapped { mirror - (r + dr) } else { r + dr };
            if rr < 0 || rr >= rho_bins as isize {
                continue;
            }
            let other = acc[tt as usize * rho_bins + rr as usize];
            let earlier = (dt, dr) < (0, 0);
            if other > votes || (other == votes && earlier) {
                return false;
            }
        }
    }
    true
}
