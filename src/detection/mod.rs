//! Subject detection behind a uniform candidate interface.

mod adapter;
mod rustface_backend;
#[cfg(feature = "onnx")]
mod onnx_person;

pub use adapter::{select_best, SubjectDetector};
pub use rustface_backend::RustfaceDetector;
#[cfg(feature = "onnx")]
pub use onnx_person::OnnxPersonDetector;

use crate::frame::Frame;
use crate::geometry::Rect;

/// Which stage of the fallback chain produced a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorKind {
    Face,
    Body,
    None,
}

/// A raw detector hit.
///
/// `bounds` is normalized to 0..1 of the frame with a bottom-left origin, the
/// convention every backend converts into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bounds: Rect,
    /// Detection confidence in 0..1.
    pub confidence: f64,
}

impl Candidate {
    pub fn new(bounds: Rect, confidence: f64) -> Self {
        Self { bounds, confidence }
    }

    /// Ranking score: a confident subject wins even when small, but a barely
    /// more confident speck does not beat a clearly visible one.
    pub fn weighted_score(&self) -> f64 {
        self.confidence * self.bounds.area()
    }
}

/// The subject chosen for one analysed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedRegion {
    /// Normalized, bottom-left origin. Empty when `kind` is `None`.
    pub bounds: Rect,
    pub confidence: f64,
    pub kind: DetectorKind,
}

impl DetectedRegion {
    pub fn none() -> Self {
        Self {
            bounds: Rect::EMPTY,
            confidence: 0.0,
            kind: DetectorKind::None,
        }
    }

    pub fn from_candidate(candidate: Candidate, kind: DetectorKind) -> Self {
        Self {
            bounds: candidate.bounds,
            confidence: candidate.confidence,
            kind,
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == DetectorKind::None
    }

    /// Bounds with a top-left origin, matching frame pixel rows.
    pub fn top_left_bounds(&self) -> Rect {
        self.bounds.flip_vertical()
    }
}

/// A detection backend returning zero or more candidates per frame.
pub trait CandidateDetector: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn detect(&self, frame: &Frame) -> anyhow::Result<Vec<Candidate>>;
}

/// Convert a top-left pixel box into the normalized bottom-left convention.
pub(crate) fn normalize_pixel_box(
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    image_width: f64,
    image_height: f64,
) -> Rect {
    let x0 = (x / image_width).clamp(0.0, 1.0);
    let y0 = (y / image_height).clamp(0.0, 1.0);
    let x1 = ((x + width) / image_width).clamp(0.0, 1.0);
    let y1 = ((y + height) / image_height).clamp(0.0, 1.0);
    Rect::new(x0, y0, x1 - x0, y1 - y0).flip_vertical()
}
