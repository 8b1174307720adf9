use super::{normalize_pixel_box, Candidate, CandidateDetector};
use crate::error::EngineError;
use crate::frame::Frame;
use anyhow::Result;
use image::imageops;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Faces are searched on a copy no wider than this.
const DETECT_MAX_SIDE: u32 = 640;
/// SeetaFace scores are unbounded; `1 - exp(-score / scale)` maps them into 0..1
/// so a score at the engine's score threshold (2.0) lands near 0.4.
const FACE_SCORE_SCALE: f64 = 4.0;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load a SeetaFace frontal model (`seeta_fd_frontal_v1.0.bin`) from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading SeetaFace model from {}", path.display());

        let load_err = |reason: String| EngineError::ModelLoad {
            path: path.display().to_string(),
            reason,
        };
        let file = File::open(path).map_err(|e| load_err(e.to_string()))?;
        let model = rustface::read_model(BufReader::new(file)).map_err(|e| load_err(e.to_string()))?;

        Ok(Self { model })
    }
}

impl CandidateDetector for RustfaceDetector {
    fn name(&self) -> &str {
        "rustface"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Candidate>> {
        let (width, height) = frame.image.dimensions();
        let scale = (DETECT_MAX_SIDE as f64 / width.max(height) as f64).min(1.0);
        let gray = imageops::grayscale(frame.image.as_ref());
        let gray = if scale < 1.0 {
            imageops::resize(
                &gray,
                ((width as f64 * scale).round() as u32).max(1),
                ((height as f64 * scale).round() as u32).max(1),
                imageops::FilterType::Triangle,
            )
        } else {
            gray
        };
        let (gw, gh) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        detector.set_slide_window_step(4, 4);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), gw, gh));

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Candidate::new(
                    normalize_pixel_box(
                        bbox.x() as f64,
                        bbox.y() as f64,
                        bbox.width() as f64,
                        bbox.height() as f64,
                        gw as f64,
                        gh as f64,
                    ),
                    1.0 - (-face.score() / FACE_SCORE_SCALE).exp(),
                )
            })
            .collect())
    }
}
