//! YOLOv8-style person detector used as the body fallback.

use super::{normalize_pixel_box, Candidate, CandidateDetector};
use crate::frame::Frame;
use crate::geometry::Rect;
use anyhow::{Context, Result};
use image::imageops;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

/// Square network input side.
const INPUT_SIZE: u32 = 640;
/// COCO class index for "person".
const PERSON_CLASS: usize = 0;
const NUM_CLASSES: usize = 80;
/// Proposals under this score are dropped before NMS. The adapter applies the
/// real confidence floor afterwards.
const PREFILTER_SCORE: f32 = 0.25;
const IOU_THRESHOLD: f64 = 0.45;

pub struct OnnxPersonDetector {
    session: Mutex<Session>,
}

impl OnnxPersonDetector {
    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        tracing::info!("Loading person detector from {}", path.display());

        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("failed to set optimization level")?
            .with_intra_threads(2)
            .context("failed to set intra threads")?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    fn preprocess(frame: &Frame) -> Array4<f32> {
        let _span = tracing::debug_span!("person_preprocess").entered();
        let resized = imageops::resize(
            frame.image.as_ref(),
            INPUT_SIZE,
            INPUT_SIZE,
            imageops::FilterType::Triangle,
        );
        let side = INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

impl CandidateDetector for OnnxPersonDetector {
    fn name(&self) -> &str {
        "onnx-person"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Candidate>> {
        let input = Tensor::from_array(Self::preprocess(frame))
            .context("failed to create person detector input tensor")?;

        let mut session = self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let outputs = session
            .run(ort::inputs!["images" => input])
            .context("person detector inference failed")?;

        // Layout: [1, 4 + classes, proposals], one column per proposal.
        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .context("failed to extract person detector output")?;
        let proposals = shape.get(2).copied().unwrap_or(0).max(0) as usize;
        if data.len() < (4 + NUM_CLASSES) * proposals {
            anyhow::bail!("unexpected person detector output shape {:?}", shape);
        }

        let side = INPUT_SIZE as f64;
        let mut boxes: Vec<Candidate> = Vec::new();
        for i in 0..proposals {
            let at = |row: usize| data[row * proposals + i];
            let person = at(4 + PERSON_CLASS);
            if person < PREFILTER_SCORE {
                continue;
            }
            let best_other = (0..NUM_CLASSES)
                .filter(|&c| c != PERSON_CLASS)
                .map(|c| at(4 + c))
                .fold(0.0f32, f32::max);
            if best_other > person {
                continue;
            }

            let (cx, cy, w, h) = (at(0) as f64, at(1) as f64, at(2) as f64, at(3) as f64);
            boxes.push(Candidate::new(
                normalize_pixel_box(cx - w / 2.0, cy - h / 2.0, w, h, side, side),
                person as f64,
            ));
        }

        Ok(non_max_suppression(boxes, IOU_THRESHOLD))
    }
}

/// Greedy NMS: keep the most confident box, drop its overlaps, repeat.
fn non_max_suppression(mut boxes: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in boxes {
        let overlaps = kept.iter().any(|k: &Candidate| {
            Rect::intersection_over_union(&k.bounds, &candidate.bounds) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
