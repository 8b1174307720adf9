use super::{CompositionTechnique, EvaluationContext, Evaluation, Feedback, OverlayPrimitive, TechniqueStrategy};
use crate::config::CompositionConfig;
use crate::geometry::{Point, Size};
use crate::luma::LumaGrid;

/// Similarity in 0..1 between the left half of `luma` and the mirrored right
/// half. 1.0 means pixel-identical halves.
pub fn mirror_similarity(luma: &LumaGrid) -> f64 {
    let half = luma.width / 2;
    if half == 0 || luma.height == 0 {
        return 0.0;
    }

    let mut total = 0.0f64;
    for y in 0..luma.height {
        let row = luma.row(y);
        for x in 0..half {
            total += (row[x] - row[luma.width - 1 - x]).abs() as f64;
        }
    }
    let mean = total / (half * luma.height) as f64;
    (1.0 - mean / 255.0).clamp(0.0, 1.0)
}

/// Scene should mirror across the vertical axis. Scored from pixels, so the
/// subject position does not matter and a frame with no detected subject is
/// still scored. Only a missing luma grid gives a neutral result.
pub struct Symmetry {
    config: CompositionConfig,
}

impl Symmetry {
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }
}

impl TechniqueStrategy for Symmetry {
    fn technique(&self) -> CompositionTechnique {
        CompositionTechnique::Symmetry
    }

    fn basic_overlays(&self, frame: Size) -> Vec<OverlayPrimitive> {
        let x = frame.width / 2.0;
        vec![OverlayPrimitive::guide_line(
            Point::new(x, 0.0),
            Point::new(x, frame.height),
        )]
    }

    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Evaluation> {
        let luma = ctx.luma.filter(|l| !l.is_empty())?;
        let score = mirror_similarity(luma);

        let feedback = if score >= self.config.symmetric_threshold {
            Feedback::new("Symmetric", "symmetry")
        } else {
            Feedback::new("Balance both sides", "symmetry-off")
        };

        Some(Evaluation {
            score,
            feedback,
            overlays: Vec::new(),
        })
    }
}
