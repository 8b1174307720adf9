use super::{
    mirror_similarity, subject_center, Color, CompositionTechnique, EvaluationContext,
    Evaluation, Feedback, OverlayPrimitive, TechniqueStrategy,
};
use crate::config::CompositionConfig;
use crate::geometry::{Point, Size};

/// Crosshair arm length as a fraction of the shorter frame side.
const CROSSHAIR_FRACTION: f64 = 0.05;

/// Subject should sit at the frame center, with a balanced scene around it.
pub struct CenterFraming {
    config: CompositionConfig,
}

impl CenterFraming {
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }
}

impl TechniqueStrategy for CenterFraming {
    fn technique(&self) -> CompositionTechnique {
        CompositionTechnique::CenterFraming
    }

    fn basic_overlays(&self, frame: Size) -> Vec<OverlayPrimitive> {
        let c = frame.center();
        let arm = frame.width.min(frame.height) * CROSSHAIR_FRACTION;
        vec![
            OverlayPrimitive::guide_line(Point::new(c.x - arm, c.y), Point::new(c.x + arm, c.y)),
            OverlayPrimitive::guide_line(Point::new(c.x, c.y - arm), Point::new(c.x, c.y + arm)),
        ]
    }

    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Evaluation> {
        if ctx.region.is_none() {
            return None;
        }

        let center = subject_center(ctx.region, ctx.frame);
        let target = ctx.frame.center();
        let relative = center.distance(&target) / ctx.frame.diagonal();
        // Half the diagonal is the farthest a point can be from the center.
        let position_score = (1.0 - 2.0 * relative).clamp(0.0, 1.0);

        let score = match ctx.luma.filter(|l| !l.is_empty()) {
            Some(luma) => {
                let w = self.config.symmetry_weight.clamp(0.0, 1.0);
                (1.0 - w) * position_score + w * mirror_similarity(luma)
            }
            None => position_score,
        };

        let (feedback, color) = if relative <= self.config.aligned_tolerance {
            (Feedback::new("Centered", "target"), Color::GREEN)
        } else if relative <= self.config.near_tolerance {
            (Feedback::new("Almost centered", "target"), Color::YELLOW)
        } else {
            (Feedback::move_toward(center, target), Color::WHITE)
        };

        Some(Evaluation {
            score,
            feedback,
            overlays: vec![OverlayPrimitive::marker(target, color)],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectedRegion, DetectorKind};
    use crate::geometry::Rect;
    use crate::luma::LumaGrid;

    fn region(x: f64, y: f64) -> DetectedRegion {
        DetectedRegion {
            bounds: Rect::new(x, y, 0.2, 0.2),
            confidence: 0.9,
            kind: DetectorKind::Body,
        }
    }

    #[test]
    fn centered_subject_scores_high() {
        let strategy = CenterFraming::new(CompositionConfig::default());
        let r = region(0.4, 0.4);
        let eval = strategy
            .evaluate(&EvaluationContext {
                region: &r,
                frame: Size::new(640.0, 480.0),
                luma: None,
            })
            .expect("subject present");
        assert!((eval.score - 1.0).abs() < 1e-9);
        assert_eq!(eval.feedback.message, "Centered");
    }

    #[test]
    fn asymmetric_scene_lowers_score() {
        let strategy = CenterFraming::new(CompositionConfig::default());
        let r = region(0.4, 0.4);
        let balanced = LumaGrid::from_fn(32, 32, |_, _| 128.0);
        let lopsided = LumaGrid::from_fn(32, 32, |x, _| if x < 16 { 0.0 } else { 255.0 });
        let frame = Size::new(640.0, 480.0);
        let score = |luma: &LumaGrid| {
            strategy
                .evaluate(&EvaluationContext {
                    region: &r,
                    frame,
                    luma: Some(luma),
                })
                .map(|e| e.score)
                .unwrap_or(0.0)
        };
        assert!(score(&balanced) > score(&lopsided));
    }

    #[test]
    fn off_center_subject_gets_hint_toward_center() {
        let strategy = CenterFraming::new(CompositionConfig::default());
        let r = region(0.0, 0.4);
        let eval = strategy
            .evaluate(&EvaluationContext {
                region: &r,
                frame: Size::new(1000.0, 1000.0),
                luma: None,
            })
            .expect("subject present");
        assert_eq!(eval.feedback.icon_key, "arrow-right");
    }
}
