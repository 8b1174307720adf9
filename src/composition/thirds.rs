use super::{
    subject_center, Color, CompositionTechnique, EvaluationContext, Evaluation, Feedback,
    OverlayPrimitive, TechniqueStrategy,
};
use crate::config::CompositionConfig;
use crate::geometry::{Point, Size};

/// Subject should sit on one of the four grid intersections.
pub struct RuleOfThirds {
    config: CompositionConfig,
}

impl RuleOfThirds {
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }
}

/// Intersections in left-to-right, top-to-bottom order.
fn intersections(frame: Size) -> [Point; 4] {
    let (w, h) = (frame.width, frame.height);
    [
        Point::new(w / 3.0, h / 3.0),
        Point::new(w / 3.0, 2.0 * h / 3.0),
        Point::new(2.0 * w / 3.0, h / 3.0),
        Point::new(2.0 * w / 3.0, 2.0 * h / 3.0),
    ]
}

/// Closest intersection to `p`. At equal distance the horizontally closer
/// point wins, then the leftmost, then the topmost.
pub fn nearest_intersection(p: Point, frame: Size) -> Point {
    let mut points = intersections(frame);
    points.sort_by(|a, b| {
        p.distance(a)
            .total_cmp(&p.distance(b))
            .then((a.x - p.x).abs().total_cmp(&(b.x - p.x).abs()))
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    });
    points[0]
}

impl TechniqueStrategy for RuleOfThirds {
    fn technique(&self) -> CompositionTechnique {
        CompositionTechnique::RuleOfThirds
    }

    fn basic_overlays(&self, frame: Size) -> Vec<OverlayPrimitive> {
        let (w, h) = (frame.width, frame.height);
        vec![
            OverlayPrimitive::guide_line(Point::new(w / 3.0, 0.0), Point::new(w / 3.0, h)),
            OverlayPrimitive::guide_line(Point::new(2.0 * w / 3.0, 0.0), Point::new(2.0 * w / 3.0, h)),
            OverlayPrimitive::guide_line(Point::new(0.0, h / 3.0), Point::new(w, h / 3.0)),
            OverlayPrimitive::guide_line(Point::new(0.0, 2.0 * h / 3.0), Point::new(w, 2.0 * h / 3.0)),
        ]
    }

    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Evaluation> {
        if ctx.region.is_none() {
            return None;
        }

        let center = subject_center(ctx.region, ctx.frame);
        let target = nearest_intersection(center, ctx.frame);
        let diagonal = ctx.frame.diagonal();
        let distance = center.distance(&target);
        let relative = distance / diagonal;

        // The farthest any point gets from its nearest intersection is a third
        // of the diagonal (a frame corner), so that maps to zero.
        let score = (1.0 - 3.0 * relative).clamp(0.0, 1.0);

        let (feedback, color) = if relative <= self.config.aligned_tolerance {
            (Feedback::new("Aligned", "checkmark"), Color::GREEN)
        } else if relative <= self.config.near_tolerance {
            (Feedback::new("Almost there", "target"), Color::YELLOW)
        } else {
            (Feedback::move_toward(center, target), Color::WHITE)
        };

        let mut overlays = vec![OverlayPrimitive::marker(target, color)];
        if relative > self.config.aligned_tolerance {
            overlays.push(OverlayPrimitive::Line {
                from: center,
                to: target,
                width: 2.0,
                color,
                opacity: 0.7,
            });
        }

        Some(Evaluation {
            score,
            feedback,
            overlays,
        })
    }
}
