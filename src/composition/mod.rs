//! Composition scoring.
//!
//! Each technique is a [`TechniqueStrategy`]; the [`RuleEngine`] holds one of
//! each and dispatches on [`CompositionTechnique`]. Strategies are stateless,
//! so switching technique just means scoring the next frame with a different
//! strategy.

mod center;
mod symmetry;
mod thirds;

pub use center::CenterFraming;
pub use symmetry::{mirror_similarity, Symmetry};
pub use thirds::{nearest_intersection, RuleOfThirds};

use crate::analysis::SignalSummary;
use crate::config::CompositionConfig;
use crate::detection::DetectedRegion;
use crate::frame::FrameId;
use crate::geometry::{Point, Rect, Size};
use crate::luma::LumaGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompositionTechnique {
    #[default]
    RuleOfThirds,
    CenterFraming,
    Symmetry,
}

impl CompositionTechnique {
    pub const ALL: [CompositionTechnique; 3] = [
        CompositionTechnique::RuleOfThirds,
        CompositionTechnique::CenterFraming,
        CompositionTechnique::Symmetry,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::RuleOfThirds => "rule-of-thirds",
            Self::CenterFraming => "center-framing",
            Self::Symmetry => "symmetry",
        }
    }
}

impl std::str::FromStr for CompositionTechnique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.key() == s)
            .ok_or_else(|| format!("unknown technique '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const YELLOW: Color = Color::rgb(255, 214, 10);
    pub const GREEN: Color = Color::rgb(48, 209, 88);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Overlay geometry in frame pixel coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverlayPrimitive {
    Line {
        from: Point,
        to: Point,
        width: f32,
        color: Color,
        opacity: f32,
    },
    Point {
        at: Point,
        radius: f32,
        color: Color,
        opacity: f32,
    },
}

impl OverlayPrimitive {
    pub fn guide_line(from: Point, to: Point) -> Self {
        Self::Line {
            from,
            to,
            width: 1.0,
            color: Color::WHITE,
            opacity: 0.5,
        }
    }

    pub fn marker(at: Point, color: Color) -> Self {
        Self::Point {
            at,
            radius: 8.0,
            color,
            opacity: 0.9,
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Self::Point { .. })
    }
}

/// Published snapshot for one frame and technique.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionResult {
    pub frame_id: FrameId,
    pub technique: CompositionTechnique,
    /// Alignment quality in 0..1.
    pub score: f64,
    pub message: String,
    pub icon_key: String,
    pub overlays: Vec<OverlayPrimitive>,
    pub signals: Option<SignalSummary>,
    /// Subject box in viewport points, when a viewport is known.
    pub subject_display: Option<Rect>,
}

impl CompositionResult {
    /// No subject: no feedback, guides only.
    pub fn neutral(
        frame_id: FrameId,
        technique: CompositionTechnique,
        overlays: Vec<OverlayPrimitive>,
    ) -> Self {
        Self {
            frame_id,
            technique,
            score: NEUTRAL_SCORE,
            message: String::new(),
            icon_key: NO_SUBJECT_ICON.to_string(),
            overlays,
            signals: None,
            subject_display: None,
        }
    }
}

pub const NEUTRAL_SCORE: f64 = 0.0;
pub const NO_SUBJECT_ICON: &str = "no-subject";

/// Message and icon shown for a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub message: String,
    pub icon_key: String,
}

impl Feedback {
    pub fn new(message: impl Into<String>, icon_key: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            icon_key: icon_key.into(),
        }
    }

    /// Hint to move the subject from `from` toward `to` (top-left origin).
    pub fn move_toward(from: Point, to: Point) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let d = (dx * dx + dy * dy).sqrt();
        // An axis joins the hint once it carries ~40% of the offset (about 22°).
        let horizontal = if dx.abs() >= 0.4 * d {
            if dx > 0.0 {
                Some("right")
            } else {
                Some("left")
            }
        } else {
            None
        };
        let vertical = if dy.abs() >= 0.4 * d {
            if dy > 0.0 {
                Some("down")
            } else {
                Some("up")
            }
        } else {
            None
        };
        let direction = match (vertical, horizontal) {
            (Some(v), Some(h)) => format!("{v}-{h}"),
            (Some(v), None) => v.to_string(),
            (None, Some(h)) => h.to_string(),
            (None, None) => return Self::new("Hold steady", "checkmark"),
        };
        Self::new(
            format!("Move subject {}", direction.replace('-', " and ")),
            format!("arrow-{direction}"),
        )
    }
}

/// Inputs shared by every technique.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub region: &'a DetectedRegion,
    pub frame: Size,
    /// Downsampled luminance for pixel-level checks, when available.
    pub luma: Option<&'a LumaGrid>,
}

/// What a strategy adds on top of its basic guides.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub feedback: Feedback,
    pub overlays: Vec<OverlayPrimitive>,
}

pub trait TechniqueStrategy: Send + Sync {
    fn technique(&self) -> CompositionTechnique;

    /// Static guides drawn whether or not a subject was found.
    fn basic_overlays(&self, frame: Size) -> Vec<OverlayPrimitive>;

    /// Score the context. `None` means a neutral result.
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Option<Evaluation>;
}

pub struct RuleEngine {
    thirds: RuleOfThirds,
    center: CenterFraming,
    symmetry: Symmetry,
}

impl RuleEngine {
    pub fn new(config: CompositionConfig) -> Self {
        Self {
            thirds: RuleOfThirds::new(config.clone()),
            center: CenterFraming::new(config.clone()),
            symmetry: Symmetry::new(config),
        }
    }

    pub fn strategy(&self, technique: CompositionTechnique) -> &dyn TechniqueStrategy {
        match technique {
            CompositionTechnique::RuleOfThirds => &self.thirds,
            CompositionTechnique::CenterFraming => &self.center,
            CompositionTechnique::Symmetry => &self.symmetry,
        }
    }

    pub fn basic_overlays(
        &self,
        technique: CompositionTechnique,
        frame: Size,
    ) -> Vec<OverlayPrimitive> {
        if frame.is_degenerate() {
            return Vec::new();
        }
        self.strategy(technique).basic_overlays(frame)
    }

    pub fn evaluate(
        &self,
        frame_id: FrameId,
        technique: CompositionTechnique,
        region: &DetectedRegion,
        frame: Size,
        luma: Option<&LumaGrid>,
    ) -> CompositionResult {
        let mut overlays = self.basic_overlays(technique, frame);
        if frame.is_degenerate() {
            return CompositionResult::neutral(frame_id, technique, overlays);
        }

        let ctx = EvaluationContext {
            region,
            frame,
            luma,
        };
        match self.strategy(technique).evaluate(&ctx) {
            Some(evaluation) => {
                overlays.extend(evaluation.overlays);
                CompositionResult {
                    frame_id,
                    technique,
                    score: evaluation.score.clamp(0.0, 1.0),
                    message: evaluation.feedback.message,
                    icon_key: evaluation.feedback.icon_key,
                    overlays,
                    signals: None,
                    subject_display: None,
                }
            }
            None => CompositionResult::neutral(frame_id, technique, overlays),
        }
    }
}

/// Subject center in frame pixels, top-left origin.
pub(crate) fn subject_center(region: &DetectedRegion, frame: Size) -> Point {
    region.top_left_bounds().scaled(frame).center()
}
