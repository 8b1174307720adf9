//! Real-time composition feedback and segmentation preview cache.
//!
//! [`CompositionEngine`] turns a live frame stream into scored composition
//! results with overlay geometry. [`MaskCache`] serves foreground masks and
//! background-blurred previews, reusing segmentation work across resolutions.

pub mod analysis;
pub mod cache;
pub mod capture;
pub mod composition;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod luma;
pub mod output;
pub mod pressure;
pub mod scheduler;
pub mod segmentation;
pub mod workers;

pub use analysis::{SignalAnalyzer, SignalSummary};
pub use cache::{CacheStats, MaskCache, ResolutionTier};
pub use composition::{CompositionResult, CompositionTechnique, OverlayPrimitive, RuleEngine};
pub use config::EngineConfig;
pub use detection::{CandidateDetector, DetectedRegion, SubjectDetector};
pub use engine::{CompositionEngine, Published};
pub use error::{EngineError, Result};
pub use frame::{Frame, FrameId, ImageId};
pub use geometry::{map_from_display, map_to_display, CoordinateMapper, Rect, Size};
pub use pressure::MemoryPressureMonitor;
pub use segmentation::{Mask, SegmentationModel};
