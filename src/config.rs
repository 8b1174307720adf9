//! Tunable thresholds for every stage of the engine.
//!
//! The numeric values are empirically tuned defaults, not invariants. They are
//! kept as named constants so a caller can see (and override) what each
//! stage actually compares against.

use std::time::Duration;

/// Analyse one out of this many arriving frames.
pub const DEFAULT_SAMPLE_EVERY: u64 = 3;
/// Frames arriving this soon after the capture source starts are unstable
/// (auto exposure and focus still settling).
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(500);
/// Every Nth sampled frame also feeds the slower multi-signal analyzer.
pub const DEFAULT_SIGNAL_EVERY: u64 = 4;

/// Candidates below this confidence (0..1) never win the detection.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Within this fraction of the frame diagonal the subject counts as aligned.
pub const DEFAULT_ALIGNED_TOLERANCE: f64 = 0.05;
/// Within this fraction the subject is close, beyond it the feedback is a
/// directional hint.
pub const DEFAULT_NEAR_TOLERANCE: f64 = 0.15;
/// Side of the square luminance grid used for mirror comparisons.
pub const DEFAULT_SYMMETRY_GRID: u32 = 32;
/// Share of the center-framing score that comes from mirrored sampling.
pub const DEFAULT_SYMMETRY_WEIGHT: f64 = 0.25;
/// Symmetry similarity above which a frame is reported as symmetric.
pub const DEFAULT_SYMMETRIC_THRESHOLD: f64 = 0.85;

/// Longest side of the downsampled luminance grid fed to signal analyses.
pub const DEFAULT_ANALYSIS_SIDE: u32 = 160;

pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 256 * 1024 * 1024;
pub const DEFAULT_PREVIEW_MAX_SIDE: u32 = 512;
pub const DEFAULT_BLUR_BUCKETS: u8 = 10;
pub const DEFAULT_MAX_BLUR_RADIUS: f32 = 24.0;

/// Available memory below this fraction of the total raises memory pressure.
pub const DEFAULT_PRESSURE_FRACTION: f64 = 0.10;
pub const DEFAULT_PRESSURE_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub sample_every: u64,
    pub warmup: Duration,
    pub signal_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sample_every: DEFAULT_SAMPLE_EVERY,
            warmup: DEFAULT_WARMUP,
            signal_every: DEFAULT_SIGNAL_EVERY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub min_confidence: f64,
    /// Try the body detector when the face detector finds nothing.
    pub body_fallback: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            body_fallback: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompositionConfig {
    pub aligned_tolerance: f64,
    pub near_tolerance: f64,
    pub symmetry_grid: u32,
    pub symmetry_weight: f64,
    pub symmetric_threshold: f64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            aligned_tolerance: DEFAULT_ALIGNED_TOLERANCE,
            near_tolerance: DEFAULT_NEAR_TOLERANCE,
            symmetry_grid: DEFAULT_SYMMETRY_GRID,
            symmetry_weight: DEFAULT_SYMMETRY_WEIGHT,
            symmetric_threshold: DEFAULT_SYMMETRIC_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub analysis_side: u32,
    pub contrast_timeout: Duration,
    pub angle_timeout: Duration,
    pub lines_timeout: Duration,
    pub saliency_timeout: Duration,
    /// Histogram spread (p95 - p5, in 0..255 luma) below which a frame is flat.
    pub low_contrast_spread: u8,
    /// Spread above which a frame is punchy.
    pub high_contrast_spread: u8,
    /// Gradient magnitude a pixel needs to vote for an orientation or a line.
    pub edge_threshold: f32,
    /// Hough votes a line needs, as a fraction of the shorter grid side.
    pub min_line_votes: f32,
    pub max_lines: usize,
    pub max_salient_regions: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_side: DEFAULT_ANALYSIS_SIDE,
            contrast_timeout: Duration::from_millis(40),
            angle_timeout: Duration::from_millis(60),
            lines_timeout: Duration::from_millis(80),
            saliency_timeout: Duration::from_millis(80),
            low_contrast_spread: 60,
            high_contrast_spread: 180,
            edge_threshold: 48.0,
            min_line_votes: 0.5,
            max_lines: 8,
            max_salient_regions: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub budget_bytes: usize,
    pub preview_max_side: u32,
    pub blur_buckets: u8,
    pub max_blur_radius: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            preview_max_side: DEFAULT_PREVIEW_MAX_SIDE,
            blur_buckets: DEFAULT_BLUR_BUCKETS,
            max_blur_radius: DEFAULT_MAX_BLUR_RADIUS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PressureConfig {
    pub available_fraction: f64,
    pub poll_interval: Duration,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            available_fraction: DEFAULT_PRESSURE_FRACTION,
            poll_interval: DEFAULT_PRESSURE_POLL,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub detection: DetectionConfig,
    pub composition: CompositionConfig,
    pub analysis: AnalysisConfig,
    pub cache: CacheConfig,
    pub pressure: PressureConfig,
    /// Worker threads for detection and scoring. `None` picks three quarters
    /// of the available cores.
    pub workers: Option<usize>,
}

impl EngineConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.map(|w| w.max(1)).unwrap_or_else(|| {
            (std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                * 3
                / 4)
            .max(1)
        })
    }
}
