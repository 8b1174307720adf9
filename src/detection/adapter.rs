use super::{Candidate, CandidateDetector, DetectedRegion, DetectorKind};
use crate::config::DetectionConfig;
use crate::frame::Frame;
use tracing::{debug, warn};

/// Runs the face -> body fallback chain and picks one subject per frame.
///
/// Backend errors never escape: a failing stage counts as "nothing found" so
/// the engine keeps publishing subject-independent overlays.
pub struct SubjectDetector {
    primary: Option<Box<dyn CandidateDetector>>,
    secondary: Option<Box<dyn CandidateDetector>>,
    config: DetectionConfig,
}

impl SubjectDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            primary: None,
            secondary: None,
            config,
        }
    }

    /// Face-like detector tried first.
    pub fn with_primary(mut self, detector: Box<dyn CandidateDetector>) -> Self {
        self.primary = Some(detector);
        self
    }

    /// Body-like detector tried when the primary finds nothing.
    pub fn with_secondary(mut self, detector: Box<dyn CandidateDetector>) -> Self {
        self.secondary = Some(detector);
        self
    }

    pub fn detect(&self, frame: &Frame) -> DetectedRegion {
        if frame.is_empty() {
            return DetectedRegion::none();
        }

        if let Some(region) = self.run_stage(self.primary.as_deref(), frame, DetectorKind::Face) {
            return region;
        }

        if self.config.body_fallback {
            if let Some(region) =
                self.run_stage(self.secondary.as_deref(), frame, DetectorKind::Body)
            {
                return region;
            }
        }

        debug!("Frame {}: no subject", frame.id.0);
        DetectedRegion::none()
    }

    fn run_stage(
        &self,
        detector: Option<&dyn CandidateDetector>,
        frame: &Frame,
        kind: DetectorKind,
    ) -> Option<DetectedRegion> {
        let detector = detector?;
        let _span = tracing::debug_span!("detect", backend = detector.name()).entered();

        let candidates = match detector.detect(frame) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("{} detector failed on frame {}: {:#}", detector.name(), frame.id.0, e);
                return None;
            }
        };

        let best = select_best(&candidates, self.config.min_confidence)?;
        debug!(
            "Frame {}: {:?} subject at {:?} (confidence {:.2}, {} candidates)",
            frame.id.0,
            kind,
            best.bounds,
            best.confidence,
            candidates.len()
        );
        Some(DetectedRegion::from_candidate(best, kind))
    }
}

/// Drop candidates under `min_confidence`, then keep the one with the highest
/// `confidence x area`. Ties keep the earliest candidate.
pub fn select_best(candidates: &[Candidate], min_confidence: f64) -> Option<Candidate> {
    candidates
        .iter()
        .filter(|c| c.confidence >= min_confidence && !c.bounds.is_empty())
        .fold(None, |best: Option<Candidate>, c| match best {
            Some(b) if b.weighted_score() >= c.weighted_score() => Some(b),
            _ => Some(*c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        name: &'static str,
        result: Result<Vec<Candidate>, &'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl CandidateDetector for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn detect(&self, _frame: &Frame) -> anyhow::Result<Vec<Candidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn fixed(name: &'static str, result: Result<Vec<Candidate>, &'static str>) -> (Box<Fixed>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Fixed {
                name,
                result,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn frame() -> Frame {
        Frame::new(1, RgbImage::new(64, 48))
    }

    #[test]
    fn area_weighting_beats_marginally_more_confident_speck() {
        let big = Candidate::new(Rect::new(0.1, 0.1, 0.4, 0.4), 0.80);
        let speck = Candidate::new(Rect::new(0.7, 0.7, 0.02, 0.02), 0.85);
        assert_eq!(select_best(&[speck, big], 0.5), Some(big));
    }

    #[test]
    fn confidence_floor_discards_candidates() {
        let weak = Candidate::new(Rect::new(0.1, 0.1, 0.8, 0.8), 0.3);
        assert_eq!(select_best(&[weak], 0.5), None);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let a = Candidate::new(Rect::new(0.1, 0.1, 0.2, 0.2), 0.9);
        let b = Candidate::new(Rect::new(0.5, 0.5, 0.2, 0.2), 0.9);
        assert_eq!(select_best(&[a, b], 0.5), Some(a));
    }

    #[test]
    fn face_hit_skips_body_detector() {
        let (face, _) = fixed("face", Ok(vec![Candidate::new(Rect::new(0.4, 0.4, 0.2, 0.2), 0.9)]));
        let (body, body_calls) = fixed("body", Ok(vec![]));
        let detector = SubjectDetector::new(DetectionConfig::default())
            .with_primary(face)
            .with_secondary(body);

        let region = detector.detect(&frame());
        assert_eq!(region.kind, DetectorKind::Face);
        assert_eq!(body_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_face_falls_back_to_body() {
        let (face, _) = fixed("face", Ok(vec![]));
        let (body, _) = fixed("body", Ok(vec![Candidate::new(Rect::new(0.2, 0.0, 0.3, 0.9), 0.7)]));
        let detector = SubjectDetector::new(DetectionConfig::default())
            .with_primary(face)
            .with_secondary(body);

        assert_eq!(detector.detect(&frame()).kind, DetectorKind::Body);
    }

    #[test]
    fn backend_errors_become_none() {
        let (face, _) = fixed("face", Err("model crashed"));
        let (body, _) = fixed("body", Err("model crashed"));
        let detector = SubjectDetector::new(DetectionConfig::default())
            .with_primary(face)
            .with_secondary(body);

        assert!(detector.detect(&frame()).is_none());
    }

    #[test]
    fn disabled_fallback_never_calls_body() {
        let (face, _) = fixed("face", Ok(vec![]));
        let (body, body_calls) = fixed("body", Ok(vec![Candidate::new(Rect::new(0.2, 0.0, 0.3, 0.9), 0.7)]));
        let config = DetectionConfig {
            body_fallback: false,
            ..DetectionConfig::default()
        };
        let detector = SubjectDetector::new(config).with_primary(face).with_secondary(body);

        assert!(detector.detect(&frame()).is_none());
        assert_eq!(body_calls.load(Ordering::SeqCst), 0);
    }
}
