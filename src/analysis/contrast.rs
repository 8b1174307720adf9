use crate::config::AnalysisConfig;
use crate::luma::LumaGrid;
use crate::workers::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContrastClass {
    Low,
    Normal,
    High,
}

/// Luma value below which `fraction` of the samples fall.
fn percentile(histogram: &[u32; 256], total: u32, fraction: f64) -> u8 {
    let target = (total as f64 * fraction).ceil() as u32;
    let mut seen = 0u32;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen >= target.max(1) {
            return value as u8;
        }
    }
    255
}

/// Classify by the spread between the 5th and 95th luma percentiles.
pub fn classify_contrast(
    luma: &LumaGrid,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Option<ContrastClass> {
    if luma.is_empty() {
        return None;
    }

    let mut histogram = [0u32; 256];
    for y in 0..luma.height {
        if cancel.is_cancelled() {
            return None;
        }
        for &v in luma.row(y) {
            histogram[v.clamp(0.0, 255.0) as usize] += 1;
        }
    }

    let total = (luma.width * luma.height) as u32;
    let spread = percentile(&histogram, total, 0.95).saturating_sub(percentile(&histogram, total, 0.05));

    Some(if spread < config.low_contrast_spread {
        ContrastClass::Low
    } else if spread > config.high_contrast_spread {
        ContrastClass::High
    } else {
        ContrastClass::Normal
    })
}
