use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("mask is {actual} bytes, expected {expected} for {width}x{height}")]
    MaskSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
