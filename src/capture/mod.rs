mod directory;
#[cfg(feature = "device")]
mod webcam;

pub use directory::DirectoryCapture;
#[cfg(feature = "device")]
pub use webcam::WebcamCapture;

use crate::frame::Frame;
use anyhow::Result;

/// Single-producer source of frames.
pub trait CaptureSource {
    /// Next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Resolution of produced frames, `(width, height)`.
    fn resolution(&self) -> (u32, u32);
}
