mod disk;
#[cfg(feature = "device")]
mod loopback;
mod preview;

pub use disk::DiskOutput;
#[cfg(feature = "device")]
pub use loopback::V4L2Output;
pub use preview::{PreviewMode, PreviewWorker};

use anyhow::Result;
use image::RgbImage;

/// Destination for rendered preview frames.
pub trait OutputSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Expected output resolution, `(width, height)`.
    fn resolution(&self) -> (u32, u32);
}

/// Letterbox-free resize to the sink resolution, borrowing when it already fits.
pub(crate) fn fit(frame: &RgbImage, width: u32, height: u32) -> std::borrow::Cow<'_, RgbImage> {
    if frame.dimensions() == (width, height) {
        std::borrow::Cow::Borrowed(frame)
    } else {
        std::borrow::Cow::Owned(image::imageops::resize(
            frame,
            width,
            height,
            image::imageops::FilterType::Triangle,
        ))
    }
}
