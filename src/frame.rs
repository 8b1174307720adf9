//! Frames handed to the engine by the capture source.

use crate::geometry::Size;
use image::RgbImage;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Monotonically increasing frame sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

/// A captured frame. The pixel buffer is shared read-only between the
/// detection and signal tasks that analyse it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id: FrameId(id),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width() as f64, self.image.height() as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }
}

/// Content identity of an image, used as the mask cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(pub u64);

impl ImageId {
    /// Hash dimensions and pixel data. Two images with identical content share
    /// an identity; any pixel change yields a new one.
    pub fn of(image: &RgbImage) -> Self {
        let mut hasher = DefaultHasher::new();
        image.dimensions().hash(&mut hasher);
        image.as_raw().hash(&mut hasher);
        Self(hasher.finish())
    }
}
