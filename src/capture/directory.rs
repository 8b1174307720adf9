use super::CaptureSource;
use crate::error::EngineError;
use crate::frame::Frame;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Replays the images of a directory in file-name order.
pub struct DirectoryCapture {
    paths: Vec<PathBuf>,
    cursor: usize,
    next_id: u64,
    looping: bool,
    resolution: (u32, u32),
}

impl DirectoryCapture {
    pub fn open<P: AsRef<Path>>(dir: P, looping: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| EngineError::Capture(format!("no images in {}", dir.display())))?;
        let resolution = image::image_dimensions(first)
            .with_context(|| format!("Failed to read {}", first.display()))?;

        tracing::info!(
            "Replaying {} frames from {} ({}x{})",
            paths.len(),
            dir.display(),
            resolution.0,
            resolution.1
        );

        Ok(Self {
            paths,
            cursor: 0,
            next_id: 0,
            looping,
            resolution,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl CaptureSource for DirectoryCapture {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        let frame = Frame::new(self.next_id, image);
        self.next_id += 1;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
