use super::{fit, OutputSink};
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Writes numbered PNG previews into a directory.
pub struct DiskOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    written: u64,
}

impl DiskOutput {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Writing previews to {} ({}x{})", dir.display(), width, height);
        Ok(Self {
            dir,
            width,
            height,
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl OutputSink for DiskOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let frame = fit(frame, self.width, self.height);
        let path = self.dir.join(format!("preview_{:06}.png", self.written));
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
