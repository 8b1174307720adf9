use super::OutputSink;
use crate::cache::{MaskCache, ResolutionTier};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, warn};

/// What the preview thread renders for each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreviewMode {
    /// Background blur at intensity 0..1.
    Blur(f32),
    /// Grayscale matte.
    Matte,
}

/// Renders previews through the mask cache on its own thread and writes them
/// to a sink. Frames offered while a render is pending are dropped.
pub struct PreviewWorker {
    tx: Option<Sender<Arc<RgbImage>>>,
    handle: Option<thread::JoinHandle<()>>,
    written: Arc<AtomicU64>,
    dropped: AtomicU64,
}

impl PreviewWorker {
    pub fn spawn(cache: Arc<MaskCache>, sink: Box<dyn OutputSink>, mode: PreviewMode) -> std::io::Result<Self> {
        let (tx, rx) = bounded(1);
        let written = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&written);
        let handle = thread::Builder::new()
            .name("preview".to_string())
            .spawn(move || render_loop(&cache, sink, mode, &rx, &counter))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            written,
            dropped: AtomicU64::new(0),
        })
    }

    /// Hand a frame to the preview thread. Never blocks; returns false when the
    /// frame was dropped.
    pub fn offer(&self, image: Arc<RgbImage>) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(image) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for PreviewWorker {
    fn drop(&mut self) {
        // Pending frames are still rendered before the thread exits.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn render_loop(
    cache: &MaskCache,
    mut sink: Box<dyn OutputSink>,
    mode: PreviewMode,
    rx: &Receiver<Arc<RgbImage>>,
    written: &AtomicU64,
) {
    for image in rx.iter() {
        let rendered = match mode {
            PreviewMode::Matte => cache
                .get_or_create_mask(&image, ResolutionTier::Preview)
                .map(|mask| mask.to_rgb()),
            PreviewMode::Blur(intensity) => cache
                .get_or_create_preview(&image, intensity)
                .map(|preview| preview.as_ref().clone()),
        };
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Preview failed: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.write_frame(&rendered) {
            error!("Failed to write preview, stopping output: {:#}", e);
            break;
        }
        written.fetch_add(1, Ordering::Relaxed);
    }
    debug!("Preview thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::segmentation::LumaKeySegmenter;
    use image::Rgb;
    use std::sync::Mutex;

    /// Records frame sizes; optionally waits for a release before returning.
    struct Recording {
        frames: Arc<Mutex<Vec<(u32, u32)>>>,
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    impl OutputSink for Recording {
        fn write_frame(&mut self, frame: &RgbImage) -> anyhow::Result<()> {
            if let Some((entered, release)) = &self.gate {
                entered.send(())?;
                release.recv()?;
            }
            self.frames.lock().unwrap().push(frame.dimensions());
            Ok(())
        }

        fn resolution(&self) -> (u32, u32) {
            (64, 48)
        }
    }

    fn cache() -> Arc<MaskCache> {
        Arc::new(MaskCache::new(
            CacheConfig {
                preview_max_side: 64,
                ..CacheConfig::default()
            },
            Box::new(LumaKeySegmenter::default()),
        ))
    }

    fn image(shade: u8) -> Arc<RgbImage> {
        Arc::new(RgbImage::from_fn(128, 96, |x, _| {
            if x > 40 && x < 90 {
                Rgb([220, 210, shade])
            } else {
                Rgb([20, 20, 20])
            }
        }))
    }

    #[test]
    fn renders_offered_frames_into_the_sink() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Recording {
            frames: Arc::clone(&frames),
            gate: None,
        };
        let worker = PreviewWorker::spawn(cache(), Box::new(sink), PreviewMode::Blur(0.5)).unwrap();
        assert!(worker.offer(image(1)));
        drop(worker);
        assert_eq!(*frames.lock().unwrap(), vec![(64, 48)]);
    }

    #[test]
    fn offer_does_not_wait_for_a_slow_sink() {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = bounded(0);
        let (release_tx, release_rx) = bounded(0);
        let sink = Recording {
            frames: Arc::clone(&frames),
            gate: Some((entered_tx, release_rx)),
        };
        let worker = PreviewWorker::spawn(cache(), Box::new(sink), PreviewMode::Matte).unwrap();

        assert!(worker.offer(image(1)));
        entered_rx.recv().unwrap();
        // The sink is stuck on the first frame: one more fits, the next is dropped.
        assert!(worker.offer(image(2)));
        assert!(!worker.offer(image(3)));
        assert_eq!(worker.dropped(), 1);

        release_tx.send(()).unwrap();
        entered_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        drop(worker);
        assert_eq!(frames.lock().unwrap().len(), 2);
    }
}
