//! Host memory pressure watcher that flushes the mask cache.

use crate::cache::MaskCache;
use crate::config::PressureConfig;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use sysinfo::System;
use tracing::{debug, info};

/// Answers "is the host short on memory right now?".
pub trait PressureSource: Send {
    fn under_pressure(&mut self) -> bool;
}

/// Available system memory below a fraction of the total.
pub struct SystemMemory {
    sys: System,
    available_fraction: f64,
}

impl SystemMemory {
    pub fn new(available_fraction: f64) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        info!(
            "System memory: {} MB total, {} MB available",
            sys.total_memory() / 1024 / 1024,
            sys.available_memory() / 1024 / 1024
        );
        Self {
            sys,
            available_fraction,
        }
    }
}

impl PressureSource for SystemMemory {
    fn under_pressure(&mut self) -> bool {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return false;
        }
        (self.sys.available_memory() as f64) < total as f64 * self.available_fraction
    }
}

/// Background thread polling a [`PressureSource`]. The cache is flushed once
/// each time pressure is entered, not on every poll while it lasts.
pub struct MemoryPressureMonitor {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MemoryPressureMonitor {
    pub fn spawn(cache: Arc<MaskCache>, config: &PressureConfig) -> std::io::Result<Self> {
        Self::with_source(
            cache,
            Box::new(SystemMemory::new(config.available_fraction)),
            config,
        )
    }

    pub fn with_source(
        cache: Arc<MaskCache>,
        mut source: Box<dyn PressureSource>,
        config: &PressureConfig,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let poll = config.poll_interval;
        let handle = thread::Builder::new()
            .name("memory-pressure".to_string())
            .spawn(move || {
                let mut pressed = false;
                loop {
                    match stop_rx.recv_timeout(poll) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                    let now = source.under_pressure();
                    if now && !pressed {
                        cache.on_memory_pressure();
                    }
                    pressed = now;
                }
                debug!("Memory pressure monitor stopped");
            })?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for MemoryPressureMonitor {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResolutionTier;
    use crate::config::CacheConfig;
    use crate::segmentation::LumaKeySegmenter;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    struct Toggle(Arc<AtomicBool>);

    impl PressureSource for Toggle {
        fn under_pressure(&mut self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn flushes_once_per_pressure_episode() {
        let cache = Arc::new(MaskCache::new(
            CacheConfig::default(),
            Box::new(LumaKeySegmenter::default()),
        ));
        let image = RgbImage::from_pixel(32, 32, Rgb([9, 9, 9]));
        cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();

        let flag = Arc::new(AtomicBool::new(false));
        let config = PressureConfig {
            poll_interval: Duration::from_millis(5),
            ..PressureConfig::default()
        };
        let monitor =
            MemoryPressureMonitor::with_source(Arc::clone(&cache), Box::new(Toggle(flag.clone())), &config).unwrap();

        flag.store(true, Ordering::SeqCst);
        let until = Instant::now() + Duration::from_secs(2);
        while cache.stats().flushes == 0 && Instant::now() < until {
            thread::sleep(Duration::from_millis(5));
        }
        // Still under pressure for several polls.
        thread::sleep(Duration::from_millis(50));
        drop(monitor);

        assert_eq!(cache.stats().flushes, 1);
        assert!(cache.is_empty());
    }
}
