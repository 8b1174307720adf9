//! Two-tier segmentation mask cache with blurred previews.
//!
//! Masks are keyed by image content and resolution tier; blurred previews by
//! image, tier and blur bucket. Everything lives in one LRU under one lock, so
//! a lookup sees an entry whole or not at all, and eviction or a pressure flush
//! is atomic with respect to lookups.
//!
//! Lookup order for a mask: exact hit, then (for the preview tier) a rescale
//! of an existing full-resolution mask, then a fresh segmentation. Segmentation
//! runs outside the cache lock.
//!
//! A blurred preview never outlives its mask: evicting a mask drops every
//! preview rendered from it.

mod blur;

pub use blur::{bucket_radius, composite, intensity_bucket, preview_size, render_preview};
pub use crate::segmentation::Mask;

use crate::config::CacheConfig;
use crate::error::{EngineError, Result};
use crate::frame::ImageId;
use crate::segmentation::SegmentationModel;
use image::{imageops, RgbImage};
use lru::LruCache;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionTier {
    Full,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheKey {
    Mask(ImageId, ResolutionTier),
    Blur(ImageId, ResolutionTier, u8),
}

#[derive(Debug, Clone)]
enum Entry {
    Mask(Arc<Mask>),
    Blur(Arc<RgbImage>),
}

#[derive(Debug)]
struct Slot {
    entry: Entry,
    cost: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Preview masks rescaled from a cached full-resolution mask.
    pub derived_hits: u64,
    pub misses: u64,
    /// Calls into the segmentation model.
    pub segmentations: u64,
    pub evictions: u64,
    pub flushes: u64,
    pub cost: usize,
    pub entries: usize,
}

struct Inner {
    lru: LruCache<CacheKey, Slot>,
    cost: usize,
    stats: CacheStats,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.lru.pop(key) {
            Some(slot) => {
                self.cost -= slot.cost;
                true
            }
            None => false,
        }
    }

    /// Drop the blurred previews rendered from a mask.
    fn invalidate_blurs(&mut self, id: ImageId, tier: ResolutionTier) {
        let stale: Vec<CacheKey> = self
            .lru
            .iter()
            .filter_map(|(k, _)| match k {
                CacheKey::Blur(i, t, _) if *i == id && *t == tier => Some(*k),
                _ => None,
            })
            .collect();
        for key in stale {
            if self.remove(&key) {
                self.stats.evictions += 1;
            }
        }
    }

    fn evict_to(&mut self, budget: usize) {
        while self.cost > budget {
            let Some((key, slot)) = self.lru.pop_lru() else {
                break;
            };
            self.cost -= slot.cost;
            self.stats.evictions += 1;
            debug!("Evicted {:?} ({} bytes)", key, slot.cost);
            if let CacheKey::Mask(id, tier) = key {
                self.invalidate_blurs(id, tier);
            }
        }
    }
}

pub struct MaskCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    model: Mutex<Box<dyn SegmentationModel>>,
}

impl MaskCache {
    pub fn new(config: CacheConfig, model: Box<dyn SegmentationModel>) -> Self {
        debug!(
            "Mask cache: budget {} MB, preview side {}",
            config.budget_bytes / 1024 / 1024,
            config.preview_max_side
        );
        Self {
            config,
            inner: Mutex::new(Inner {
                lru: LruCache::unbounded(),
                cost: 0,
                stats: CacheStats::default(),
            }),
            model: Mutex::new(model),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Mask for `image` at `tier`, reusing cached work where possible.
    pub fn get_or_create_mask(&self, image: &RgbImage, tier: ResolutionTier) -> Result<Arc<Mask>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::ZeroDimensions);
        }
        self.mask_for(ImageId::of(image), image, tier)
    }

    /// Background-blurred preview of `image`. `blur_intensity` is 0..1.
    pub fn get_or_create_preview(&self, image: &RgbImage, blur_intensity: f32) -> Result<Arc<RgbImage>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::ZeroDimensions);
        }
        let id = ImageId::of(image);
        let bucket = intensity_bucket(blur_intensity, self.config.blur_buckets);
        let key = CacheKey::Blur(id, ResolutionTier::Preview, bucket);

        {
            let mut inner = self.lock();
            if let Some(Slot {
                entry: Entry::Blur(preview),
                ..
            }) = inner.lru.get(&key)
            {
                let preview = Arc::clone(preview);
                inner.stats.hits += 1;
                return Ok(preview);
            }
        }

        let mask = self.mask_for(id, image, ResolutionTier::Preview)?;
        let small = self.tier_image(image, ResolutionTier::Preview);
        let radius = bucket_radius(bucket, self.config.blur_buckets, self.config.max_blur_radius);
        let rendered = Arc::new(render_preview(&small, &mask, radius));

        let mut inner = self.lock();
        // Only cache a preview while the mask it came from is still cached.
        let source_live = matches!(
            inner.lru.peek(&CacheKey::Mask(id, ResolutionTier::Preview)),
            Some(Slot { entry: Entry::Mask(m), .. }) if Arc::ptr_eq(m, &mask)
        );
        if !source_live {
            debug!("Preview for {:?} not cached: source mask gone", id);
            return Ok(rendered);
        }
        if let Some(Slot {
            entry: Entry::Blur(existing),
            ..
        }) = inner.lru.get(&key)
        {
            return Ok(Arc::clone(existing));
        }
        let cost = rendered.as_raw().len() + std::mem::size_of::<RgbImage>();
        self.insert(&mut inner, key, Entry::Blur(Arc::clone(&rendered)), cost);
        Ok(rendered)
    }

    fn mask_for(&self, id: ImageId, image: &RgbImage, tier: ResolutionTier) -> Result<Arc<Mask>> {
        let key = CacheKey::Mask(id, tier);
        let full = {
            let mut inner = self.lock();
            if let Some(Slot {
                entry: Entry::Mask(mask),
                ..
            }) = inner.lru.get(&key)
            {
                let mask = Arc::clone(mask);
                inner.stats.hits += 1;
                return Ok(mask);
            }
            let full = match tier {
                ResolutionTier::Preview => match inner.lru.get(&CacheKey::Mask(id, ResolutionTier::Full)) {
                    Some(Slot {
                        entry: Entry::Mask(full),
                        ..
                    }) => Some(Arc::clone(full)),
                    _ => None,
                },
                ResolutionTier::Full => None,
            };
            if full.is_none() {
                inner.stats.misses += 1;
            }
            full
        };

        let (width, height) = self.tier_dimensions(image, tier);
        let mask = match full {
            Some(full) => {
                let derived = full.resampled(width, height);
                self.lock().stats.derived_hits += 1;
                debug!("Derived {}x{} preview mask for {:?}", width, height, id);
                derived
            }
            None => self.segment(&self.tier_image(image, tier))?,
        };

        let mut inner = self.lock();
        if let Some(Slot {
            entry: Entry::Mask(existing),
            ..
        }) = inner.lru.get(&key)
        {
            // Another caller got there first.
            return Ok(Arc::clone(existing));
        }
        let mask = Arc::new(mask);
        let cost = mask.cost();
        // A replaced mask must not leave previews from its predecessor.
        inner.invalidate_blurs(id, tier);
        self.insert(&mut inner, key, Entry::Mask(Arc::clone(&mask)), cost);
        Ok(mask)
    }

    fn insert(&self, inner: &mut Inner, key: CacheKey, entry: Entry, cost: usize) {
        if cost > self.config.budget_bytes {
            debug!("{:?} ({} bytes) exceeds the cache budget, not cached", key, cost);
            return;
        }
        inner.lru.put(key, Slot { entry, cost });
        inner.cost += cost;
        inner.evict_to(self.config.budget_bytes);
    }

    fn segment(&self, image: &RgbImage) -> Result<Mask> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        // Cached images are unrelated stills; no temporal carry-over.
        model.reset_state();
        let mask = model
            .segment(image)
            .map_err(|e| EngineError::Segmentation(format!("{e:#}")))?;
        drop(model);
        self.lock().stats.segmentations += 1;

        if mask.dimensions() != image.dimensions() {
            return Ok(mask.resampled(image.width(), image.height()));
        }
        Ok(mask)
    }

    fn tier_dimensions(&self, image: &RgbImage, tier: ResolutionTier) -> (u32, u32) {
        match tier {
            ResolutionTier::Full => image.dimensions(),
            ResolutionTier::Preview => preview_size(image.width(), image.height(), self.config.preview_max_side),
        }
    }

    fn tier_image(&self, image: &RgbImage, tier: ResolutionTier) -> RgbImage {
        let (width, height) = self.tier_dimensions(image, tier);
        if (width, height) == image.dimensions() {
            return image.clone();
        }
        imageops::resize(image, width, height, imageops::FilterType::Triangle)
    }

    /// Drop every entry of both tiers.
    pub fn on_memory_pressure(&self) {
        let mut inner = self.lock();
        let entries = inner.lru.len();
        let freed = inner.cost;
        inner.lru.clear();
        inner.cost = 0;
        inner.stats.flushes += 1;
        warn!("Memory pressure: flushed {} cache entries ({} bytes)", entries, freed);
    }

    pub fn total_cost(&self) -> usize {
        self.lock().cost
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a mask is cached, without touching recency.
    pub fn contains_mask(&self, image: &RgbImage, tier: ResolutionTier) -> bool {
        let key = CacheKey::Mask(ImageId::of(image), tier);
        self.lock().lru.contains(&key)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            cost: inner.cost,
            entries: inner.lru.len(),
            ..inner.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::LumaKeySegmenter;
    use image::Rgb;

    fn subject(w: u32, h: u32, seed: u8) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if x > w / 4 && x < 3 * w / 4 && y > h / 4 && y < 3 * h / 4 {
                Rgb([230, 220, seed])
            } else {
                Rgb([20, 30, 40])
            }
        })
    }

    fn cache(budget: usize) -> MaskCache {
        MaskCache::new(
            CacheConfig {
                budget_bytes: budget,
                preview_max_side: 64,
                ..CacheConfig::default()
            },
            Box::new(LumaKeySegmenter::default()),
        )
    }

    #[test]
    fn exact_hit_returns_same_mask() {
        let cache = cache(1 << 20);
        let image = subject(128, 96, 1);
        let a = cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        let b = cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let stats = cache.stats();
        assert_eq!(stats.segmentations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn preview_is_derived_from_full() {
        let cache = cache(1 << 20);
        let image = subject(128, 96, 1);
        cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        let preview = cache.get_or_create_mask(&image, ResolutionTier::Preview).unwrap();
        assert_eq!(preview.dimensions(), (64, 48));
        let stats = cache.stats();
        assert_eq!(stats.segmentations, 1);
        assert_eq!(stats.derived_hits, 1);
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let cache = cache(1 << 20);
        let err = cache.get_or_create_mask(&RgbImage::new(0, 10), ResolutionTier::Full).unwrap_err();
        assert!(matches!(err, EngineError::ZeroDimensions));
    }

    #[test]
    fn oversized_entry_is_not_cached() {
        let cache = cache(100);
        let image = subject(32, 32, 1);
        let mask = cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        assert_eq!(mask.dimensions(), (32, 32));
        assert_eq!(cache.total_cost(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn preview_bucket_hits() {
        let cache = cache(1 << 20);
        let image = subject(128, 96, 1);
        let a = cache.get_or_create_preview(&image, 0.51).unwrap();
        let b = cache.get_or_create_preview(&image, 0.49).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.dimensions(), (64, 48));
        assert_eq!(cache.stats().segmentations, 1);
    }

    #[test]
    fn pressure_flush_empties_both_tiers() {
        let cache = cache(1 << 20);
        let image = subject(128, 96, 1);
        cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        cache.get_or_create_preview(&image, 0.5).unwrap();
        assert_eq!(cache.len(), 3);
        cache.on_memory_pressure();
        assert_eq!(cache.total_cost(), 0);
        assert!(!cache.contains_mask(&image, ResolutionTier::Full));
        assert_eq!(cache.stats().flushes, 1);
    }
}
