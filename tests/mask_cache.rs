use framesight::cache::{MaskCache, ResolutionTier};
use framesight::config::CacheConfig;
use framesight::segmentation::{LumaKeySegmenter, Mask, SegmentationModel};
use image::{Rgb, RgbImage};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Luma keyer that counts how often it runs.
struct Counting {
    inner: LumaKeySegmenter,
    calls: Arc<AtomicUsize>,
}

impl SegmentationModel for Counting {
    fn segment(&mut self, image: &RgbImage) -> anyhow::Result<Mask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.segment(image)
    }

    fn input_size(&self) -> (u32, u32) {
        (0, 0)
    }
}

fn cache(budget_bytes: usize) -> (MaskCache, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = MaskCache::new(
        CacheConfig {
            budget_bytes,
            preview_max_side: 64,
            ..CacheConfig::default()
        },
        Box::new(Counting {
            inner: LumaKeySegmenter::default(),
            calls: Arc::clone(&calls),
        }),
    );
    (cache, calls)
}

/// A soft-edged bright disc on a dark backdrop; `seed` makes images distinct.
fn scene(width: u32, height: u32, seed: u32) -> RgbImage {
    let (cx, cy) = (width as f32 * 0.55, height as f32 * 0.45);
    let radius = width.min(height) as f32 * 0.3;
    RgbImage::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let t = ((radius - d) / 6.0).clamp(0.0, 1.0);
        let v = (20.0 + t * 200.0) as u8;
        Rgb([v, v, (seed % 251) as u8])
    })
}

#[test]
fn preview_mask_is_idempotent() {
    let (cache, calls) = cache(64 << 20);
    let image = scene(256, 192, 1);
    let first = cache.get_or_create_mask(&image, ResolutionTier::Preview).unwrap();
    let segmentations = calls.load(Ordering::SeqCst);
    let second = cache.get_or_create_mask(&image, ResolutionTier::Preview).unwrap();

    assert_eq!(first.alpha(), second.alpha());
    assert_eq!(calls.load(Ordering::SeqCst), segmentations);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn derived_preview_matches_fresh_preview() {
    let image = scene(512, 384, 3);

    let (derived_cache, derived_calls) = cache(64 << 20);
    derived_cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
    let derived = derived_cache.get_or_create_mask(&image, ResolutionTier::Preview).unwrap();
    assert_eq!(derived_calls.load(Ordering::SeqCst), 1);
    assert_eq!(derived_cache.stats().derived_hits, 1);

    let (fresh_cache, _) = cache(64 << 20);
    let fresh = fresh_cache.get_or_create_mask(&image, ResolutionTier::Preview).unwrap();

    assert_eq!(derived.dimensions(), fresh.dimensions());
    let diff = derived.mean_abs_diff(&fresh).unwrap();
    assert!(diff < 8.0, "mean alpha difference {diff}");
}

#[test]
fn cost_stays_within_budget() {
    let budget = 200_000;
    let (cache, _) = cache(budget);
    let mut rng = rand::rng();
    for i in 0..60u32 {
        let w = rng.random_range(16..200);
        let h = rng.random_range(16..200);
        let image = scene(w, h, i);
        if rng.random_bool(0.5) {
            cache.get_or_create_mask(&image, ResolutionTier::Full).unwrap();
        } else {
            cache.get_or_create_preview(&image, rng.random_range(0.0..1.0)).unwrap();
        }
        assert!(cache.total_cost() <= budget, "cost {} after insert {}", cache.total_cost(), i);
    }
    assert!(cache.stats().evictions > 0);
}

#[test]
fn pressure_flush_turns_every_entry_into_a_miss() {
    let (cache, calls) = cache(64 << 20);
    let images: Vec<RgbImage> = (0..50).map(|i| scene(48, 32, i)).collect();
    for image in &images {
        cache.get_or_create_mask(image, ResolutionTier::Full).unwrap();
    }
    assert_eq!(cache.len(), 50);

    cache.on_memory_pressure();
    assert_eq!(cache.total_cost(), 0);

    let before = cache.stats();
    for image in &images {
        assert!(!cache.contains_mask(image, ResolutionTier::Full));
        cache.get_or_create_mask(image, ResolutionTier::Full).unwrap();
    }
    let after = cache.stats();
    assert_eq!(after.misses - before.misses, 50);
    assert_eq!(after.hits, before.hits);
    assert_eq!(calls.load(Ordering::SeqCst), 100);
}

#[test]
fn evicted_mask_takes_its_previews_along() {
    let image = scene(128, 96, 5);
    let other = scene(128, 96, 6);

    // Room for one preview mask plus its render, not two of each.
    let probe = {
        let (c, _) = cache(64 << 20);
        c.get_or_create_preview(&image, 0.5).unwrap();
        c.total_cost()
    };
    let (cache, calls) = cache(probe + probe / 2);

    let first = cache.get_or_create_preview(&image, 0.5).unwrap();
    assert_eq!(cache.len(), 2);
    cache.get_or_create_preview(&other, 0.5).unwrap();
    assert!(!cache.contains_mask(&image, ResolutionTier::Preview));

    // The preview for `image` is rebuilt from a fresh mask, not served stale.
    let segmentations = calls.load(Ordering::SeqCst);
    let again = cache.get_or_create_preview(&image, 0.5).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), segmentations + 1);
    assert!(!Arc::ptr_eq(&first, &again));
    assert_eq!(first.as_raw(), again.as_raw());
    assert!(cache.total_cost() <= probe + probe / 2);
}
