//! In-memory animation cache with LRU eviction and coalesced fetches
//!
//! Structure:
//! - `items`: `(source_id, size)` -> resident [`MemoryItem`]
//! - `lru`: IndexSet in use order (front = oldest)
//! - `pending`: fetches in progress, each with its waiting subscribers
//!
//! One `fetch` runs per key no matter how many subscribers ask for it while it
//! is in progress. Every waiting subscriber receives the result. Disposing the
//! last waiting subscriber disposes the fetch itself.
//!
//! Eviction is by item count (`capacity`) and by byte budget
//! ([`MemoryBudget`]). The item just inserted is never evicted by its own
//! insertion, so one oversized animation still gets delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use image::RgbaImage;
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use super::cache_man::MemoryBudget;
use crate::config::CacheConfig;
use crate::entities::{
    ActionDisposable, AnimationCache, AnimationFrame, CacheItem, Disposable, EmptyDisposable, FetchFn,
    FirstFrameCallback, FrameFormat, ItemResult, ItemResultCallback, ItemWriter, PixelSize, RequestedFormat,
    TaskQueue,
};

/// Fallback duration for frames written with a non-positive duration
const DEFAULT_FRAME_DURATION: f64 = 1.0 / 30.0;

/// Cache statistics for monitoring
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of `fetch` invocations (coalesced misses count once)
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct MemoryFrame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    /// Start offset within the loop (seconds)
    start: f64,
    duration: f64,
}

/// Fully decoded animation held in memory.
///
/// `get_frame` loops: timestamps beyond the total duration wrap around.
pub struct MemoryItem {
    frames: Vec<MemoryFrame>,
    total_duration: f64,
    bytes: usize,
}

impl MemoryItem {
    /// Build from `(image, duration)` pairs. `None` if there are no frames.
    pub fn from_frames(frames: Vec<(RgbaImage, f64)>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        let mut start = 0.0;
        let mut bytes = 0;
        let frames = frames
            .into_iter()
            .map(|(image, duration)| {
                let duration = if duration > 0.0 { duration } else { DEFAULT_FRAME_DURATION };
                let (width, height) = image.dimensions();
                let data = image.into_raw();
                bytes += data.len();
                let frame = MemoryFrame {
                    data: Arc::new(data),
                    width,
                    height,
                    start,
                    duration,
                };
                start += duration;
                frame
            })
            .collect();
        Some(Self {
            frames,
            total_duration: start,
            bytes,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Loop length in seconds
    pub fn duration(&self) -> f64 {
        self.total_duration
    }

    /// Resident pixel bytes
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    fn frame_at(&self, timestamp: f64) -> Option<&MemoryFrame> {
        if !timestamp.is_finite() {
            return None;
        }
        let t = timestamp.rem_euclid(self.total_duration);
        // Frames are sorted by start; last one whose start <= t
        let index = self.frames.partition_point(|f| f.start <= t).saturating_sub(1);
        self.frames.get(index)
    }
}

impl CacheItem for MemoryItem {
    fn get_frame(&self, timestamp: f64, format: RequestedFormat) -> Option<AnimationFrame> {
        match format {
            RequestedFormat::Rgba => self.frame_at(timestamp).map(|frame| AnimationFrame {
                format: FrameFormat::Rgba {
                    data: Arc::clone(&frame.data),
                    width: frame.width,
                    height: frame.height,
                    bytes_per_row: frame.width as usize * 4,
                },
                duration: frame.duration,
            }),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct CacheKey {
    source_id: String,
    size: PixelSize,
}

type Subscriber = Arc<dyn Fn(ItemResult) + Send + Sync>;

struct PendingFetch {
    generation: u64,
    subscribers: IndexMap<u64, Subscriber>,
    handle: Option<Box<dyn Disposable>>,
}

#[derive(Default)]
struct CacheState {
    items: HashMap<CacheKey, Arc<MemoryItem>>,
    lru: IndexSet<CacheKey>,
    pending: HashMap<CacheKey, PendingFetch>,
    next_id: u64,
}

impl CacheState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn touch(&mut self, key: &CacheKey) {
        self.lru.shift_remove(key);
        self.lru.insert(key.clone());
    }
}

struct Inner {
    state: Mutex<CacheState>,
    budget: Arc<MemoryBudget>,
    stats: CacheStats,
    capacity: usize,
}

/// `AnimationCache` keeping decoded animations in memory.
pub struct MemoryAnimationCache {
    inner: Arc<Inner>,
}

impl MemoryAnimationCache {
    /// # Arguments
    /// * `capacity` - Maximum resident items before LRU eviction (min 1)
    /// * `budget` - Byte budget, possibly shared with other caches
    pub fn new(capacity: usize, budget: Arc<MemoryBudget>) -> Self {
        let capacity = capacity.max(1);
        debug!("MemoryAnimationCache created: capacity={}", capacity);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                budget,
                stats: CacheStats::default(),
                capacity,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, Arc::new(MemoryBudget::from_config(config)))
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    pub fn budget(&self) -> &Arc<MemoryBudget> {
        &self.inner.budget
    }

    /// Number of resident items
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, source_id: &str, size: PixelSize) -> bool {
        self.inner.lock().items.contains_key(&key(source_id, size))
    }

    /// Number of fetches in progress
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Make `item` resident directly, bypassing fetch
    pub fn insert(&self, source_id: &str, size: PixelSize, item: MemoryItem) {
        self.inner.insert(key(source_id, size), Arc::new(item));
    }

    /// Drop every resident item. Pending fetches are unaffected.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        let freed: usize = state.items.values().map(|i| i.bytes()).sum();
        state.items.clear();
        state.lru.clear();
        self.inner.budget.free(freed);
        debug!("MemoryAnimationCache cleared, {} KB freed", freed / 1024);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<MemoryItem>> {
        self.lock().items.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, item: Arc<MemoryItem>) {
        let mut state = self.lock();
        let bytes = item.bytes();
        if let Some(old) = state.items.insert(key.clone(), item) {
            self.budget.free(old.bytes());
        }
        state.touch(&key);
        self.budget.add(bytes);
        trace!("Cached {}@{} ({} bytes)", key.source_id, key.size, bytes);

        while state.items.len() > self.capacity || self.budget.over_limit() {
            if !self.evict_oldest(&mut state, &key) {
                break;
            }
        }
    }

    /// Evict the least recently used item other than `keep`.
    fn evict_oldest(&self, state: &mut CacheState, keep: &CacheKey) -> bool {
        let Some(oldest) = state.lru.iter().find(|k| *k != keep).cloned() else {
            return false;
        };
        state.lru.shift_remove(&oldest);
        if let Some(evicted) = state.items.remove(&oldest) {
            self.budget.free(evicted.bytes());
            CacheStats::record(&self.stats.evictions);
            debug!("LRU evicted: {}@{} ({} KB)", oldest.source_id, oldest.size, evicted.bytes() / 1024);
        }
        true
    }

    /// Fetch for `key` finished. Notifies the subscribers of that fetch.
    fn complete(&self, key: &CacheKey, generation: u64, item: Option<MemoryItem>) {
        let item = item.map(Arc::new);
        if let Some(item) = &item {
            self.insert(key.clone(), Arc::clone(item));
        }

        let subscribers = {
            let mut state = self.lock();
            if state.pending.get(key).is_some_and(|p| p.generation == generation) {
                state.pending.remove(key).map(|p| p.subscribers)
            } else {
                None
            }
        };

        let Some(subscribers) = subscribers else {
            trace!("Fetch for {}@{} finished with no waiting subscribers", key.source_id, key.size);
            return;
        };
        if item.is_none() {
            debug!("Fetch for {}@{} failed", key.source_id, key.size);
        }
        let result = ItemResult {
            item: item.map(|i| i as Arc<dyn CacheItem>),
        };
        for subscriber in subscribers.into_values() {
            subscriber(result.clone());
        }
    }

    /// Remove subscriber; dispose the fetch if it was the last one waiting.
    fn unsubscribe(&self, key: &CacheKey, generation: u64, subscriber: u64) {
        let handle = {
            let mut state = self.lock();
            let Some(pending) = state.pending.get_mut(key).filter(|p| p.generation == generation) else {
                return;
            };
            pending.subscribers.shift_remove(&subscriber);
            if !pending.subscribers.is_empty() {
                return;
            }
            trace!("Last subscriber for {}@{} gone, cancelling fetch", key.source_id, key.size);
            state.pending.remove(key).and_then(|p| p.handle)
        };
        if let Some(handle) = handle {
            handle.dispose();
        }
    }
}

/// Writer handed to `fetch`; dropping it unfinished counts as failure.
struct MemoryItemWriter {
    cache: Weak<Inner>,
    key: CacheKey,
    generation: u64,
    frames: Vec<(RgbaImage, f64)>,
    done: bool,
}

impl MemoryItemWriter {
    fn complete(&mut self, item: Option<MemoryItem>) {
        if self.done {
            return;
        }
        self.done = true;
        if let Some(cache) = self.cache.upgrade() {
            cache.complete(&self.key, self.generation, item);
        }
    }
}

impl ItemWriter for MemoryItemWriter {
    fn add_frame(&mut self, image: RgbaImage, duration: f64) {
        self.frames.push((image, duration));
    }

    fn finish(mut self: Box<Self>) {
        let frames = std::mem::take(&mut self.frames);
        let item = MemoryItem::from_frames(frames);
        self.complete(item);
    }

    fn fail(mut self: Box<Self>) {
        self.complete(None);
    }
}

impl Drop for MemoryItemWriter {
    fn drop(&mut self) {
        self.complete(None);
    }
}

impl AnimationCache for MemoryAnimationCache {
    fn get(&self, source_id: &str, size: PixelSize, fetch: FetchFn, on_result: ItemResultCallback) -> Box<dyn Disposable> {
        let key = key(source_id, size);
        let inner = &self.inner;

        let (generation, subscriber, start_fetch) = {
            let mut state = inner.lock();
            if let Some(item) = state.items.get(&key).cloned() {
                state.touch(&key);
                drop(state);
                CacheStats::record(&inner.stats.hits);
                on_result(ItemResult::present(item));
                return Box::new(EmptyDisposable);
            }
            CacheStats::record(&inner.stats.misses);

            let subscriber = state.next_id();
            let on_result: Subscriber = Arc::from(on_result);
            match state.pending.get_mut(&key) {
                Some(pending) => {
                    pending.subscribers.insert(subscriber, on_result);
                    trace!("Joined pending fetch for {}@{}", key.source_id, key.size);
                    (pending.generation, subscriber, false)
                }
                None => {
                    let generation = state.next_id();
                    let mut subscribers = IndexMap::new();
                    subscribers.insert(subscriber, on_result);
                    state.pending.insert(
                        key.clone(),
                        PendingFetch {
                            generation,
                            subscribers,
                            handle: None,
                        },
                    );
                    (generation, subscriber, true)
                }
            }
        };

        if start_fetch {
            CacheStats::record(&inner.stats.fetches);
            debug!("Fetching {}@{}", key.source_id, key.size);
            let writer = Box::new(MemoryItemWriter {
                cache: Arc::downgrade(inner),
                key: key.clone(),
                generation,
                frames: Vec::new(),
                done: false,
            });
            // Outside the lock: fetch may complete synchronously
            let handle = fetch(size, writer);

            let orphan = {
                let mut state = inner.lock();
                match state.pending.get_mut(&key).filter(|p| p.generation == generation) {
                    Some(pending) => {
                        pending.handle = Some(handle);
                        None
                    }
                    None => Some(handle),
                }
            };
            // Completed (or cancelled) already: nothing left to cancel, release it
            drop(orphan);
        }

        let weak = Arc::downgrade(inner);
        ActionDisposable::boxed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.unsubscribe(&key, generation, subscriber);
            }
        })
    }

    fn get_first_frame_synchronously(&self, source_id: &str, size: PixelSize) -> Option<Arc<dyn CacheItem>> {
        self.inner
            .lookup(&key(source_id, size))
            .map(|item| item as Arc<dyn CacheItem>)
    }

    fn get_first_frame(
        &self,
        queue: &Arc<dyn TaskQueue>,
        source_id: &str,
        size: PixelSize,
        completion: FirstFrameCallback,
    ) -> Box<dyn Disposable> {
        let weak = Arc::downgrade(&self.inner);
        let key = key(source_id, size);
        queue.execute(Box::new(move || {
            let item = weak
                .upgrade()
                .and_then(|inner| inner.lookup(&key))
                .map(|item| item as Arc<dyn CacheItem>);
            completion(item);
        }));
        Box::new(EmptyDisposable)
    }
}

fn key(source_id: &str, size: PixelSize) -> CacheKey {
    CacheKey {
        source_id: source_id.to_string(),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::FrameGroup;
    use crate::test_support::InlineQueue;
    use std::sync::atomic::AtomicUsize;

    const SIZE: PixelSize = PixelSize::new(2, 2);

    fn solid(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, image::Rgba([value, value, value, 255]))
    }

    fn item(frames: &[(u8, f64)]) -> MemoryItem {
        MemoryItem::from_frames(frames.iter().map(|&(v, d)| (solid(v), d)).collect()).unwrap()
    }

    /// Fetch writing `n` frames synchronously; counts invocations
    fn sync_fetch(n: u8, calls: Arc<AtomicUsize>) -> FetchFn {
        Arc::new(move |_size: PixelSize, mut writer: Box<dyn ItemWriter>| {
            calls.fetch_add(1, Ordering::SeqCst);
            for i in 0..n {
                writer.add_frame(solid(i), 0.1);
            }
            writer.finish();
            Box::new(EmptyDisposable) as Box<dyn Disposable>
        })
    }

    /// Fetch parking its writer for the test to finish later
    fn parked_fetch(slot: Arc<Mutex<Vec<Box<dyn ItemWriter>>>>, cancelled: Arc<AtomicUsize>) -> FetchFn {
        Arc::new(move |_size: PixelSize, writer: Box<dyn ItemWriter>| {
            slot.lock().unwrap().push(writer);
            let cancelled = Arc::clone(&cancelled);
            ActionDisposable::boxed(move || {
                cancelled.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, ItemResultCallback) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&results);
        (results, Box::new(move |result: ItemResult| r.lock().unwrap().push(result.item.is_some())))
    }

    fn cache(capacity: usize) -> MemoryAnimationCache {
        MemoryAnimationCache::new(capacity, Arc::new(MemoryBudget::with_limit(usize::MAX)))
    }

    #[test]
    fn test_looping_get_frame() {
        let item = item(&[(0, 0.1), (1, 0.2), (2, 0.1)]);
        assert_eq!(item.frame_count(), 3);
        assert!((item.duration() - 0.4).abs() < 1e-9);

        let value_at = |t: f64| {
            let group = FrameGroup::decode(&item, t).unwrap();
            group.image.as_raw()[0]
        };
        assert_eq!(value_at(0.0), 0);
        assert_eq!(value_at(0.15), 1);
        assert_eq!(value_at(0.35), 2);
        // Wraps around
        assert_eq!(value_at(0.45), 0);
        assert_eq!(value_at(1.35), 1);
        assert!(item.get_frame(f64::NAN, RequestedFormat::Rgba).is_none());
    }

    #[test]
    fn test_empty_writer_is_absent() {
        assert!(MemoryItem::from_frames(Vec::new()).is_none());
    }

    #[test]
    fn test_miss_fetches_then_hit() {
        let cache = cache(8);
        let calls = Arc::new(AtomicUsize::new(0));

        let (results, cb) = recorder();
        cache.get("a", SIZE, sync_fetch(3, Arc::clone(&calls)), cb);
        assert_eq!(*results.lock().unwrap(), vec![true]);
        assert!(cache.contains("a", SIZE));

        let (results, cb) = recorder();
        cache.get("a", SIZE, sync_fetch(3, Arc::clone(&calls)), cb);
        assert_eq!(*results.lock().unwrap(), vec![true]);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hit_rate(), 0.5);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_pending_fetch_is_coalesced() {
        let cache = cache(8);
        let slot = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let (r1, cb1) = recorder();
        let (r2, cb2) = recorder();
        let _a = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::clone(&cancelled)), cb1);
        let _b = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::clone(&cancelled)), cb2);
        assert_eq!(slot.lock().unwrap().len(), 1);
        assert_eq!(cache.stats().fetches(), 1);

        let mut writer = slot.lock().unwrap().pop().unwrap();
        writer.add_frame(solid(9), 0.1);
        writer.finish();

        assert_eq!(*r1.lock().unwrap(), vec![true]);
        assert_eq!(*r2.lock().unwrap(), vec![true]);
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_last_unsubscribe_cancels_fetch() {
        let cache = cache(8);
        let slot = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicUsize::new(0));

        let (r1, cb1) = recorder();
        let (r2, cb2) = recorder();
        let a = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::clone(&cancelled)), cb1);
        let b = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::clone(&cancelled)), cb2);

        a.dispose();
        assert_eq!(cancelled.load(Ordering::SeqCst), 0);
        b.dispose();
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(cache.pending_count(), 0);

        // A late finish still populates the cache but notifies nobody
        let mut writer = slot.lock().unwrap().pop().unwrap();
        writer.add_frame(solid(1), 0.1);
        writer.finish();
        assert!(cache.contains("a", SIZE));
        assert!(r1.lock().unwrap().is_empty());
        assert!(r2.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_writer_reports_absent() {
        let cache = cache(8);
        let slot = Arc::new(Mutex::new(Vec::new()));
        let (results, cb) = recorder();
        let _a = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::new(AtomicUsize::new(0))), cb);

        slot.lock().unwrap().clear();
        assert_eq!(*results.lock().unwrap(), vec![false]);
        assert!(!cache.contains("a", SIZE));

        // Absent is not cached: next get fetches again
        let (_, cb) = recorder();
        let _b = cache.get("a", SIZE, parked_fetch(Arc::clone(&slot), Arc::new(AtomicUsize::new(0))), cb);
        assert_eq!(cache.stats().fetches(), 2);
    }

    #[test]
    fn test_size_is_part_of_key() {
        let cache = cache(8);
        cache.insert("a", SIZE, item(&[(1, 0.1)]));
        assert!(cache.contains("a", SIZE));
        assert!(!cache.contains("a", PixelSize::new(4, 4)));
    }

    #[test]
    fn test_lru_capacity_eviction() {
        let cache = cache(2);
        cache.insert("a", SIZE, item(&[(1, 0.1)]));
        cache.insert("b", SIZE, item(&[(1, 0.1)]));

        // Touch "a" so "b" is oldest
        let (_, cb) = recorder();
        cache.get("a", SIZE, sync_fetch(1, Arc::new(AtomicUsize::new(0))), cb);

        cache.insert("c", SIZE, item(&[(1, 0.1)]));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a", SIZE));
        assert!(!cache.contains("b", SIZE));
        assert!(cache.contains("c", SIZE));
        assert_eq!(cache.stats().evictions(), 1);
    }

    #[test]
    fn test_budget_eviction_keeps_newest() {
        // One 2x2 frame = 16 bytes; budget fits two
        let cache = MemoryAnimationCache::new(100, Arc::new(MemoryBudget::with_limit(32)));
        cache.insert("a", SIZE, item(&[(1, 0.1)]));
        cache.insert("b", SIZE, item(&[(1, 0.1)]));
        assert_eq!(cache.budget().mem().0, 32);

        cache.insert("c", SIZE, item(&[(1, 0.1)]));
        assert!(!cache.contains("a", SIZE));
        assert_eq!(cache.budget().mem().0, 32);

        // Oversized item alone stays resident
        cache.insert("big", SIZE, item(&[(1, 0.1), (2, 0.1), (3, 0.1)]));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("big", SIZE));
    }

    #[test]
    fn test_clear_frees_budget() {
        let cache = cache(8);
        cache.insert("a", SIZE, item(&[(1, 0.1), (2, 0.1)]));
        assert_eq!(cache.budget().mem().0, 32);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.budget().mem().0, 0);
    }

    #[test]
    fn test_first_frame_lookups_never_fetch() {
        let cache = cache(8);
        assert!(cache.get_first_frame_synchronously("a", SIZE).is_none());
        cache.insert("a", SIZE, item(&[(5, 0.1)]));
        let resident = cache.get_first_frame_synchronously("a", SIZE).unwrap();
        assert_eq!(FrameGroup::decode(&*resident, 0.0).unwrap().image.as_raw()[0], 5);

        let queue: Arc<dyn TaskQueue> = Arc::new(InlineQueue);
        let found = Arc::new(Mutex::new(Vec::new()));
        for id in ["a", "missing"] {
            let f = Arc::clone(&found);
            cache.get_first_frame(&queue, id, SIZE, Box::new(move |item| f.lock().unwrap().push(item.is_some())));
        }
        assert_eq!(*found.lock().unwrap(), vec![true, false]);
        assert_eq!(cache.stats().fetches(), 0);
        assert_eq!(cache.pending_count(), 0);
    }
}
