//! Abstract traits for dependency inversion.
//!
//! The engine depends on these seams only: the animation cache that owns
//! storage and fetching, the items it hands out, and the task queues work is
//! pushed to. Implementations live in `core/` (or in the embedding app).

use std::sync::{Arc, Mutex};

use image::RgbaImage;

use super::frame::{AnimationFrame, PixelSize, RequestedFormat};

/// Cancellation handle.
///
/// `dispose()` may be called any number of times from any thread; only the
/// first call has an effect.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// Disposable running a closure exactly once
pub struct ActionDisposable {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ActionDisposable {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    pub fn boxed<F>(action: F) -> Box<dyn Disposable>
    where
        F: FnOnce() + Send + 'static,
    {
        Box::new(Self::new(action))
    }

    pub fn is_disposed(&self) -> bool {
        self.action.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        // Take under lock, run outside it: the action may dispose other handles
        let action = self.action.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(action) = action {
            action();
        }
    }
}

/// Disposable that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyDisposable;

impl Disposable for EmptyDisposable {
    fn dispose(&self) {}
}

impl<T: Disposable + ?Sized> Disposable for Box<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

impl<T: Disposable + ?Sized> Disposable for Arc<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
}

/// Boxed job for task queues
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Abstract task queue.
///
/// Lets the renderer push decode and first-frame work without knowing the
/// concrete thread (serial worker in production, inline/deferred in tests).
pub trait TaskQueue: Send + Sync {
    fn execute(&self, job: Job);
}

impl<T: TaskQueue + ?Sized> TaskQueue for Arc<T> {
    fn execute(&self, job: Job) {
        (**self).execute(job)
    }
}

/// Loaded animation held by the cache.
///
/// `get_frame` is synchronous and may be called from the decode thread.
pub trait CacheItem: Send + Sync {
    /// Decode one frame at `timestamp` seconds. `None` if out of range or
    /// the decode failed.
    fn get_frame(&self, timestamp: f64, format: RequestedFormat) -> Option<AnimationFrame>;
}

/// Result of `AnimationCache::get`
#[derive(Clone, Default)]
pub struct ItemResult {
    pub item: Option<Arc<dyn CacheItem>>,
}

impl ItemResult {
    pub fn present(item: Arc<dyn CacheItem>) -> Self {
        Self { item: Some(item) }
    }

    pub fn absent() -> Self {
        Self { item: None }
    }
}

impl std::fmt::Debug for ItemResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemResult")
            .field("present", &self.item.is_some())
            .finish()
    }
}

/// Sink the fetch callback fills when the cache has nothing for a key.
pub trait ItemWriter: Send {
    /// Append one frame shown for `duration` seconds
    fn add_frame(&mut self, image: RgbaImage, duration: f64);
    /// Commit written frames as the cached item
    fn finish(self: Box<Self>);
    /// Give up; subscribers receive an absent result
    fn fail(self: Box<Self>);
}

/// Populates the cache from the original source for a given size.
pub type FetchFn = Arc<dyn Fn(PixelSize, Box<dyn ItemWriter>) -> Box<dyn Disposable> + Send + Sync>;

/// Callback receiving item results, on whatever thread the cache completes on
pub type ItemResultCallback = Box<dyn Fn(ItemResult) + Send + Sync>;

/// Completion for first-frame lookups
pub type FirstFrameCallback = Box<dyn FnOnce(Option<Arc<dyn CacheItem>>) + Send>;

/// Animation cache boundary.
///
/// The renderer never looks inside the cache: it subscribes, reads resident
/// items and asks for first frames.
pub trait AnimationCache: Send + Sync {
    /// Subscribe to the item for `(source_id, size)`.
    ///
    /// May call `on_result` at most once with a present item; may call it with
    /// an absent result if the fetch fails; may never call it at all.
    fn get(&self, source_id: &str, size: PixelSize, fetch: FetchFn, on_result: ItemResultCallback) -> Box<dyn Disposable>;

    /// Best-effort lookup of an already resident item. Never triggers IO.
    fn get_first_frame_synchronously(&self, source_id: &str, size: PixelSize) -> Option<Arc<dyn CacheItem>>;

    /// Asynchronous lookup on `queue`; `completion` runs exactly once.
    fn get_first_frame(
        &self,
        queue: &Arc<dyn TaskQueue>,
        source_id: &str,
        size: PixelSize,
        completion: FirstFrameCallback,
    ) -> Box<dyn Disposable>;
}

impl<T: AnimationCache + ?Sized> AnimationCache for Arc<T> {
    fn get(&self, source_id: &str, size: PixelSize, fetch: FetchFn, on_result: ItemResultCallback) -> Box<dyn Disposable> {
        (**self).get(source_id, size, fetch, on_result)
    }

    fn get_first_frame_synchronously(&self, source_id: &str, size: PixelSize) -> Option<Arc<dyn CacheItem>> {
        (**self).get_first_frame_synchronously(source_id, size)
    }

    fn get_first_frame(
        &self,
        queue: &Arc<dyn TaskQueue>,
        source_id: &str,
        size: PixelSize,
        completion: FirstFrameCallback,
    ) -> Box<dyn Disposable> {
        (**self).get_first_frame(queue, source_id, size, completion)
    }
}
