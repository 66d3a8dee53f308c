//! Test doubles shared by unit tests across modules

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;

use crate::core::main_queue::MainQueue;
use crate::core::renderer::{MultiAnimationRenderer, RendererParts};
use crate::core::ticker::ManualTickSource;
use crate::entities::{
    ActionDisposable, AnimationCache, AnimationFrame, CacheItem, Disposable, EmptyDisposable, FetchFn,
    FirstFrameCallback, FrameFormat, ItemResult, ItemResultCallback, ItemWriter, Job, PixelSize, RenderTarget, RequestedFormat,
    TargetIdSequence, TargetView, TaskQueue,
};

/// View recording everything pushed to it
#[derive(Default)]
pub struct RecordingView {
    frames: Mutex<Vec<Arc<RgbaImage>>>,
    placeholders: Mutex<Vec<bool>>,
    on_frame: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hook run after every received frame
    pub fn on_frame<F: Fn() + Send + Sync + 'static>(&self, f: F) {
        *self.on_frame.lock().unwrap() = Some(Arc::new(f));
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn last_frame(&self) -> Option<Arc<RgbaImage>> {
        self.frames.lock().unwrap().last().cloned()
    }

    pub fn placeholder_states(&self) -> Vec<bool> {
        self.placeholders.lock().unwrap().clone()
    }
}

impl TargetView for RecordingView {
    fn receive_frame(&self, image: &Arc<RgbaImage>) {
        self.frames.lock().unwrap().push(Arc::clone(image));
        let hook = self.on_frame.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn receive_placeholder_state(&self, show_placeholder: bool) {
        self.placeholders.lock().unwrap().push(show_placeholder);
    }
}

/// Cache item producing solid frames; frame index encoded in the pixel value
pub struct StubItem {
    frames: usize,
    width: u32,
    height: u32,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StubItem {
    pub const FPS: f64 = 30.0;

    pub fn new(frames: usize, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            frames: frames.max(1),
            width,
            height,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `get_frame` calls so far
    pub fn frame_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CacheItem for StubItem {
    fn get_frame(&self, timestamp: f64, _format: RequestedFormat) -> Option<AnimationFrame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return None;
        }
        let index = (timestamp * Self::FPS).floor() as usize % self.frames;
        let bytes_per_row = self.width as usize * 4;
        Some(AnimationFrame {
            format: FrameFormat::Rgba {
                data: Arc::new(vec![index as u8; bytes_per_row * self.height as usize]),
                width: self.width,
                height: self.height,
                bytes_per_row,
            },
            duration: 1.0 / Self::FPS,
        })
    }
}

#[derive(Default)]
struct ScriptedState {
    subscribers: HashMap<String, Vec<Arc<dyn Fn(ItemResult) + Send + Sync>>>,
    disposed: HashMap<String, usize>,
    resident: HashMap<String, Arc<dyn CacheItem>>,
}

/// Cache whose load results are delivered by the test
#[derive(Default)]
pub struct ScriptedCache {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver `item` to every subscriber of `source_id` so far
    pub fn resolve(&self, source_id: &str, item: Option<Arc<dyn CacheItem>>) {
        let subscribers = self.state.lock().unwrap().subscribers.get(source_id).cloned().unwrap_or_default();
        for callback in subscribers {
            callback(ItemResult { item: item.clone() });
        }
    }

    /// Deliver `item` to the `n`th subscription of `source_id` only
    pub fn resolve_nth(&self, source_id: &str, n: usize, item: Option<Arc<dyn CacheItem>>) {
        let callback = self.state.lock().unwrap().subscribers.get(source_id).and_then(|s| s.get(n).cloned());
        if let Some(callback) = callback {
            callback(ItemResult { item });
        }
    }

    pub fn make_resident(&self, source_id: &str, item: Arc<dyn CacheItem>) {
        self.state.lock().unwrap().resident.insert(source_id.to_string(), item);
    }

    /// Number of `get()` subscriptions made for `source_id`
    pub fn get_count(&self, source_id: &str) -> usize {
        self.state.lock().unwrap().subscribers.get(source_id).map_or(0, Vec::len)
    }

    pub fn disposed_count(&self, source_id: &str) -> usize {
        self.state.lock().unwrap().disposed.get(source_id).copied().unwrap_or(0)
    }
}

impl AnimationCache for ScriptedCache {
    fn get(&self, source_id: &str, _size: PixelSize, _fetch: FetchFn, on_result: ItemResultCallback) -> Box<dyn Disposable> {
        self.state
            .lock()
            .unwrap()
            .subscribers
            .entry(source_id.to_string())
            .or_default()
            .push(Arc::from(on_result));

        let state = Arc::clone(&self.state);
        let id = source_id.to_string();
        ActionDisposable::boxed(move || {
            *state.lock().unwrap().disposed.entry(id).or_default() += 1;
        })
    }

    fn get_first_frame_synchronously(&self, source_id: &str, _size: PixelSize) -> Option<Arc<dyn CacheItem>> {
        self.state.lock().unwrap().resident.get(source_id).cloned()
    }

    fn get_first_frame(
        &self,
        queue: &Arc<dyn TaskQueue>,
        source_id: &str,
        _size: PixelSize,
        completion: FirstFrameCallback,
    ) -> Box<dyn Disposable> {
        let state = Arc::clone(&self.state);
        let id = source_id.to_string();
        queue.execute(Box::new(move || {
            let item = state.lock().unwrap().resident.get(&id).cloned();
            completion(item);
        }));
        Box::new(EmptyDisposable)
    }
}

/// Runs jobs on the calling thread immediately
pub struct InlineQueue;

impl TaskQueue for InlineQueue {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Holds jobs until the test runs them
#[derive(Default)]
pub struct DeferredQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl DeferredQueue {
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Run queued jobs (including ones queued meanwhile); returns count
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        loop {
            let job = self.jobs.lock().unwrap().pop_front();
            match job {
                Some(job) => {
                    job();
                    count += 1;
                }
                None => return count,
            }
        }
    }
}

impl TaskQueue for DeferredQueue {
    fn execute(&self, job: Job) {
        self.jobs.lock().unwrap().push_back(job);
    }
}

/// Fetch that never writes anything
pub fn noop_fetch() -> FetchFn {
    Arc::new(|_size: PixelSize, _writer: Box<dyn ItemWriter>| Box::new(EmptyDisposable) as Box<dyn Disposable>)
}

/// Renderer wired to a manual clock, a deferred decode queue and a scripted cache
pub struct Harness {
    pub renderer: MultiAnimationRenderer,
    pub main: MainQueue,
    pub cache: Arc<ScriptedCache>,
    pub ticks: ManualTickSource,
    pub decode: Arc<DeferredQueue>,
    ids: TargetIdSequence,
}

impl Harness {
    pub fn new(frame_skip: u32) -> Self {
        let main = MainQueue::new();
        let ticks = ManualTickSource::new();
        let decode = Arc::new(DeferredQueue::default());
        let renderer = MultiAnimationRenderer::with_parts(RendererParts {
            frame_skip,
            main: main.handle(),
            decode_queue: decode.clone(),
            first_frame_queue: Arc::new(InlineQueue),
            tick_source: Arc::new(ticks.clone()),
        });
        Self {
            renderer,
            main,
            cache: ScriptedCache::new(),
            ticks,
            decode,
            ids: TargetIdSequence::new(),
        }
    }

    pub fn cache_dyn(&self) -> Arc<dyn AnimationCache> {
        self.cache.clone()
    }

    pub fn target(&self, animating: bool) -> (Arc<RenderTarget>, Arc<RecordingView>) {
        let view = RecordingView::new();
        let target = RenderTarget::new(&self.ids, view.clone());
        target.set_should_be_animating(animating);
        (target, view)
    }

    pub fn add(&self, target: &Arc<RenderTarget>, item_id: &str, size: PixelSize) -> Box<dyn Disposable> {
        self.renderer.add(target, &self.cache_dyn(), item_id, size, noop_fetch())
    }

    /// Run decode jobs and UI jobs until both queues are empty
    pub fn settle(&self) {
        loop {
            let ran = self.decode.run_all() + self.main.run_pending();
            if ran == 0 {
                return;
            }
        }
    }
}
