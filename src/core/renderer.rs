//! Public entry point: one renderer drives every animated item on screen
//!
//! **Architecture**: The renderer owns one [`PlaybackGroup`] (created lazily),
//! an optional running tick handle, and the frame skip chosen at construction.
//! Three execution contexts meet here:
//!
//! - UI thread: public calls, target observers, jobs from the [`MainQueue`](super::main_queue::MainQueue)
//! - decode queue: one job per tick decoding the whole batch serially
//! - first-frame queue: lookups for `load_first_frame`
//!
//! Every result crossing back (cache load, decode batch, target teardown) is
//! posted to the UI queue and checked against the context id it was issued
//! for, so completions for detached or recreated contexts are dropped.
//!
//! # Ticker Lifecycle
//!
//! The clock is scheduled the moment the group starts playing and dropped
//! the moment it stops: no per-frame callback runs while nothing animates.
//!
//! # Locking
//!
//! State sits behind one mutex. Calls into targets (frame pushes, placeholder
//! changes) and cache subscriptions being disposed always happen after the
//! lock is released, so views may call back into the renderer.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, trace};

use super::item_context::{
    AttachSlot, DecodeCompletion, DecodeTask, ItemKey, ItemPlaybackContext, PlaybackAdvance, PlaybackState, TargetUpdate,
};
use super::main_queue::{MainQueue, MainQueueHandle};
use super::playback_group::PlaybackGroup;
use super::ticker::{tick_interval, ThreadTickSource, TickHandle, TickSource};
use super::workers::SerialQueue;
use crate::config::RendererConfig;
use crate::entities::{
    ActionDisposable, AnimationCache, CacheItem, Disposable, EmptyDisposable, FetchFn, FrameGroup, ItemResult,
    ItemResultCallback, PixelSize, RenderTarget, TargetCallback, TaskQueue,
};

/// Injectable pieces of a renderer
pub struct RendererParts {
    pub frame_skip: u32,
    pub main: MainQueueHandle,
    pub decode_queue: Arc<dyn TaskQueue>,
    pub first_frame_queue: Arc<dyn TaskQueue>,
    pub tick_source: Arc<dyn TickSource>,
}

struct RendererState {
    group: Option<PlaybackGroup>,
    ticker: Option<Box<dyn TickHandle>>,
    is_playing: bool,
}

struct Shared {
    state: Mutex<RendererState>,
    frame_skip: u32,
    main: MainQueueHandle,
    decode_queue: Arc<dyn TaskQueue>,
    first_frame_queue: Arc<dyn TaskQueue>,
    tick_source: Arc<dyn TickSource>,
}

/// Shared playback engine for many concurrently visible animations.
///
/// All methods must be called on the UI thread (the thread draining the
/// `MainQueue` the renderer was built with).
///
/// # Example
/// ```ignore
/// let main = MainQueue::new();
/// let renderer = MultiAnimationRenderer::new(&RendererConfig::default(), &main);
/// let handle = renderer.add(&target, &cache, "sticker_42", PixelSize::new(100, 100), fetch);
/// target.set_should_be_animating(true);
/// loop {
///     main.run_next_timeout(Duration::from_millis(16));
/// }
/// ```
pub struct MultiAnimationRenderer {
    shared: Arc<Shared>,
}

impl MultiAnimationRenderer {
    /// Renderer with its own decode/first-frame threads and a timer-thread clock.
    pub fn new(config: &RendererConfig, main: &MainQueue) -> Self {
        let handle = main.handle();
        Self::with_parts(RendererParts {
            frame_skip: config.resolve_frame_skip(),
            main: handle.clone(),
            decode_queue: Arc::new(SerialQueue::new(&config.decode_queue_name)),
            first_frame_queue: Arc::new(SerialQueue::new(&config.first_frame_queue_name)),
            tick_source: Arc::new(ThreadTickSource::new(handle)),
        })
    }

    pub fn with_parts(parts: RendererParts) -> Self {
        let frame_skip = parts.frame_skip.max(1);
        info!("MultiAnimationRenderer created: frame_skip={}", frame_skip);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RendererState {
                    group: None,
                    ticker: None,
                    is_playing: false,
                }),
                frame_skip,
                main: parts.main,
                decode_queue: parts.decode_queue,
                first_frame_queue: parts.first_frame_queue,
                tick_source: parts.tick_source,
            }),
        }
    }

    /// Attach `target` to the animation `(item_id, size)`.
    ///
    /// The first attach for a key subscribes to `cache` with `fetch`; later
    /// attaches share that context. Disposing the returned handle detaches the
    /// target and releases the context once nothing else uses it. Disposing
    /// twice, or after the target is gone, does nothing.
    pub fn add(
        &self,
        target: &Arc<RenderTarget>,
        cache: &Arc<dyn AnimationCache>,
        item_id: &str,
        size: PixelSize,
        fetch: FetchFn,
    ) -> Box<dyn Disposable> {
        if target.is_torn_down() {
            debug!("add: target {} already torn down, ignoring", target.id());
            return Box::new(EmptyDisposable);
        }

        let key = ItemKey::new(item_id, size);
        let shared = &self.shared;

        let (context_id, slot, created, updates) = {
            let mut state = shared.lock_state();
            let group = state.group.get_or_insert_with(PlaybackGroup::new);
            let (context, created) = group.get_or_create(&key);
            let (slot, updates) = context.attach(target);
            let context_id = context.id();
            shared.refresh_playing_locked(&mut state);
            (context_id, slot, created, updates)
        };
        apply_updates(updates);

        if created {
            shared.subscribe(cache, &key, context_id, fetch);
        }

        let weak_shared = Arc::downgrade(shared);
        let deinit_main = shared.main.clone();
        let deinit_key = key.clone();
        let on_deinit: TargetCallback = Arc::new(move || {
            // May run on any thread: only schedule the detach
            let weak_shared = weak_shared.clone();
            let key = deinit_key.clone();
            deinit_main.post(move || {
                if let Some(shared) = weak_shared.upgrade() {
                    shared.detach(&key, context_id, slot);
                }
            });
        });

        let weak_shared = Arc::downgrade(shared);
        let state_key = key.clone();
        let on_state: TargetCallback = Arc::new(move || {
            if let Some(shared) = weak_shared.upgrade() {
                shared.target_state_changed(&state_key, context_id);
            }
        });

        let deinit_index = target.add_deinit_observer(on_deinit);
        let state_index = target.add_state_observer(on_state);
        if deinit_index.is_none() {
            // Torn down between the check above and now: undo right away
            shared.detach(&key, context_id, slot);
            return Box::new(EmptyDisposable);
        }

        let weak_shared = Arc::downgrade(shared);
        let weak_target = Arc::downgrade(target);
        ActionDisposable::boxed(move || {
            if let Some(target) = weak_target.upgrade() {
                if let Some(index) = deinit_index {
                    target.remove_deinit_observer(index);
                }
                if let Some(index) = state_index {
                    target.remove_state_observer(index);
                }
            }
            if let Some(shared) = weak_shared.upgrade() {
                shared.detach(&key, context_id, slot);
            }
        })
    }

    /// Show the first frame of an already resident item right now.
    ///
    /// Never triggers a fetch. Returns whether a frame was applied.
    pub fn load_first_frame_synchronously(
        &self,
        target: &Arc<RenderTarget>,
        cache: &Arc<dyn AnimationCache>,
        item_id: &str,
        size: PixelSize,
    ) -> bool {
        let Some(item) = cache.get_first_frame_synchronously(item_id, size) else {
            return false;
        };
        match FrameGroup::decode(&*item, 0.0) {
            Ok(frame) => {
                target.receive_frame(&frame.image);
                true
            }
            Err(e) => {
                debug!("First frame of {}@{} failed: {}", item_id, size, e);
                false
            }
        }
    }

    /// Look up and decode the first frame off the UI thread, then apply it.
    ///
    /// `completion` runs on the UI thread with whether a frame was applied,
    /// unless the returned handle was disposed first.
    pub fn load_first_frame<F>(
        &self,
        target: &Arc<RenderTarget>,
        cache: &Arc<dyn AnimationCache>,
        item_id: &str,
        size: PixelSize,
        completion: F,
    ) -> Box<dyn Disposable>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let cancelled = Arc::new(ActionDisposable::new(|| {}));
        let weak_target = Arc::downgrade(target);
        let main = self.shared.main.clone();
        let label = format!("{}@{}", item_id, size);
        let guard = Arc::clone(&cancelled);

        let lookup = cache.get_first_frame(
            &self.shared.first_frame_queue,
            item_id,
            size,
            Box::new(move |item: Option<Arc<dyn CacheItem>>| {
                // Decode here, on the first-frame queue
                let frame = item.map(|item| FrameGroup::decode(&*item, 0.0));
                main.post(move || {
                    if guard.is_disposed() {
                        trace!("First frame of {} cancelled", label);
                        return;
                    }
                    let target = weak_target.upgrade().filter(|t| !t.is_torn_down());
                    let applied = match (target, frame) {
                        (Some(target), Some(Ok(frame))) => {
                            target.receive_frame(&frame.image);
                            true
                        }
                        (_, Some(Err(e))) => {
                            debug!("First frame of {} failed: {}", label, e);
                            false
                        }
                        _ => false,
                    };
                    completion(applied);
                });
            }),
        );

        ActionDisposable::boxed(move || {
            cancelled.dispose();
            lookup.dispose();
        })
    }

    pub fn frame_skip(&self) -> u32 {
        self.shared.frame_skip
    }

    /// Whether any item is currently playing (and the clock running)
    pub fn is_playing(&self) -> bool {
        self.shared.lock_state().is_playing
    }

    pub fn ticker_active(&self) -> bool {
        self.shared.lock_state().ticker.is_some()
    }

    /// Number of live item contexts
    pub fn context_count(&self) -> usize {
        self.shared.lock_state().group.as_ref().map_or(0, PlaybackGroup::len)
    }

    pub fn attached_count(&self, item_id: &str, size: PixelSize) -> usize {
        self.with_context(item_id, size, |c| c.attached_count()).unwrap_or(0)
    }

    /// Playback timestamp (seconds) of an item, `None` if it has no context
    pub fn playback_timestamp(&self, item_id: &str, size: PixelSize) -> Option<f64> {
        self.with_context(item_id, size, |c| c.timestamp())
    }

    pub fn context_state(&self, item_id: &str, size: PixelSize) -> Option<PlaybackState> {
        self.with_context(item_id, size, |c| c.state())
    }

    /// Run one clock tick now, as if the display clock fired.
    pub fn tick(&self) {
        self.shared.animation_tick();
    }

    fn with_context<R>(
        &self,
        item_id: &str,
        size: PixelSize,
        f: impl FnOnce(&ItemPlaybackContext) -> R,
    ) -> Option<R> {
        let key = ItemKey::new(item_id, size);
        let state = self.shared.lock_state();
        state.group.as_ref().and_then(|g| g.get(&key)).map(f)
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RendererState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe a new context to the cache. Results hop to the UI thread.
    fn subscribe(self: &Arc<Self>, cache: &Arc<dyn AnimationCache>, key: &ItemKey, context_id: u64, fetch: FetchFn) {
        let weak_shared = Arc::downgrade(self);
        let main = self.main.clone();
        let result_key = key.clone();
        let on_result: ItemResultCallback = Box::new(move |result: ItemResult| {
            let weak_shared = weak_shared.clone();
            let key = result_key.clone();
            main.post(move || {
                if let Some(shared) = weak_shared.upgrade() {
                    shared.apply_item_result(&key, context_id, result);
                }
            });
        });

        // Outside the lock: the cache may run `fetch` synchronously
        let subscription = cache.get(&key.item_id, key.size, fetch, on_result);

        let orphan = {
            let mut state = self.lock_state();
            match state.group.as_mut().and_then(|g| g.get_current_mut(key, context_id)) {
                Some(context) => {
                    context.set_subscription(subscription);
                    None
                }
                None => Some(subscription),
            }
        };
        if let Some(subscription) = orphan {
            trace!("Context for {} gone before subscription stored", key);
            subscription.dispose();
        }
    }

    fn apply_item_result(self: &Arc<Self>, key: &ItemKey, context_id: u64, result: ItemResult) {
        let updates = {
            let mut state = self.lock_state();
            let Some(context) = state.group.as_mut().and_then(|g| g.get_current_mut(key, context_id)) else {
                trace!("Item result for released context {}, dropped", key);
                return;
            };
            let updates = context.apply_item_result(result.item);
            self.refresh_playing_locked(&mut state);
            updates
        };
        apply_updates(updates);
    }

    fn target_state_changed(self: &Arc<Self>, key: &ItemKey, context_id: u64) {
        let mut state = self.lock_state();
        let Some(context) = state.group.as_mut().and_then(|g| g.get_current_mut(key, context_id)) else {
            return;
        };
        if context.update_is_playing() {
            self.refresh_playing_locked(&mut state);
        }
    }

    fn detach(self: &Arc<Self>, key: &ItemKey, context_id: u64, slot: AttachSlot) {
        let removed = {
            let mut state = self.lock_state();
            let Some(group) = state.group.as_mut() else {
                return;
            };
            let Some(context) = group.get_current_mut(key, context_id) else {
                trace!("Detach for released context {}, ignored", key);
                return;
            };
            if !context.detach(slot) {
                return;
            }
            let removed = group.remove_if_empty(key);
            self.refresh_playing_locked(&mut state);
            removed
        };
        // Dropping the context disposes its cache subscription, lock released
        drop(removed);
    }

    /// Re-derive the aggregated flag and start/stop the clock on change.
    fn refresh_playing_locked(self: &Arc<Self>, state: &mut RendererState) {
        let is_playing = match state.group.as_mut() {
            Some(group) => {
                group.refresh_is_playing();
                group.is_playing()
            }
            None => false,
        };
        if is_playing == state.is_playing {
            return;
        }
        state.is_playing = is_playing;

        if is_playing {
            if state.ticker.is_none() {
                debug!("Renderer: starting clock (frame_skip={})", self.frame_skip);
                let weak_shared = Arc::downgrade(self);
                state.ticker = Some(self.tick_source.schedule(
                    tick_interval(self.frame_skip),
                    Arc::new(move || {
                        if let Some(shared) = weak_shared.upgrade() {
                            shared.animation_tick();
                        }
                    }),
                ));
            }
        } else if let Some(mut ticker) = state.ticker.take() {
            debug!("Renderer: stopping clock");
            ticker.invalidate();
        }
    }

    fn animation_tick(self: &Arc<Self>) {
        let advance = PlaybackAdvance::from_frame_skip(self.frame_skip);
        let (tasks, updates) = {
            let mut state = self.lock_state();
            match state.group.as_mut() {
                Some(group) if group.is_playing() => group.tick(advance),
                _ => (Vec::new(), Vec::new()),
            }
        };
        apply_updates(updates);

        if !tasks.is_empty() {
            self.dispatch_decode(tasks);
        }
    }

    /// Decode a tick's batch serially off the UI thread, apply in one hop.
    fn dispatch_decode(self: &Arc<Self>, tasks: Vec<DecodeTask>) {
        let weak_shared = Arc::downgrade(self);
        let main = self.main.clone();
        self.decode_queue.execute(Box::new(move || {
            let completions: Vec<DecodeCompletion> = tasks.into_iter().map(DecodeTask::run).collect();
            main.post(move || {
                if let Some(shared) = weak_shared.upgrade() {
                    shared.apply_decoded(completions);
                }
            });
        }));
    }

    fn apply_decoded(self: &Arc<Self>, completions: Vec<DecodeCompletion>) {
        let updates = {
            let mut state = self.lock_state();
            let Some(group) = state.group.as_mut() else {
                return;
            };
            let mut updates = Vec::new();
            for completion in completions {
                match group.get_current_mut(&completion.key, completion.context_id) {
                    Some(context) => updates.extend(context.apply_decoded(completion.result)),
                    None => trace!("Decoded frame for released context {}, dropped", completion.key),
                }
            }
            updates
        };
        apply_updates(updates);
    }
}

fn apply_updates(updates: Vec<TargetUpdate>) {
    for update in updates {
        update.apply();
    }
}
