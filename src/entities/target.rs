//! On-screen instance of an animated item
//!
//! **Architecture**: The view owns its `Arc<RenderTarget>`; playback contexts
//! only keep `Weak` references, so a target's lifetime never depends on the
//! renderer. Observers are kept in explicit [`Bag`]s and the target fires its
//! deinit observers exactly once at teardown, whether teardown is explicit
//! (`teardown()`) or happens on drop.
//!
//! **Threading**: `set_should_be_animating()` invokes state observers
//! synchronously on the calling thread, which must be the UI thread.
//! Deinit observers may fire on any thread (last `Arc` dropped anywhere), so
//! the renderer's deinit observer only posts work to the UI queue.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use image::RgbaImage;
use log::trace;

use super::bag::{Bag, BagIndex};

/// Observer callback stored in a target's bags
pub type TargetCallback = Arc<dyn Fn() + Send + Sync>;

/// Inbound callbacks a view implements to display what the engine produces.
pub trait TargetView: Send + Sync {
    /// Show a newly decoded frame. Called on the UI thread only.
    fn receive_frame(&self, image: &Arc<RgbaImage>);

    /// Show or hide the placeholder visual. Called on the UI thread only.
    fn receive_placeholder_state(&self, show_placeholder: bool);
}

/// Sequence of render target ids, injected where targets are created.
///
/// Ids start at 1 and increase monotonically for the lifetime of the sequence.
#[derive(Debug)]
pub struct TargetIdSequence {
    next: AtomicI64,
}

impl Default for TargetIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetIdSequence {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Observers {
    on_deinit: Bag<TargetCallback>,
    on_state: Bag<TargetCallback>,
}

/// Drawable surface handle for one on-screen animated item.
pub struct RenderTarget {
    id: i64,
    should_be_animating: AtomicBool,
    torn_down: AtomicBool,
    observers: Mutex<Observers>,
    view: Arc<dyn TargetView>,
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id)
            .field("should_be_animating", &self.should_be_animating())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

impl RenderTarget {
    /// Create target drawing into `view`, taking its id from `ids`.
    pub fn new(ids: &TargetIdSequence, view: Arc<dyn TargetView>) -> Arc<Self> {
        Arc::new(Self {
            id: ids.next_id(),
            should_be_animating: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            observers: Mutex::new(Observers::default()),
            view,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn should_be_animating(&self) -> bool {
        self.should_be_animating.load(Ordering::Acquire)
    }

    /// Toggle animation wish (visibility). Notifies state observers on change.
    pub fn set_should_be_animating(&self, value: bool) {
        let previous = self.should_be_animating.swap(value, Ordering::AcqRel);
        if previous == value {
            return;
        }
        trace!("RenderTarget {}: should_be_animating {} -> {}", self.id, previous, value);

        let callbacks = self.lock_observers().on_state.copy_items();
        for callback in callbacks {
            callback();
        }
    }

    pub fn receive_frame(&self, image: &Arc<RgbaImage>) {
        self.view.receive_frame(image);
    }

    pub fn receive_placeholder_state(&self, show_placeholder: bool) {
        self.view.receive_placeholder_state(show_placeholder);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Register deinit observer. Returns `None` once teardown has begun.
    pub fn add_deinit_observer(&self, callback: TargetCallback) -> Option<BagIndex> {
        let mut observers = self.lock_observers();
        // Checked under the lock: teardown drains under the same lock
        if self.is_torn_down() {
            return None;
        }
        Some(observers.on_deinit.add(callback))
    }

    /// Register state-change observer. Returns `None` once teardown has begun.
    pub fn add_state_observer(&self, callback: TargetCallback) -> Option<BagIndex> {
        let mut observers = self.lock_observers();
        if self.is_torn_down() {
            return None;
        }
        Some(observers.on_state.add(callback))
    }

    pub fn remove_deinit_observer(&self, index: BagIndex) {
        self.lock_observers().on_deinit.remove(index);
    }

    pub fn remove_state_observer(&self, index: BagIndex) {
        self.lock_observers().on_state.remove(index);
    }

    /// Number of registered (deinit, state) observers
    pub fn observer_counts(&self) -> (usize, usize) {
        let observers = self.lock_observers();
        (observers.on_deinit.len(), observers.on_state.len())
    }

    /// Fire every deinit observer once and clear both registries.
    ///
    /// Idempotent; also runs on drop if never called explicitly.
    pub fn teardown(&self) {
        let deinit = {
            let mut observers = self.lock_observers();
            if self.torn_down.swap(true, Ordering::AcqRel) {
                return;
            }
            observers.on_state.clear();
            observers.on_deinit.drain()
        };

        trace!("RenderTarget {}: teardown, {} deinit observers", self.id, deinit.len());
        for callback in deinit {
            callback();
        }
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.teardown();
    }
}
