//! Playback state for one animated item shared by all of its targets
//!
//! **Why**: Twenty copies of the same emoji on screen should cost one decode
//! per tick, not twenty. One context per `(item_id, size)` owns the decoded
//! frame and fans it out to every attached target.
//!
//! **Used by**: PlaybackGroup (ownership, tick fan-out), renderer (attach/detach)
//!
//! # State Machine
//!
//! ```text
//! Unloaded --item--> LoadedIdle <--is_playing--> LoadedPlaying
//!    |                                  tick |   ^ decode completion
//!    +--absent--> Absent                     v   |
//!                                        LoadingFrame
//! ```
//!
//! `is_playing` holds iff an item is loaded and at least one live attached
//! target has `should_be_animating`.
//!
//! # Threading
//!
//! Plain data, mutated on the UI thread only. Methods never call into targets
//! directly: they return [`TargetUpdate`]s that the renderer applies after
//! releasing its lock, and [`DecodeTask`]s that run on the decode queue.

use std::sync::{Arc, Weak};

use image::RgbaImage;
use indexmap::IndexMap;
use log::{debug, trace, warn};

use crate::core::ticker::DISPLAY_REFRESH_HZ;
use crate::entities::{CacheItem, DecodeError, Disposable, FrameGroup, PixelSize, RenderTarget};

/// Identity of an animated item within a playback group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub item_id: String,
    pub size: PixelSize,
}

impl ItemKey {
    pub fn new(item_id: &str, size: PixelSize) -> Self {
        Self {
            item_id: item_id.to_string(),
            size,
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.item_id, self.size)
    }
}

/// Playback time step, counted in display refresh periods.
///
/// Timestamps are `steps / 60` so repeated advances stay exact:
/// 120 ticks at frame skip 1 are exactly 2.0 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackAdvance {
    steps: u32,
}

impl PlaybackAdvance {
    pub fn from_frame_skip(frame_skip: u32) -> Self {
        Self { steps: frame_skip.max(1) }
    }

    pub fn seconds(&self) -> f64 {
        self.steps as f64 / DISPLAY_REFRESH_HZ as f64
    }
}

/// Arena slot of an attached target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachSlot(u64);

/// Observable state (for introspection and tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unloaded,
    Absent,
    LoadedIdle,
    LoadedPlaying,
    LoadingFrame,
}

enum LoadState {
    Unloaded,
    Absent,
    Loaded(Arc<dyn CacheItem>),
}

/// Deferred call into a target, applied on the UI thread outside any lock.
pub enum TargetUpdate {
    Frame(Arc<RenderTarget>, Arc<RgbaImage>),
    Placeholder(Arc<RenderTarget>, bool),
}

impl TargetUpdate {
    pub fn apply(self) {
        match self {
            TargetUpdate::Frame(target, image) => target.receive_frame(&image),
            TargetUpdate::Placeholder(target, show) => target.receive_placeholder_state(show),
        }
    }
}

/// One frame decode to run off the UI thread
pub struct DecodeTask {
    pub key: ItemKey,
    pub context_id: u64,
    pub timestamp: f64,
    item: Arc<dyn CacheItem>,
}

impl DecodeTask {
    /// Decode on the current thread (the decode queue).
    ///
    /// A panicking cache item becomes a decode error so the queue thread
    /// survives and the context's in-flight flag is cleared.
    pub fn run(self) -> DecodeCompletion {
        let item = &*self.item;
        let timestamp = self.timestamp;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| FrameGroup::decode(item, timestamp)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!("Decode of {} panicked: {}", self.key, message);
                Err(DecodeError::ItemPanicked(message))
            });
        DecodeCompletion {
            key: self.key,
            context_id: self.context_id,
            result,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result of a [`DecodeTask`], applied back on the UI thread
pub struct DecodeCompletion {
    pub key: ItemKey,
    pub context_id: u64,
    pub result: Result<FrameGroup, DecodeError>,
}

/// What a tick produced for one context
#[derive(Default)]
pub struct TickOutcome {
    pub task: Option<DecodeTask>,
    pub updates: Vec<TargetUpdate>,
}

/// Decode/playback state of one `(item_id, size)`.
pub struct ItemPlaybackContext {
    id: u64,
    key: ItemKey,
    elapsed_steps: u64,
    load: LoadState,
    current_frame: Option<FrameGroup>,
    is_loading_frame: bool,
    targets: IndexMap<u64, Weak<RenderTarget>>,
    next_slot: u64,
    is_playing: bool,
    subscription: Option<Box<dyn Disposable>>,
}

impl ItemPlaybackContext {
    /// `id` must be unique among contexts that can ever share `key`.
    pub fn new(id: u64, key: ItemKey) -> Self {
        debug!("ItemPlaybackContext {} created for {}", id, key);
        Self {
            id,
            key,
            elapsed_steps: 0,
            load: LoadState::Unloaded,
            current_frame: None,
            is_loading_frame: false,
            targets: IndexMap::new(),
            next_slot: 0,
            is_playing: false,
            subscription: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current playback timestamp in seconds
    pub fn timestamp(&self) -> f64 {
        self.elapsed_steps as f64 / DISPLAY_REFRESH_HZ as f64
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_loading_frame(&self) -> bool {
        self.is_loading_frame
    }

    pub fn current_frame(&self) -> Option<&FrameGroup> {
        self.current_frame.as_ref()
    }

    pub fn state(&self) -> PlaybackState {
        match self.load {
            LoadState::Unloaded => PlaybackState::Unloaded,
            LoadState::Absent => PlaybackState::Absent,
            LoadState::Loaded(_) if self.is_loading_frame => PlaybackState::LoadingFrame,
            LoadState::Loaded(_) if self.is_playing => PlaybackState::LoadedPlaying,
            LoadState::Loaded(_) => PlaybackState::LoadedIdle,
        }
    }

    /// Number of attached slots (including targets already dropped but not yet detached)
    pub fn attached_count(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Keep the cache subscription alive for as long as the context lives
    pub fn set_subscription(&mut self, subscription: Box<dyn Disposable>) {
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.dispose();
        }
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription.is_some()
    }

    /// Register target. A cached frame is pushed to it right away.
    pub fn attach(&mut self, target: &Arc<RenderTarget>) -> (AttachSlot, Vec<TargetUpdate>) {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.targets.insert(slot, Arc::downgrade(target));

        let mut updates = Vec::new();
        if let Some(frame) = &self.current_frame {
            updates.push(TargetUpdate::Frame(Arc::clone(target), Arc::clone(&frame.image)));
        } else if matches!(self.load, LoadState::Absent) {
            updates.push(TargetUpdate::Placeholder(Arc::clone(target), true));
        }

        trace!("Context {}: attached target {} (slot {})", self.key, target.id(), slot);
        self.update_is_playing();
        (AttachSlot(slot), updates)
    }

    /// Remove target slot. Returns false if the slot was not attached.
    pub fn detach(&mut self, slot: AttachSlot) -> bool {
        let removed = self.targets.shift_remove(&slot.0).is_some();
        if removed {
            trace!("Context {}: detached slot {}, {} left", self.key, slot.0, self.targets.len());
            self.update_is_playing();
        }
        removed
    }

    /// Recompute `is_playing`. Returns true if it changed.
    pub fn update_is_playing(&mut self) -> bool {
        let loaded = matches!(self.load, LoadState::Loaded(_));
        let wanted = self.live_targets().any(|t| t.should_be_animating());
        let is_playing = loaded && wanted;

        let changed = is_playing != self.is_playing;
        if changed {
            trace!("Context {}: is_playing -> {}", self.key, is_playing);
        }
        self.is_playing = is_playing;
        changed
    }

    /// Cache load finished (possibly with nothing).
    pub fn apply_item_result(&mut self, item: Option<Arc<dyn CacheItem>>) -> Vec<TargetUpdate> {
        let mut updates = Vec::new();
        match item {
            Some(item) => {
                debug!("Context {}: item loaded", self.key);
                self.load = LoadState::Loaded(item);
            }
            None => {
                debug!("Context {}: item absent, showing placeholders", self.key);
                self.load = LoadState::Absent;
                updates.extend(self.live_targets().map(|t| TargetUpdate::Placeholder(t, true)));
            }
        }
        self.update_is_playing();
        updates
    }

    /// Advance playback and decide whether a new frame must be decoded.
    ///
    /// The frame is decoded for the timestamp before the advance. At most one
    /// decode is in flight; ticks during a decode only move the clock.
    pub fn tick(&mut self, advance: PlaybackAdvance) -> TickOutcome {
        let LoadState::Loaded(item) = &self.load else {
            return TickOutcome::default();
        };
        let item = Arc::clone(item);

        let timestamp = self.timestamp();
        self.elapsed_steps += advance.steps as u64;
        let now = self.timestamp();

        let up_to_date = self.current_frame.as_ref().is_some_and(|f| f.timestamp == now);
        if !up_to_date && !self.is_loading_frame {
            self.is_loading_frame = true;
            trace!("Context {}: decode dispatched for t={:.3}", self.key, timestamp);
            return TickOutcome {
                task: Some(DecodeTask {
                    key: self.key.clone(),
                    context_id: self.id,
                    timestamp,
                    item,
                }),
                updates: Vec::new(),
            };
        }

        let mut updates = Vec::new();
        if self.current_frame.is_some() {
            updates.extend(self.live_targets().map(|t| TargetUpdate::Placeholder(t, false)));
        }
        TickOutcome { task: None, updates }
    }

    /// Decode finished. On failure the previous frame stays displayed.
    pub fn apply_decoded(&mut self, result: Result<FrameGroup, DecodeError>) -> Vec<TargetUpdate> {
        self.is_loading_frame = false;
        match result {
            Ok(frame) => {
                let image = Arc::clone(&frame.image);
                self.current_frame = Some(frame);
                self.live_targets()
                    .map(|t| TargetUpdate::Frame(t, Arc::clone(&image)))
                    .collect()
            }
            Err(e) => {
                debug!("Context {}: frame decode failed: {}", self.key, e);
                Vec::new()
            }
        }
    }

    fn live_targets(&self) -> impl Iterator<Item = Arc<RenderTarget>> + '_ {
        self.targets.values().filter_map(Weak::upgrade)
    }
}

impl Drop for ItemPlaybackContext {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.dispose();
        }
        debug!("ItemPlaybackContext {} released for {}", self.id, self.key);
    }
}
