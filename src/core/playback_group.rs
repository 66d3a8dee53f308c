//! Set of item contexts owned by one renderer
//!
//! Keys are unique: at most one live context per `(item_id, size)`. A context
//! that is removed and later recreated for the same key gets a fresh id, so
//! late completions addressed to the old one can be told apart
//! (`get_current_mut`).

use std::collections::HashMap;

use log::{debug, trace};

use super::item_context::{DecodeTask, ItemKey, ItemPlaybackContext, PlaybackAdvance, TargetUpdate};

/// Item contexts plus the aggregated "anything playing" flag.
pub struct PlaybackGroup {
    contexts: HashMap<ItemKey, ItemPlaybackContext>,
    next_context_id: u64,
    is_playing: bool,
}

impl Default for PlaybackGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGroup {
    pub fn new() -> Self {
        Self {
            contexts: HashMap::new(),
            next_context_id: 1,
            is_playing: false,
        }
    }

    /// Existing context for `key`, or a new one. Second value: newly created.
    pub fn get_or_create(&mut self, key: &ItemKey) -> (&mut ItemPlaybackContext, bool) {
        let next_id = &mut self.next_context_id;
        let mut created = false;
        let context = self.contexts.entry(key.clone()).or_insert_with(|| {
            created = true;
            let id = *next_id;
            *next_id += 1;
            ItemPlaybackContext::new(id, key.clone())
        });
        (context, created)
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ItemPlaybackContext> {
        self.contexts.get(key)
    }

    /// Context for `key` only if it is still the one with `context_id`.
    pub fn get_current_mut(&mut self, key: &ItemKey, context_id: u64) -> Option<&mut ItemPlaybackContext> {
        match self.contexts.get_mut(key) {
            Some(context) if context.id() == context_id => Some(context),
            Some(_) => {
                trace!("PlaybackGroup: context for {} replaced, dropping stale call", key);
                None
            }
            None => None,
        }
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Remove the context for `key` if no target is attached any more.
    ///
    /// The caller drops the returned context outside its lock; dropping
    /// disposes the cache subscription.
    pub fn remove_if_empty(&mut self, key: &ItemKey) -> Option<ItemPlaybackContext> {
        if self.contexts.get(key).is_some_and(|c| c.is_empty()) {
            debug!("PlaybackGroup: removing unused context {}", key);
            return self.contexts.remove(key);
        }
        None
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Recompute the aggregated flag. Returns true if it changed.
    pub fn refresh_is_playing(&mut self) -> bool {
        let is_playing = self.contexts.values().any(|c| c.is_playing());
        let changed = is_playing != self.is_playing;
        self.is_playing = is_playing;
        changed
    }

    /// Advance every playing context; collect decode work without running it.
    pub fn tick(&mut self, advance: PlaybackAdvance) -> (Vec<DecodeTask>, Vec<TargetUpdate>) {
        let mut tasks = Vec::new();
        let mut updates = Vec::new();
        for context in self.contexts.values_mut().filter(|c| c.is_playing()) {
            let outcome = context.tick(advance);
            tasks.extend(outcome.task);
            updates.extend(outcome.updates);
        }
        if !tasks.is_empty() {
            trace!("PlaybackGroup tick: {} decode tasks", tasks.len());
        }
        (tasks, updates)
    }
}
