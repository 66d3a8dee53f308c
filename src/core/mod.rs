//! Core engine modules - queues, clock, playback state, caches
//!
//! These modules form the playback engine, independent of any UI toolkit.

pub mod cache_man;
pub mod item_context;
pub mod main_queue;
pub mod memory_cache;
pub mod playback_group;
pub mod renderer;
pub mod ticker;
pub mod workers;

// Re-exports for convenience
pub use cache_man::MemoryBudget;
pub use item_context::{ItemKey, ItemPlaybackContext, PlaybackState};
pub use main_queue::{MainQueue, MainQueueHandle};
pub use memory_cache::{CacheStats, MemoryAnimationCache, MemoryItem};
pub use playback_group::PlaybackGroup;
pub use renderer::{MultiAnimationRenderer, RendererParts};
pub use ticker::{ManualTickSource, ThreadTickSource, TickHandle, TickSource};
pub use workers::SerialQueue;
