//! multianim - shared playback engine for many on-screen animations
//!
//! One renderer decodes each `(item, size)` once per tick and fans the frame
//! out to every view showing it. Re-exports the public API for the demo binary.

// Core engine (queues, clock, playback state, caches)
pub mod core;

pub mod cli;
pub mod config;
pub mod entities;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types from core
pub use core::main_queue::{MainQueue, MainQueueHandle};
pub use core::memory_cache::MemoryAnimationCache;
pub use core::renderer::MultiAnimationRenderer;

pub use config::{CacheConfig, ConfigError, FrameSkipPolicy, RendererConfig};
pub use entities::{AnimationCache, Disposable, PixelSize, RenderTarget, TargetIdSequence, TargetView};
