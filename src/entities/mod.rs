//! Entities - value types and seams shared by the engine
//!
//! Frames, render targets and the cache/queue traits the core is written
//! against. Nothing here owns threads or playback state.

pub mod bag;
pub mod frame;
pub mod target;
pub mod traits;

pub use bag::{Bag, BagIndex};
pub use frame::{AnimationFrame, DecodeError, FrameFormat, FrameGroup, PixelSize, RequestedFormat};
pub use target::{RenderTarget, TargetCallback, TargetIdSequence, TargetView};
pub use traits::{
    ActionDisposable, AnimationCache, CacheItem, Disposable, EmptyDisposable, FetchFn, FirstFrameCallback,
    ItemResult, ItemResultCallback, ItemWriter, Job, TaskQueue,
};
