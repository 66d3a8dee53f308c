//! Display-refresh clock abstraction
//!
//! The renderer asks a [`TickSource`] for a periodic callback when something
//! starts playing and drops the returned handle when nothing is. Two sources:
//!
//! - [`ThreadTickSource`]: timer thread posting ticks onto the UI queue.
//!   Ticks coalesce: while one tick is still waiting on the UI queue no new
//!   one is posted, like a display link that skips frames under load.
//! - [`ManualTickSource`]: the host drives ticks itself (its own vsync hook,
//!   or a test calling `fire()`).
//!
//! # Timing Model
//!
//! Interval = `frame_skip / 60` seconds. Callbacks always run on the UI thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{select, Sender};
use log::{debug, trace};

use super::main_queue::MainQueueHandle;

/// Nominal display refresh rate the playback clock is expressed in
pub const DISPLAY_REFRESH_HZ: u32 = 60;

/// Tick callback, invoked on the UI thread
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// Running periodic callback. Dropping it stops the ticks too.
pub trait TickHandle: Send {
    /// Stop delivering ticks. Idempotent.
    fn invalidate(&mut self);
}

/// Injectable periodic callback scheduler.
pub trait TickSource: Send + Sync {
    /// Start calling `on_tick` every `interval` until the handle is invalidated.
    fn schedule(&self, interval: Duration, on_tick: TickCallback) -> Box<dyn TickHandle>;
}

/// Interval of one playback step for a given frame skip
pub fn tick_interval(frame_skip: u32) -> Duration {
    Duration::from_secs_f64(frame_skip.max(1) as f64 / DISPLAY_REFRESH_HZ as f64)
}

// ============================================================================
// ThreadTickSource
// ============================================================================

/// Timer-thread clock delivering ticks through the UI queue.
pub struct ThreadTickSource {
    main: MainQueueHandle,
}

impl ThreadTickSource {
    pub fn new(main: MainQueueHandle) -> Self {
        Self { main }
    }
}

struct ThreadTickHandle {
    stop: Option<Sender<()>>,
    active: Arc<AtomicBool>,
}

impl TickHandle for ThreadTickHandle {
    fn invalidate(&mut self) {
        // Queued ticks check `active` before running
        self.active.store(false, Ordering::Release);
        // Disconnecting the stop channel wakes the timer thread
        self.stop = None;
    }
}

impl Drop for ThreadTickHandle {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl TickSource for ThreadTickSource {
    fn schedule(&self, interval: Duration, on_tick: TickCallback) -> Box<dyn TickHandle> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let active = Arc::new(AtomicBool::new(true));
        let pending = Arc::new(AtomicBool::new(false));

        let main = self.main.clone();
        let thread_active = Arc::clone(&active);

        let spawned = thread::Builder::new()
            .name("multianim-ticker".to_string())
            .spawn(move || {
                let ticks = crossbeam_channel::tick(interval);
                trace!("Ticker thread started ({:?})", interval);
                loop {
                    select! {
                        recv(ticks) -> _ => {
                            if !thread_active.load(Ordering::Acquire) {
                                break;
                            }
                            // Coalesce: skip if UI hasn't consumed the last tick
                            if pending.swap(true, Ordering::AcqRel) {
                                continue;
                            }
                            let on_tick = Arc::clone(&on_tick);
                            let pending = Arc::clone(&pending);
                            let active = Arc::clone(&thread_active);
                            main.post(move || {
                                pending.store(false, Ordering::Release);
                                if active.load(Ordering::Acquire) {
                                    on_tick();
                                }
                            });
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                trace!("Ticker thread stopped");
            });

        if let Err(e) = spawned {
            // No clock means nothing animates; not fatal
            debug!("Failed to spawn ticker thread: {}", e);
            active.store(false, Ordering::Release);
        }

        Box::new(ThreadTickHandle {
            stop: Some(stop_tx),
            active,
        })
    }
}

// ============================================================================
// ManualTickSource
// ============================================================================

#[derive(Default)]
struct ManualSlot {
    current: Option<(u64, Duration, TickCallback)>,
}

/// Host-driven clock: ticks happen when `fire()` is called.
#[derive(Clone, Default)]
pub struct ManualTickSource {
    slot: Arc<Mutex<ManualSlot>>,
    next_id: Arc<AtomicU64>,
    scheduled: Arc<AtomicU64>,
}

impl ManualTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one tick if a callback is scheduled. Call on the UI thread.
    pub fn fire(&self) -> bool {
        let callback = {
            let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
            slot.current.as_ref().map(|(_, _, cb)| Arc::clone(cb))
        };
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    /// Fire `n` ticks, returns how many were delivered
    pub fn fire_n(&self, n: usize) -> usize {
        (0..n).filter(|_| self.fire()).count()
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).current.is_some()
    }

    /// Interval requested by the current schedule
    pub fn interval(&self) -> Option<Duration> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.current.as_ref().map(|(_, interval, _)| *interval)
    }

    /// Total number of `schedule()` calls so far
    pub fn schedule_count(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }
}

struct ManualTickHandle {
    id: u64,
    slot: Arc<Mutex<ManualSlot>>,
}

impl TickHandle for ManualTickHandle {
    fn invalidate(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        // A newer schedule may already own the slot
        if slot.current.as_ref().is_some_and(|(id, _, _)| *id == self.id) {
            slot.current = None;
        }
    }
}

impl Drop for ManualTickHandle {
    fn drop(&mut self) {
        self.invalidate();
    }
}

impl TickSource for ManualTickSource {
    fn schedule(&self, interval: Duration, on_tick: TickCallback) -> Box<dyn TickHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.scheduled.fetch_add(1, Ordering::Relaxed);
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).current = Some((id, interval, on_tick));
        Box::new(ManualTickHandle {
            id,
            slot: Arc::clone(&self.slot),
        })
    }
}
