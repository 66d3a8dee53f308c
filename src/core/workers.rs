//! Serial background queue for frame decoding and first-frame lookups
//!
//! One named thread per queue, jobs run strictly one at a time in submission
//! order. Decoding is CPU and memory bound per frame; a single consumer keeps
//! decodes from contending with each other at the cost of dropped frames
//! under load.
//!
//! Shutdown: dropping the queue closes the channel, the thread finishes the
//! jobs already queued and exits. Drop waits a bounded time for that.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use log::trace;

use crate::entities::{Job, TaskQueue};

/// Serial worker thread fed through a channel.
///
/// # Example
/// ```ignore
/// let queue = SerialQueue::new("multianim-decode");
/// queue.execute(Box::new(move || {
///     // runs on the decode thread
/// }));
/// ```
pub struct SerialQueue {
    name: String,
    tx: Option<Sender<Job>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SerialQueue {
    /// Spawn the worker thread.
    pub fn new(name: &str) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                trace!("{} started", thread_name);
                // Ends when every sender is dropped and the backlog is drained
                for job in rx.iter() {
                    job();
                }
                trace!("{} stopped", thread_name);
            })
            .expect("Failed to spawn serial queue thread");

        trace!("SerialQueue '{}' initialized", name);

        Self {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskQueue for SerialQueue {
    fn execute(&self, job: Job) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                trace!("SerialQueue '{}' closed, dropping job", self.name);
            }
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        // Close channel so the worker loop ends after the backlog
        self.tx = None;

        let Some(handle) = self.handle.take() else {
            return;
        };

        // Never block the UI thread on a long decode backlog
        let deadline = Instant::now() + Duration::from_millis(500);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                trace!("SerialQueue '{}' shutdown timeout, detaching thread", self.name);
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
        trace!("SerialQueue '{}' stopped gracefully", self.name);
    }
}
