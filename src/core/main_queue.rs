//! UI-thread job queue
//!
//! Architecture:
//! - Any thread may `post()` a job through a cloned [`MainQueueHandle`]
//! - The UI thread drains the queue with `run_pending()` (or blocks with
//!   `run_next_timeout()`) once per loop iteration
//!
//! Jobs run in posting order. Every state mutation of the renderer happens in
//! a job run here or in a public call made from the same thread, which is what
//! "the UI thread" means for this crate.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::trace;

use crate::entities::Job;

/// Sending side of the UI queue. Cheap to clone, `Send + Sync`.
#[derive(Clone)]
pub struct MainQueueHandle {
    tx: Sender<Job>,
}

impl MainQueueHandle {
    /// Post job for the UI thread.
    ///
    /// Silently dropped if the queue itself is gone (app shutting down).
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.tx.send(Box::new(f)).is_err() {
            trace!("MainQueue gone, dropping job");
        }
    }
}

/// Receiving side, owned by the UI thread.
pub struct MainQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub fn handle(&self) -> MainQueueHandle {
        MainQueueHandle { tx: self.tx.clone() }
    }

    /// Run every job currently queued, including jobs posted by those jobs.
    ///
    /// Returns number of jobs executed.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job();
                    count += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        count
    }

    /// Block up to `timeout` for one job, run it, then drain the rest.
    ///
    /// Returns number of jobs executed (0 on timeout).
    pub fn run_next_timeout(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                1 + self.run_pending()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Keep running jobs until `done()` holds or `timeout` elapses.
    ///
    /// Returns final value of `done()`.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.run_next_timeout(deadline - now);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_fifo_order() {
        let queue = MainQueue::new();
        let handle = queue.handle();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            handle.post(move || log.lock().unwrap().push(i));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nested_posts_run_in_same_drain() {
        let queue = MainQueue::new();
        let handle = queue.handle();
        let count = Arc::new(AtomicUsize::new(0));

        let inner_handle = handle.clone();
        let c = Arc::clone(&count);
        handle.post(move || {
            let c2 = Arc::clone(&c);
            inner_handle.post(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            });
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_post_from_other_thread() {
        let queue = MainQueue::new();
        let handle = queue.handle();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        std::thread::spawn(move || {
            handle.post(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert!(queue.run_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
    }
}
