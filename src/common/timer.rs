use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A single-shot, cancellable timer with millisecond resolution.
///
/// Mirrors the teacher's habit of re-arming a fresh timeout on every state
/// transition (`generate_election_timeout`/`resetElectionTimer` in the Go
/// source this was distilled from used `time.AfterFunc`). Rust has no
/// built-in equivalent, so we spawn a thread per arm and use an epoch
/// counter to make stale fires inert: `reset` bumps the epoch before
/// spawning, and the sleeping thread only invokes its callback if the epoch
/// it captured is still current when it wakes.
///
/// A `Timer` owns at most one logically-active arm at a time; calling
/// `reset` while a previous arm is still sleeping cancels that arm.
pub struct Timer {
    epoch: Arc<AtomicU64>,
}

impl Timer {
    pub fn new() -> Self {
        Timer {
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cancels any still-pending arm and schedules `callback` to run on a
    /// fresh background thread after `delay`, unless `reset` or `cancel` is
    /// called again before it elapses. The callback runs off the calling
    /// thread; it is responsible for acquiring whatever lock it needs and
    /// re-checking state before acting (the timer itself makes no promise
    /// about what state the world is in by the time it fires).
    pub fn reset<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.epoch.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            if epoch.load(Ordering::SeqCst) == my_epoch {
                callback();
            }
        });
    }

    /// Cancels any pending arm without scheduling a new one.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
