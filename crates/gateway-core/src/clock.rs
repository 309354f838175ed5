//! Wall-clock abstraction for time-bucketed logic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current epoch time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Seconds since the Unix epoch
    fn now_epoch_seconds(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Manually driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `epoch_seconds`
    #[must_use]
    pub fn new(epoch_seconds: u64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(epoch_seconds)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, seconds: u64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, epoch_seconds: u64) {
        self.seconds.store(epoch_seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch_seconds(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }
}
