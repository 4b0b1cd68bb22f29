//! Progress reporting and cooperative cancellation.
//!
//! A [`ProgressMonitor`] is called as `(tag, done, total)` and returns `false`
//! to request cancellation. Parallel loops report through a
//! [`ProgressTracker`], which throttles calls to about [`PROGRESS_STEPS`] per
//! operation and remembers a cancellation request.
//!
//! ```rust
//! use px_core::{ProgressMonitor, ProgressTracker};
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::sync::Arc;
//!
//! let calls = Arc::new(AtomicU64::new(0));
//! let seen = Arc::clone(&calls);
//! let monitor = ProgressMonitor::new(move |_tag, _done, _total| {
//!     seen.fetch_add(1, Ordering::Relaxed);
//!     true
//! });
//!
//! let tracker = ProgressTracker::new(Some(&monitor), "Demo/Image", 10_000);
//! for _ in 0..10_000 {
//!     assert!(tracker.advance());
//! }
//! assert!(calls.load(Ordering::Relaxed) <= 101);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Approximate number of monitor calls per operation.
pub const PROGRESS_STEPS: u64 = 100;

type MonitorFn = dyn Fn(&str, u64, u64) -> bool + Send + Sync;

/// Caller supplied progress callback.
#[derive(Clone)]
pub struct ProgressMonitor(Arc<MonitorFn>);

impl ProgressMonitor {
    /// Wraps a closure `(tag, done, total) -> continue`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, u64, u64) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invokes the callback.
    #[inline]
    pub fn report(&self, tag: &str, done: u64, total: u64) -> bool {
        (self.0)(tag, done, total)
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressMonitor(..)")
    }
}

/// Thread-safe, throttled progress counter for one operation.
pub struct ProgressTracker<'m> {
    monitor: Option<&'m ProgressMonitor>,
    tag: &'m str,
    total: u64,
    step: u64,
    done: AtomicU64,
    cancelled: AtomicBool,
}

impl<'m> ProgressTracker<'m> {
    /// Creates a tracker for `total` units of work.
    pub fn new(monitor: Option<&'m ProgressMonitor>, tag: &'m str, total: u64) -> Self {
        Self {
            monitor,
            tag,
            total,
            step: (total / PROGRESS_STEPS).max(1),
            done: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Progress tag.
    pub fn tag(&self) -> &str {
        self.tag
    }

    /// Records one finished unit. Returns `false` once cancellation was
    /// requested.
    pub fn advance(&self) -> bool {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(monitor) = self.monitor {
            if done % self.step == 0 || done == self.total {
                if !monitor.report(self.tag, done, self.total) {
                    self.cancelled.store(true, Ordering::Release);
                }
            }
        }
        !self.is_cancelled()
    }

    /// Returns `true` once the monitor asked to stop.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Units finished so far.
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }
}
