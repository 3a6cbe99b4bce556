//! Progress reporting for long-running operations.
//!
//! Density and normal recomputation, proximity-graph construction and ICP
//! accept a [`ProgressSink`] explicitly. The sink receives three hooks:
//! `begin(label, total)`, `advance(current)` and `end()`. Operations never
//! call the sink directly; they drive it through a [`ProgressTracker`], which
//! rate-limits `advance` to roughly 1% steps and may be ticked from several
//! worker threads at once.
//!
//! # Example
//!
//! ```
//! use pointfuse::progress::{CallbackProgress, Progress};
//!
//! let sink = CallbackProgress::new(Box::new(|progress: &Progress| {
//!     println!("{}: {}%", progress.message, progress.percent());
//! }));
//! # let _ = sink;
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Receiver of progress notifications.
///
/// Sinks must be `Sync`: parallel phases advance them from worker threads.
pub trait ProgressSink: Sync {
    /// An operation with `total` steps is starting.
    fn begin(&self, label: &str, total: u64);

    /// The running operation has completed `current` steps.
    fn advance(&self, current: u64);

    /// The running operation finished (successfully or not).
    fn end(&self);
}

/// A sink that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    #[inline]
    fn begin(&self, _label: &str, _total: u64) {}

    #[inline]
    fn advance(&self, _current: u64) {}

    #[inline]
    fn end(&self) {}
}

/// A sink that emits `tracing` debug events under `pointfuse::progress`.
#[derive(Debug, Default)]
pub struct LogProgress {
    state: Mutex<Option<(String, u64)>>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogProgress {
    fn begin(&self, label: &str, total: u64) {
        if let Ok(mut state) = self.state.lock() {
            *state = Some((label.to_string(), total));
        }
        debug!(target: "pointfuse::progress", operation = label, total, "Started");
    }

    fn advance(&self, current: u64) {
        if let Ok(state) = self.state.lock()
            && let Some((label, total)) = state.as_ref()
        {
            crate::tracing_ext::log_progress(label, current, *total);
        }
    }

    fn end(&self) {
        if let Ok(mut state) = self.state.lock()
            && let Some((label, _)) = state.take()
        {
            debug!(target: "pointfuse::progress", operation = label.as_str(), "Finished");
        }
    }
}

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Completed steps.
    pub current: u64,

    /// Total number of steps.
    pub total: u64,

    /// Label of the running operation.
    pub message: String,

    /// Elapsed time since the operation began.
    pub elapsed: Duration,

    /// Estimated time remaining (if available).
    pub estimated_remaining: Option<Duration>,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
            estimated_remaining: None,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Check if the operation is complete.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Callback invoked with a [`Progress`] snapshot on every `advance`.
pub type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

#[derive(Debug)]
struct CallbackState {
    label: String,
    total: u64,
    start: Instant,
}

/// A sink that forwards snapshots to a closure.
pub struct CallbackProgress {
    callback: ProgressCallback,
    state: Mutex<Option<CallbackState>>,
}

impl CallbackProgress {
    /// Create a sink around `callback`.
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            state: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for CallbackProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackProgress").finish_non_exhaustive()
    }
}

impl ProgressSink for CallbackProgress {
    fn begin(&self, label: &str, total: u64) {
        if let Ok(mut state) = self.state.lock() {
            *state = Some(CallbackState {
                label: label.to_string(),
                total,
                start: Instant::now(),
            });
        }
        (self.callback)(&Progress::new(0, total, label));
    }

    fn advance(&self, current: u64) {
        let snapshot = match self.state.lock() {
            Ok(state) => match state.as_ref() {
                Some(s) => {
                    let elapsed = s.start.elapsed();
                    Progress {
                        current,
                        total: s.total,
                        message: s.label.clone(),
                        elapsed,
                        estimated_remaining: estimate_remaining(current, s.total, elapsed),
                    }
                }
                None => return,
            },
            Err(_) => return,
        };
        (self.callback)(&snapshot);
    }

    fn end(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.take();
        }
    }
}

fn estimate_remaining(current: u64, total: u64, elapsed: Duration) -> Option<Duration> {
    if current == 0 || current > total {
        return None;
    }
    let rate = current as f64 / elapsed.as_secs_f64();
    if rate > 0.0 && rate.is_finite() {
        Some(Duration::from_secs_f64((total - current) as f64 / rate))
    } else {
        None
    }
}

/// A thread-safe, rate-limited driver for a [`ProgressSink`].
///
/// `begin` is sent on construction and `end` when the tracker is dropped,
/// so the sink sees a closed operation even when the work bails out early
/// with an error.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    current: AtomicU64,
    total: u64,
    step: u64,
    next_report: AtomicU64,
    last_reported: AtomicU64,
}

impl<'a> ProgressTracker<'a> {
    /// Start tracking an operation with `total` steps.
    pub fn begin(sink: &'a dyn ProgressSink, label: &str, total: u64) -> Self {
        sink.begin(label, total);
        let step = (total / 100).max(1);
        Self {
            sink,
            current: AtomicU64::new(0),
            total,
            step,
            next_report: AtomicU64::new(step),
            last_reported: AtomicU64::new(0),
        }
    }

    /// Record one completed step.
    #[inline]
    pub fn tick(&self) {
        self.tick_by(1);
    }

    /// Record `amount` completed steps.
    pub fn tick_by(&self, amount: u64) {
        let now = self.current.fetch_add(amount, Ordering::Relaxed) + amount;
        let mut next = self.next_report.load(Ordering::Relaxed);
        while now >= next {
            match self.next_report.compare_exchange_weak(
                next,
                now + self.step,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    self.last_reported.fetch_max(now, Ordering::Relaxed);
                    self.sink.advance(now);
                    break;
                }
                Err(actual) => next = actual,
            }
        }
    }

    /// Completed steps so far.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Total number of steps.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current() as f64) / (self.total as f64)
        }
    }
}

impl Drop for ProgressTracker<'_> {
    fn drop(&mut self) {
        let current = self.current();
        if current > self.last_reported.load(Ordering::Relaxed) {
            self.sink.advance(current);
        }
        self.sink.end();
    }
}
