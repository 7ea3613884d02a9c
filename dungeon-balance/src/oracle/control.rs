//! Progress reporting and cooperative cancellation for long runs.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::numbers::u64_to_f64;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Completed-vs-total trial counter with a status line.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicU64,
    total: AtomicU64,
    status: Mutex<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    pub status: String,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        u64_to_f64(self.completed) / u64_to_f64(self.total)
    }
}

impl Progress {
    pub fn begin(&self, total: u64, status: impl Into<String>) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.set_status(status);
    }

    /// Extend the expected total for multi-stage operations.
    pub fn add_total(&self, extra: u64) {
        self.total.fetch_add(extra, Ordering::SeqCst);
    }

    pub fn advance(&self, trials: u64) {
        self.completed.fetch_add(trials, Ordering::Relaxed);
    }

    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status.into();
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            status: self
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Handles shared between a running operation and its observers.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub progress: Arc<Progress>,
    pub cancel: CancelToken,
}

impl RunControl {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_tracks_counts_and_status() {
        let progress = Progress::default();
        progress.begin(10, "warming up");
        progress.advance(4);
        let snapshot = progress.snapshot();
        assert_eq!((snapshot.completed, snapshot.total), (4, 10));
        assert_eq!(snapshot.status, "warming up");
        assert!((snapshot.fraction() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let control = RunControl::default();
        let observer = control.clone();
        observer.cancel.cancel();
        assert!(control.is_cancelled());
        control.cancel.reset();
        assert!(!observer.is_cancelled());
    }
}
