//! Run counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Per-run counters, shared by every page worker of one run
#[derive(Debug, Default)]
pub struct RunCounters {
    pages_stored: AtomicU64,
    bytes_written: AtomicU64,
    duplicates_skipped: AtomicU64,
    pages_failed: AtomicU64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_stored(&self, bytes: u64) {
        self.pages_stored.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Bytes written without a new page (canonical object repair)
    pub fn bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunCountersSnapshot {
        RunCountersSnapshot {
            pages_stored: self.pages_stored.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            pages_failed: self.pages_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCountersSnapshot {
    pub pages_stored: u64,
    pub bytes_written: u64,
    pub duplicates_skipped: u64,
    pub pages_failed: u64,
}

/// Process-wide totals exposed by the health endpoint
#[derive(Debug, Default)]
pub struct Metrics {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_aborted: AtomicU64,
    pages_stored: AtomicU64,
    bytes_written: AtomicU64,
    duplicates_skipped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "runs_started", "Metric incremented");
    }

    pub fn run_finished(&self, aborted: bool, counters: &RunCountersSnapshot) {
        if aborted {
            self.runs_aborted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_completed.fetch_add(1, Ordering::Relaxed);
        }
        self.pages_finished(counters);
    }

    /// Page totals from work done outside a run, e.g. a single-chapter scrape
    pub fn pages_finished(&self, counters: &RunCountersSnapshot) {
        self.pages_stored
            .fetch_add(counters.pages_stored, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(counters.bytes_written, Ordering::Relaxed);
        self.duplicates_skipped
            .fetch_add(counters.duplicates_skipped, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            pages_stored: self.pages_stored.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_aborted: u64,
    pub pages_stored: u64,
    pub bytes_written: u64,
    pub duplicates_skipped: u64,
}
