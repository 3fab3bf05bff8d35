use std::path::PathBuf;

use serde::Deserialize;

/// Buffered entries that trigger a background flush when the configured
/// threshold is zero.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// Flushes' worth of entries the requeue policy keeps when no cap is set.
pub const REQUEUE_FLUSHES: usize = 10;

// ─── Profiler configuration ──────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProfilerConfig {
    /// Durable append log. `None` keeps every observation in memory.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Buffer length above which a background flush is scheduled.
    /// Zero means [`DEFAULT_FLUSH_THRESHOLD`].
    #[serde(default)]
    pub flush_threshold: usize,

    /// What happens to drained entries when writing them out fails.
    #[serde(default)]
    pub flush_failure: FlushFailurePolicy,
}

/// Drop-vs-retry choice for a flush whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FlushFailurePolicy {
    /// Discard the drained entries.
    Drop,
    /// Put the drained entries back in front of the buffer, keeping at most
    /// `max_entries` buffered (oldest go first). Zero means
    /// [`REQUEUE_FLUSHES`] times the effective flush threshold.
    Requeue {
        #[serde(default)]
        max_entries: usize,
    },
}

impl Default for FlushFailurePolicy {
    fn default() -> Self {
        Self::Requeue { max_entries: 0 }
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            flush_threshold: 0,
            flush_failure: FlushFailurePolicy::default(),
        }
    }
}

impl ProfilerConfig {
    pub fn with_log_file(path: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn flush_failure(mut self, policy: FlushFailurePolicy) -> Self {
        self.flush_failure = policy;
        self
    }

    /// The threshold actually in force.
    pub fn effective_threshold(&self) -> usize {
        if self.flush_threshold == 0 {
            DEFAULT_FLUSH_THRESHOLD
        } else {
            self.flush_threshold
        }
    }

    /// Buffer cap applied after a failed flush, `None` under [`FlushFailurePolicy::Drop`].
    pub fn effective_requeue_cap(&self) -> Option<usize> {
        match self.flush_failure {
            FlushFailurePolicy::Drop => None,
            FlushFailurePolicy::Requeue { max_entries: 0 } => {
                Some(REQUEUE_FLUSHES.saturating_mul(self.effective_threshold()))
            }
            FlushFailurePolicy::Requeue { max_entries } => Some(max_entries),
        }
    }
}
