use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{ltsv, Observation};
use crate::config::ProfilerConfig;
use crate::error::{Error, Result};

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe access log.
///
/// The recording middleware calls [`record`](Self::record), report
/// consumers call [`report`](Self::report). Cloning is cheap and every
/// clone shares the same buffer and log file.
#[derive(Clone)]
pub struct AccessProf {
    shared: Arc<Shared>,
}

/// Quiet period after a failed flush during which the threshold does not
/// schedule another one.
const FLUSH_RETRY_BACKOFF: Duration = Duration::from_secs(1);

// ─── Internal state ──────────────────────────────────────────────

struct Shared {
    config: ProfilerConfig,
    threshold: usize,
    requeue_cap: Option<usize>,

    // Completion-ordered observations not yet written out
    buffer: Mutex<Vec<Observation>>,

    // Serializes every touch of the log file (flush, load)
    flush_lock: Mutex<()>,

    // Set while a threshold-triggered flush is queued or running
    flush_pending: AtomicBool,

    // When the most recent flush failed, cleared by the next success
    last_failure: Mutex<Option<Instant>>,
}

// ─── AccessProf impl ─────────────────────────────────────────────

impl AccessProf {
    pub fn new(config: ProfilerConfig) -> Self {
        let threshold = config.effective_threshold();
        let requeue_cap = config.effective_requeue_cap();
        Self {
            shared: Arc::new(Shared {
                config,
                threshold,
                requeue_cap,
                buffer: Mutex::new(Vec::new()),
                flush_lock: Mutex::new(()),
                flush_pending: AtomicBool::new(false),
                last_failure: Mutex::new(None),
            }),
        }
    }

    /// A profiler that never touches the filesystem.
    pub fn memory_only() -> Self {
        Self::new(ProfilerConfig::default())
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.shared.config
    }

    /// Append one observation. Never blocks on file I/O and never fails:
    /// crossing the flush threshold schedules a background flush whose
    /// errors are only logged.
    pub fn record(&self, observation: Observation) {
        let len = {
            let mut buffer = self.shared.buffer.lock();
            buffer.push(observation);
            buffer.len()
        };
        if len > self.shared.threshold && self.shared.config.log_file.is_some() {
            self.schedule_flush();
        }
    }

    /// Number of observations currently buffered in memory.
    /// Entries already written to the log file are not counted.
    pub fn count(&self) -> usize {
        self.shared.buffer.lock().len()
    }

    /// Empty the in-memory buffer. The log file is left as it is, so
    /// previously flushed history still shows up in later reports.
    pub fn reset(&self) {
        self.shared.buffer.lock().clear();
    }

    /// Move every buffered observation into the log file and return how many
    /// were written. A no-op without a log file.
    pub fn flush(&self) -> Result<usize> {
        let Some(path) = self.shared.config.log_file.as_deref() else {
            return Ok(0);
        };
        let _guard = self.shared.flush_lock.lock();
        self.flush_locked(path)
    }

    /// Read back every observation in the log file, oldest first.
    /// Returns nothing when no log file is configured or it does not exist yet.
    pub fn load_all(&self) -> Result<Vec<Observation>> {
        let Some(path) = self.shared.config.log_file.as_deref() else {
            return Ok(Vec::new());
        };
        let _guard = self.shared.flush_lock.lock();
        read_log(path)
    }

    /// Durable history followed by the live buffer, taken under the flush
    /// lock so an entry is never seen twice or lost between the two.
    pub(crate) fn observations(&self) -> Result<Vec<Observation>> {
        let _guard = self.shared.flush_lock.lock();
        let mut all = match self.shared.config.log_file.as_deref() {
            Some(path) => {
                if let Err(err) = self.flush_locked(path) {
                    warn!(error = %err, "flush before report failed; using buffered entries");
                }
                read_log(path)?
            }
            None => Vec::new(),
        };
        all.extend(self.shared.buffer.lock().iter().cloned());
        Ok(all)
    }

    // ── Flushing ────────────────────────────────────────────────

    /// Caller must hold `flush_lock`.
    fn flush_locked(&self, path: &Path) -> Result<usize> {
        // Swap the buffer out so recording continues while we write
        let drained = std::mem::take(&mut *self.shared.buffer.lock());
        if drained.is_empty() {
            return Ok(0);
        }

        match append_log(path, &drained) {
            Ok(()) => {
                *self.shared.last_failure.lock() = None;
                info!(path = %path.display(), entries = drained.len(), "flushed access log");
                Ok(drained.len())
            }
            Err(err) => {
                *self.shared.last_failure.lock() = Some(Instant::now());
                self.handle_failed_flush(drained);
                Err(err)
            }
        }
    }

    fn handle_failed_flush(&self, mut drained: Vec<Observation>) {
        let Some(max_entries) = self.shared.requeue_cap else {
            warn!(dropped = drained.len(), "discarding observations after failed flush");
            return;
        };

        let excess = {
            let mut buffer = self.shared.buffer.lock();
            // Drained entries are older than anything recorded since
            drained.append(&mut *buffer);
            let excess = drained.len().saturating_sub(max_entries);
            drained.drain(..excess);
            *buffer = drained;
            excess
        };
        if excess > 0 {
            warn!(dropped = excess, max_entries, "requeue limit reached, oldest observations dropped");
        }
    }

    /// True while the last flush failed less than [`FLUSH_RETRY_BACKOFF`] ago.
    fn flush_backing_off(&self) -> bool {
        self.shared
            .last_failure
            .lock()
            .is_some_and(|at| at.elapsed() < FLUSH_RETRY_BACKOFF)
    }

    fn schedule_flush(&self) {
        if self.flush_backing_off() {
            return;
        }
        if self.shared.flush_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let prof = self.clone();
        let job = move || {
            let result = prof.flush();
            prof.shared.flush_pending.store(false, Ordering::Release);
            match result {
                Ok(n) => debug!(entries = n, "background flush finished"),
                Err(err) => warn!(error = %err, "background flush failed"),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                std::thread::spawn(job);
            }
        }
    }
}

impl Default for AccessProf {
    fn default() -> Self {
        Self::memory_only()
    }
}

// ─── Log file helpers ────────────────────────────────────────────

fn append_log(path: &Path, entries: &[Observation]) -> Result<()> {
    // Encode first so the file sees a single write
    let mut buf = Vec::with_capacity(entries.len() * 160);
    for obs in entries {
        ltsv::write_line(&mut buf, obs).map_err(|e| Error::io(path, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    file.write_all(&buf).map_err(|e| Error::io(path, e))?;
    file.flush().map_err(|e| Error::io(path, e))
}

fn read_log(path: &Path) -> Result<Vec<Observation>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(path, e)),
    };

    let mut logs = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| Error::io(path, e))?;
        let obs = ltsv::decode(&line).map_err(|source| Error::Decode {
            line: idx + 1,
            source,
        })?;
        logs.push(obs);
    }
    Ok(logs)
}
