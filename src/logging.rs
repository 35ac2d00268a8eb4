//! Logger callbacks registered on a facade.
//!
//! The registry is copy-on-write: `register`/`unregister` build a new list and swap it in,
//! while `log` walks an `Arc` snapshot taken at call time. A logger removed mid-delivery still
//! sees the line being delivered; it sees nothing after that.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Prefix put in front of every line handed to loggers.
pub const LOG_PREFIX: &str = "SqlOath: ";

/// A logger callback.
pub type Logger = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies a registered logger for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoggerHandle(u64);

type Entries = Arc<Vec<(LoggerHandle, Logger)>>;

pub struct LoggerRegistry {
    next_id: AtomicU64,
    entries: RwLock<Entries>,
}

impl LoggerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn register<F>(&self, logger: F) -> LoggerHandle
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let handle = LoggerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<(LoggerHandle, Logger)> = guard.as_ref().clone();
        next.push((handle, Arc::new(logger)));
        *guard = Arc::new(next);
        handle
    }

    /// Returns `false` when the handle was not registered.
    pub fn unregister(&self, handle: LoggerHandle) -> bool {
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|(h, _)| *h == handle) {
            return false;
        }
        let next: Vec<(LoggerHandle, Logger)> = guard
            .iter()
            .filter(|(h, _)| *h != handle)
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Deliver a line to every registered logger and to `tracing`.
    pub fn log(&self, msg: &str) {
        if msg.starts_with("Error: ") {
            tracing::warn!(target: "sql_oath", "{msg}");
        } else {
            tracing::debug!(target: "sql_oath", "{msg}");
        }
        let entries = self.snapshot();
        if entries.is_empty() {
            return;
        }
        let line = format!("{LOG_PREFIX}{msg}");
        for (_, logger) in entries.iter() {
            logger(&line);
        }
    }

    fn snapshot(&self) -> Entries {
        Arc::clone(&self.entries.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerRegistry")
            .field("loggers", &self.len())
            .finish()
    }
}
