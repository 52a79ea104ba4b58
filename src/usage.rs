//! Persisted usage counter for the free search quota.
//!
//! The counter is a monotonic count of searches consumed since the last
//! reset. It survives restarts and never resets itself; only the explicit
//! diagnostic `reset()` clears it. The quota derivation (`remaining`) is
//! computed, never stored.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of free searches before the gate closes.
pub const DEFAULT_FREE_QUOTA: u32 = 10;

/// Errors from usage counter persistence.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("No usable config directory for the usage counter")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Snapshot of quota consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageState {
    /// Searches consumed since the last reset.
    pub count: u32,
    /// Quota constant this counter was configured with.
    pub free_quota: u32,
    /// `max(0, free_quota - count)`.
    pub remaining: u32,
}

/// Durable storage for the raw count.
///
/// Injected so tests can run against in-memory state.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> Result<u32, UsageError>;
    fn save(&self, count: u32) -> Result<(), UsageError>;
}

impl<S: UsageStore + ?Sized> UsageStore for std::sync::Arc<S> {
    fn load(&self) -> Result<u32, UsageError> {
        (**self).load()
    }

    fn save(&self, count: u32) -> Result<(), UsageError> {
        (**self).save(count)
    }
}

/// On-disk record format for [`FileUsageStore`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedCount {
    count: u32,
    updated_at: DateTime<Utc>,
}

/// JSON-file-backed store under the platform config directory.
pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    /// Store at the default location (`~/.config/dsearch/usage.json` or
    /// platform equivalent).
    pub fn new() -> Result<Self, UsageError> {
        let dir = dirs::config_dir()
            .ok_or(UsageError::NoConfigDir)?
            .join("dsearch");
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("usage.json"),
        })
    }

    /// Store at an explicit path (used by tests and diagnostics).
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl UsageStore for FileUsageStore {
    fn load(&self) -> Result<u32, UsageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let record: PersistedCount = serde_json::from_str(&content)?;
                Ok(record.count)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, count: u32) -> Result<(), UsageError> {
        let record = PersistedCount {
            count,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-memory store for isolated tests. Never touches the filesystem.
#[derive(Default)]
pub struct MemoryUsageStore {
    count: parking_lot::Mutex<u32>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self) -> Result<u32, UsageError> {
        Ok(*self.count.lock())
    }

    fn save(&self, count: u32) -> Result<(), UsageError> {
        *self.count.lock() = count;
        Ok(())
    }
}

/// The usage counter: cached count plus write-through persistence.
///
/// One instance owns the count; all mutations go through `increment()` and
/// `reset()`.
pub struct UsageCounter {
    store: Box<dyn UsageStore>,
    free_quota: u32,
    count: u32,
}

impl UsageCounter {
    /// Load the persisted count and wrap it with the given quota.
    pub fn new(store: Box<dyn UsageStore>, free_quota: u32) -> Result<Self, UsageError> {
        let count = store.load()?;
        Ok(Self {
            store,
            free_quota,
            count,
        })
    }

    /// Current state without mutating anything.
    pub fn read(&self) -> UsageState {
        UsageState {
            count: self.count,
            free_quota: self.free_quota,
            remaining: self.free_quota.saturating_sub(self.count),
        }
    }

    /// Consume one search. The raw count saturates at `u32::MAX`; precision
    /// below the quota is exact. Persistence failures are returned but the
    /// in-memory count still advances so gating stays consistent within the
    /// session.
    pub fn increment(&mut self) -> Result<UsageState, UsageError> {
        self.count = self.count.saturating_add(1);
        let state = self.read();
        self.store.save(self.count)?;
        tracing::debug!(count = state.count, remaining = state.remaining, "Search recorded");
        Ok(state)
    }

    /// Diagnostic reset. Not called by normal entitlement logic.
    pub fn reset(&mut self) -> Result<UsageState, UsageError> {
        self.count = 0;
        self.store.save(0)?;
        tracing::info!("Usage counter reset");
        Ok(self.read())
    }
}
