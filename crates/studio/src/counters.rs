//! Durable usage counters.
//!
//! Local usage survives restarts without refetching the session, keyed
//! `regenUsed:<sessionId>` and `upscaleUsed:<sessionId>`. The values are
//! advisory: the session row's counters replace them whenever they are set.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use atelier_core::quota::{QuotaKind, QuotaUsage};

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("Counter file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Counter file is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// String-keyed integer storage.
pub trait CounterStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<u32>, CounterError>;
    fn set(&self, key: &str, value: u32) -> Result<(), CounterError>;
    fn clear(&self, key: &str) -> Result<(), CounterError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MemoryCounterStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    values: Mutex<HashMap<String, u32>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn get(&self, key: &str) -> Result<Option<u32>, CounterError> {
        Ok(lock(&self.values).get(key).copied())
    }

    fn set(&self, key: &str, value: u32) -> Result<(), CounterError> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), CounterError> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCounterStore
// ---------------------------------------------------------------------------

/// All counters in one JSON object on disk.
///
/// The file is read once on open. Every write rewrites it through a
/// temporary sibling and a rename, so a crash leaves either the old or the
/// new contents.
#[derive(Debug)]
pub struct FileCounterStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, u32>>,
}

impl FileCounterStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CounterError> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = values.len(), "Opened counter store");

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, u32>) -> Result<(), CounterError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CounterStore for FileCounterStore {
    fn get(&self, key: &str) -> Result<Option<u32>, CounterError> {
        Ok(lock(&self.values).get(key).copied())
    }

    fn set(&self, key: &str, value: u32) -> Result<(), CounterError> {
        let mut values = lock(&self.values);
        if values.get(key) == Some(&value) {
            return Ok(());
        }
        values.insert(key.to_string(), value);
        self.persist(&values)
    }

    fn clear(&self, key: &str) -> Result<(), CounterError> {
        let mut values = lock(&self.values);
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// UsageCounters
// ---------------------------------------------------------------------------

/// Typed view over a [`CounterStore`] scoped by session id.
#[derive(Clone)]
pub struct UsageCounters {
    store: Arc<dyn CounterStore>,
}

impl UsageCounters {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCounterStore::new()))
    }

    /// `regenUsed:<sessionId>` / `upscaleUsed:<sessionId>`.
    pub fn key(kind: QuotaKind, session_id: &str) -> String {
        format!("{}:{session_id}", kind.counter_prefix())
    }

    pub fn get(&self, kind: QuotaKind, session_id: &str) -> Result<u32, CounterError> {
        Ok(self.store.get(&Self::key(kind, session_id))?.unwrap_or(0))
    }

    pub fn set(&self, kind: QuotaKind, session_id: &str, value: u32) -> Result<(), CounterError> {
        self.store.set(&Self::key(kind, session_id), value)
    }

    /// Add `delta` to the stored count and return the new value.
    pub fn record(&self, kind: QuotaKind, session_id: &str, delta: u32) -> Result<u32, CounterError> {
        let next = self.get(kind, session_id)?.saturating_add(delta);
        self.set(kind, session_id, next)?;
        Ok(next)
    }

    /// Remove both counters of a session.
    pub fn clear(&self, session_id: &str) -> Result<(), CounterError> {
        for kind in QuotaKind::ALL {
            self.store.clear(&Self::key(kind, session_id))?;
        }
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<QuotaUsage, CounterError> {
        Ok(QuotaUsage {
            regenerations: self.get(QuotaKind::Regenerate, session_id)?,
            upscales: self.get(QuotaKind::Upscale, session_id)?,
        })
    }

    /// Overwrite both counters of a session.
    pub fn store_usage(&self, session_id: &str, usage: QuotaUsage) -> Result<(), CounterError> {
        for kind in QuotaKind::ALL {
            self.set(kind, session_id, usage.get(kind))?;
        }
        Ok(())
    }
}
