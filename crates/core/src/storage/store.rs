use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::CoreError;
use crate::models::cache::{FxRateEntry, StoredPayload, StoredQuote};

use super::manager::{StorageManager, StoreSnapshot};

/// Key-value persistence for quotes, raw payloads, FX rates and the
/// date-keyed provider usage counter.
///
/// Writes are upserts with last-write-wins semantics; nothing is ever
/// deleted. Callers stamp `updated_at` with the wall clock of the write.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn get_quote(&self, key: &str) -> Result<Option<StoredQuote>, CoreError>;
    async fn put_quote(&self, key: &str, entry: StoredQuote) -> Result<(), CoreError>;

    async fn get_raw(&self, key: &str) -> Result<Option<StoredPayload>, CoreError>;
    async fn put_raw(&self, key: &str, entry: StoredPayload) -> Result<(), CoreError>;

    async fn get_fx(&self, pair: &str) -> Result<Option<FxRateEntry>, CoreError>;
    async fn put_fx(&self, pair: &str, entry: FxRateEntry) -> Result<(), CoreError>;

    /// Calls made to `provider` on `date`.
    async fn usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError>;

    /// Count one call and return the new total for the day.
    async fn increment_usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError>;
}

pub type SharedStore = Arc<dyn MarketStore>;

fn usage_key(provider: &str, date: NaiveDate) -> String {
    format!("{provider}:{}", date.format("%Y-%m-%d"))
}

// ── In-memory store ─────────────────────────────────────────────────

/// Process-local store. Also the working set behind `FileStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tables: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreSnapshot> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn get_quote(&self, key: &str) -> Result<Option<StoredQuote>, CoreError> {
        Ok(self.lock().quotes.get(key).cloned())
    }

    async fn put_quote(&self, key: &str, entry: StoredQuote) -> Result<(), CoreError> {
        self.lock().quotes.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<StoredPayload>, CoreError> {
        Ok(self.lock().raw.get(key).cloned())
    }

    async fn put_raw(&self, key: &str, entry: StoredPayload) -> Result<(), CoreError> {
        self.lock().raw.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get_fx(&self, pair: &str) -> Result<Option<FxRateEntry>, CoreError> {
        Ok(self.lock().fx.get(pair).copied())
    }

    async fn put_fx(&self, pair: &str, entry: FxRateEntry) -> Result<(), CoreError> {
        self.lock().fx.insert(pair.to_string(), entry);
        Ok(())
    }

    async fn usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError> {
        Ok(self
            .lock()
            .usage
            .get(&usage_key(provider, date))
            .copied()
            .unwrap_or(0))
    }

    async fn increment_usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError> {
        let mut tables = self.lock();
        let count = tables.usage.entry(usage_key(provider, date)).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

// ── File-backed store ───────────────────────────────────────────────

/// Single-file store: a `MemoryStore` flushed to disk after every write.
///
/// A write returns once it is on disk. Writes that arrive while a flush is
/// running are covered by the next single flush instead of one each.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Count of in-memory changes made so far.
    changes: AtomicU64,
    /// Highest change count already written to disk.
    flushed: tokio::sync::Mutex<u64>,
    flushes: AtomicU64,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("entries", &self.inner.lock().total_entries())
            .finish()
    }
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = StorageManager::load_from_file(&path)?;
        log::debug!(
            "opened store {} with {} entries",
            path.display(),
            snapshot.total_entries()
        );
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
            changes: AtomicU64::new(0),
            flushed: tokio::sync::Mutex::new(0),
            flushes: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the snapshot has been written to disk.
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Make the change just applied to `inner` durable. Must be called
    /// after the in-memory write.
    async fn persist(&self) -> Result<(), CoreError> {
        let change = self.changes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut flushed = self.flushed.lock().await;
        if *flushed >= change {
            return Ok(());
        }

        // Every change counted here is already in memory.
        let covered = self.changes.load(Ordering::SeqCst);
        let snapshot = self.inner.snapshot();
        StorageManager::save_to_file(&snapshot, &self.path).await?;
        *flushed = covered;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl MarketStore for FileStore {
    async fn get_quote(&self, key: &str) -> Result<Option<StoredQuote>, CoreError> {
        self.inner.get_quote(key).await
    }

    async fn put_quote(&self, key: &str, entry: StoredQuote) -> Result<(), CoreError> {
        self.inner.put_quote(key, entry).await?;
        self.persist().await
    }

    async fn get_raw(&self, key: &str) -> Result<Option<StoredPayload>, CoreError> {
        self.inner.get_raw(key).await
    }

    async fn put_raw(&self, key: &str, entry: StoredPayload) -> Result<(), CoreError> {
        self.inner.put_raw(key, entry).await?;
        self.persist().await
    }

    async fn get_fx(&self, pair: &str) -> Result<Option<FxRateEntry>, CoreError> {
        self.inner.get_fx(pair).await
    }

    async fn put_fx(&self, pair: &str, entry: FxRateEntry) -> Result<(), CoreError> {
        self.inner.put_fx(pair, entry).await?;
        self.persist().await
    }

    async fn usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError> {
        self.inner.usage(provider, date).await
    }

    async fn increment_usage(&self, provider: &str, date: NaiveDate) -> Result<u32, CoreError> {
        let count = self.inner.increment_usage(provider, date).await?;
        self.persist().await?;
        Ok(count)
    }
}
