//! Scan result cache
//!
//! Per-component scan results ([`NodeInfo`]) are cached by short component
//! id, together with the issue and license records they refer to. The
//! layer uses a trait hierarchy:
//!
//! - **ReadCache**: lookups and validity checks
//! - **WriteCache**: extends ReadCache with writes
//!
//! An expired entry is deleted when it is read, so a miss and an invalid
//! entry look the same to callers.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::CacheConfig;
use crate::model::{IssueRecord, LicenseRecord, NodeInfo};

pub mod sqlite;

pub use sqlite::SqliteCache;

/// Read-only cache operations
pub trait ReadCache: Send + Sync {
    /// Cached scan result of a component, `None` when absent or expired
    fn get(&self, component_id: &str) -> Option<NodeInfo>;

    /// Whether a still-valid entry exists for the component
    fn is_valid(&self, component_id: &str) -> bool {
        self.get(component_id).is_some()
    }

    fn get_issue(&self, issue_id: &str) -> Option<IssueRecord>;

    fn get_license(&self, name: &str) -> Option<LicenseRecord>;
}

/// Cache operations that modify entries
pub trait WriteCache: ReadCache {
    /// Store the scan result of a component, replacing any previous one
    fn put(&self, component_id: String, info: NodeInfo);

    fn put_issue(&self, record: IssueRecord);

    fn put_license(&self, record: LicenseRecord);

    fn remove(&self, component_id: &str);

    fn clear(&self);
}

impl<T: ReadCache> ReadCache for Arc<T> {
    fn get(&self, component_id: &str) -> Option<NodeInfo> {
        (**self).get(component_id)
    }

    fn is_valid(&self, component_id: &str) -> bool {
        (**self).is_valid(component_id)
    }

    fn get_issue(&self, issue_id: &str) -> Option<IssueRecord> {
        (**self).get_issue(issue_id)
    }

    fn get_license(&self, name: &str) -> Option<LicenseRecord> {
        (**self).get_license(name)
    }
}

impl<T: WriteCache> WriteCache for Arc<T> {
    fn put(&self, component_id: String, info: NodeInfo) {
        (**self).put(component_id, info)
    }

    fn put_issue(&self, record: IssueRecord) {
        (**self).put_issue(record)
    }

    fn put_license(&self, record: LicenseRecord) {
        (**self).put_license(record)
    }

    fn remove(&self, component_id: &str) {
        (**self).remove(component_id)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// Default TTL for cache entries (one week)
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

type EntryMap<T> = Arc<DashMap<String, CacheEntry<T>>>;

/// Read an entry, deleting it when expired
fn read_valid<T: Clone>(map: &DashMap<String, CacheEntry<T>>, key: &str) -> Option<T> {
    {
        // the shard guard must be released before removing
        let entry = map.get(key)?;
        if !entry.is_expired() {
            return Some(entry.data.clone());
        }
    }
    map.remove(key);
    None
}

/// In-memory cache using DashMap for thread-safety
#[derive(Clone)]
pub struct MemoryCache {
    components: EntryMap<NodeInfo>,
    issues: EntryMap<IssueRecord>,
    licenses: EntryMap<LicenseRecord>,
    ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            components: Arc::new(DashMap::new()),
            issues: Arc::new(DashMap::new()),
            licenses: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Remove all expired entries
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.len();
        self.components.retain(|_, e| !e.is_expired());
        self.issues.retain(|_, e| !e.is_expired());
        self.licenses.retain(|_, e| !e.is_expired());
        let removed = before - self.len();
        if removed > 0 {
            tracing::debug!(
                "Cleaned up {} expired cache entries ({} remaining)",
                removed,
                self.len()
            );
        }
        removed
    }

    /// Counts of total, expired and valid component entries
    pub fn stats(&self) -> CacheStats {
        let total = self.components.len();
        let expired = self.components.iter().filter(|e| e.is_expired()).count();
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            valid_entries: total.saturating_sub(expired),
        }
    }

    /// Number of entries of every kind, including expired ones
    pub fn len(&self) -> usize {
        self.components.len() + self.issues.len() + self.licenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReadCache for MemoryCache {
    fn get(&self, component_id: &str) -> Option<NodeInfo> {
        read_valid(&self.components, component_id)
    }

    fn get_issue(&self, issue_id: &str) -> Option<IssueRecord> {
        read_valid(&self.issues, issue_id)
    }

    fn get_license(&self, name: &str) -> Option<LicenseRecord> {
        read_valid(&self.licenses, name)
    }
}

impl WriteCache for MemoryCache {
    fn put(&self, component_id: String, info: NodeInfo) {
        self.components
            .insert(component_id, CacheEntry::new(info, self.ttl));
    }

    fn put_issue(&self, record: IssueRecord) {
        self.issues
            .insert(record.issue_id.clone(), CacheEntry::new(record, self.ttl));
    }

    fn put_license(&self, record: LicenseRecord) {
        self.licenses
            .insert(record.name.clone(), CacheEntry::new(record, self.ttl));
    }

    fn remove(&self, component_id: &str) {
        self.components.remove(component_id);
    }

    fn clear(&self) {
        self.components.clear();
        self.issues.clear();
        self.licenses.clear();
    }
}

/// Statistics about cache contents
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of component entries
    pub total_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CacheStats {{ total: {}, expired: {}, valid: {} }}",
            self.total_entries, self.expired_entries, self.valid_entries
        )
    }
}

/// Memory front with an optional SQLite back for persistence across runs
pub struct HybridCache {
    memory: MemoryCache,
    sqlite: Option<Arc<SqliteCache>>,
}

/// Cleanup interval for the background task (30 minutes)
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

impl HybridCache {
    /// Create a cache from configuration
    ///
    /// A SQLite store that cannot be opened downgrades the cache to memory
    /// only.
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_secs);
        let sqlite = if config.persistent {
            match Self::open_sqlite(config) {
                Ok(cache) => {
                    tracing::info!("SQLite cache initialized");
                    Some(Arc::new(cache))
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to initialize SQLite cache, using memory only: {}",
                        e
                    );
                    None
                }
            }
        } else {
            None
        };
        Self::with_parts(MemoryCache::with_ttl(ttl), sqlite)
    }

    /// Memory-only cache
    pub fn memory_only(ttl: Duration) -> Self {
        Self::with_parts(MemoryCache::with_ttl(ttl), None)
    }

    pub fn with_parts(memory: MemoryCache, sqlite: Option<Arc<SqliteCache>>) -> Self {
        Self::spawn_cleanup_task(memory.clone(), sqlite.clone());
        Self { memory, sqlite }
    }

    fn open_sqlite(config: &CacheConfig) -> anyhow::Result<SqliteCache> {
        let path: PathBuf = match &config.path {
            Some(path) => path.clone(),
            None => SqliteCache::default_path()?,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        SqliteCache::open(&path, config.ttl_secs)
    }

    pub fn stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Periodically drop expired entries; a no-op outside a tokio runtime
    fn spawn_cleanup_task(memory: MemoryCache, sqlite: Option<Arc<SqliteCache>>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        handle.spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            interval.tick().await; // Skip immediate first tick

            loop {
                interval.tick().await;

                let stats = memory.stats();
                let removed = memory.cleanup_expired();
                if removed > 0 {
                    tracing::info!(
                        "Background cleanup: removed {} expired entries from memory cache (was: {})",
                        removed,
                        stats
                    );
                }

                if let Some(ref sqlite) = sqlite
                    && let Ok(rows) = sqlite.cleanup_expired()
                    && rows > 0
                {
                    tracing::info!(
                        "Background cleanup: removed {} expired entries from SQLite cache",
                        rows
                    );
                }
            }
        });
    }
}

impl ReadCache for HybridCache {
    fn get(&self, component_id: &str) -> Option<NodeInfo> {
        if let Some(info) = self.memory.get(component_id) {
            return Some(info);
        }
        if let Some(ref sqlite) = self.sqlite
            && let Some(info) = sqlite.get(component_id)
        {
            self.memory.put(component_id.to_string(), info.clone());
            return Some(info);
        }
        None
    }

    fn get_issue(&self, issue_id: &str) -> Option<IssueRecord> {
        if let Some(record) = self.memory.get_issue(issue_id) {
            return Some(record);
        }
        let record = self.sqlite.as_ref()?.get_issue(issue_id)?;
        self.memory.put_issue(record.clone());
        Some(record)
    }

    fn get_license(&self, name: &str) -> Option<LicenseRecord> {
        if let Some(record) = self.memory.get_license(name) {
            return Some(record);
        }
        let record = self.sqlite.as_ref()?.get_license(name)?;
        self.memory.put_license(record.clone());
        Some(record)
    }
}

impl WriteCache for HybridCache {
    fn put(&self, component_id: String, info: NodeInfo) {
        if let Some(ref sqlite) = self.sqlite {
            sqlite.put(component_id.clone(), info.clone());
        }
        self.memory.put(component_id, info);
    }

    fn put_issue(&self, record: IssueRecord) {
        if let Some(ref sqlite) = self.sqlite {
            sqlite.put_issue(record.clone());
        }
        self.memory.put_issue(record);
    }

    fn put_license(&self, record: LicenseRecord) {
        if let Some(ref sqlite) = self.sqlite {
            sqlite.put_license(record.clone());
        }
        self.memory.put_license(record);
    }

    fn remove(&self, component_id: &str) {
        self.memory.remove(component_id);
        if let Some(ref sqlite) = self.sqlite {
            sqlite.remove(component_id);
        }
    }

    fn clear(&self) {
        self.memory.clear();
        if let Some(ref sqlite) = self.sqlite {
            sqlite.clear();
        }
    }
}
