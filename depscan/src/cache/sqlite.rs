//! SQLite persistent cache for scan results

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ReadCache, WriteCache};
use crate::model::{IssueRecord, LicenseRecord, NodeInfo};

/// Bumped whenever the stored JSON shape changes; older databases are reset
const SCHEMA_VERSION: i64 = 1;

const COMPONENT_PREFIX: &str = "component:";
const ISSUE_PREFIX: &str = "issue:";
const LICENSE_PREFIX: &str = "license:";

/// SQLite-backed key/value store of JSON documents with per-entry TTL
pub struct SqliteCache {
    conn: Mutex<Connection>,
    ttl_secs: i64,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`
    pub fn open(path: &Path, ttl_secs: u64) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;",
        )?;
        let cache = Self::with_connection(conn, ttl_secs)?;
        let removed = cache.cleanup_expired()?;
        tracing::debug!(path = %path.display(), removed, "SQLite cache opened");
        Ok(cache)
    }

    /// In-memory database, mostly for tests
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(
            Connection::open_in_memory()?,
            super::DEFAULT_TTL.as_secs(),
        )
    }

    fn with_connection(conn: Connection, ttl_secs: u64) -> anyhow::Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        })
    }

    /// `<user cache dir>/depscan/cache.db`
    pub fn default_path() -> anyhow::Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?;
        Ok(cache_dir.join("depscan").join("cache.db"))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let conn = self.conn.lock().ok()?;
        let now = current_timestamp();

        let row: Option<(String, i64, i64)> = conn
            .query_row(
                "SELECT data, inserted_at, ttl_secs FROM entries WHERE key = ?",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .ok()
            .flatten();

        let (data, inserted_at, ttl_secs) = row?;
        if now > inserted_at.saturating_add(ttl_secs) {
            let _ = conn.execute("DELETE FROM entries WHERE key = ?", [key]);
            return None;
        }
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key = %key, "Dropping undecodable cache entry: {}", e);
                let _ = conn.execute("DELETE FROM entries WHERE key = ?", [key]);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: String, value: &T) {
        let Ok(conn) = self.conn.lock() else {
            return;
        };
        let data = match serde_json::to_string(value) {
            Ok(d) => d,
            Err(_) => return,
        };
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO entries (key, data, inserted_at, ttl_secs) VALUES (?, ?, ?, ?)",
            params![key, data, current_timestamp(), self.ttl_secs],
        ) {
            tracing::warn!(key = %key, "Failed to write cache entry: {}", e);
        }
    }

    fn delete(&self, key: &str) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return false;
        };
        conn.execute("DELETE FROM entries WHERE key = ?", [key])
            .map(|rows| rows > 0)
            .unwrap_or(false)
    }

    /// Remove every entry, returning the number of rows deleted
    pub fn clear_all(&self) -> anyhow::Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("cache connection lock poisoned"))?;
        Ok(conn.execute("DELETE FROM entries", [])?)
    }

    /// Remove expired entries from the cache
    pub fn cleanup_expired(&self) -> anyhow::Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("cache connection lock poisoned"))?;
        let rows = conn.execute(
            "DELETE FROM entries WHERE inserted_at + ttl_secs < ?",
            [current_timestamp()],
        )?;
        Ok(rows)
    }

    /// Number of stored rows, expired ones included
    pub fn len(&self) -> usize {
        self.conn
            .lock()
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get::<_, i64>(0))
                    .ok()
            })
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        if version != 0 {
            tracing::info!(
                from = version,
                to = SCHEMA_VERSION,
                "Cache schema changed, discarding cached results"
            );
        }
        conn.execute_batch("DROP TABLE IF EXISTS entries;")?;
    }
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            inserted_at INTEGER NOT NULL,
            ttl_secs INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_expiry ON entries(inserted_at, ttl_secs)",
        [],
    )?;
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    Ok(())
}

impl ReadCache for SqliteCache {
    fn get(&self, component_id: &str) -> Option<NodeInfo> {
        self.read(&format!("{COMPONENT_PREFIX}{component_id}"))
    }

    fn get_issue(&self, issue_id: &str) -> Option<IssueRecord> {
        self.read(&format!("{ISSUE_PREFIX}{issue_id}"))
    }

    fn get_license(&self, name: &str) -> Option<LicenseRecord> {
        self.read(&format!("{LICENSE_PREFIX}{name}"))
    }
}

impl WriteCache for SqliteCache {
    fn put(&self, component_id: String, info: NodeInfo) {
        self.write(format!("{COMPONENT_PREFIX}{component_id}"), &info);
    }

    fn put_issue(&self, record: IssueRecord) {
        self.write(format!("{ISSUE_PREFIX}{}", record.issue_id), &record);
    }

    fn put_license(&self, record: LicenseRecord) {
        self.write(format!("{LICENSE_PREFIX}{}", record.name), &record);
    }

    fn remove(&self, component_id: &str) {
        self.delete(&format!("{COMPONENT_PREFIX}{component_id}"));
    }

    fn clear(&self) {
        if let Err(e) = self.clear_all() {
            tracing::warn!("Failed to clear SQLite cache: {}", e);
        }
    }
}

/// Get current Unix timestamp
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
