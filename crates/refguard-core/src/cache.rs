//! SQLite-based query result cache for database lookups.
//!
//! Caches `(title, db_name) -> DbQueryResult` to avoid redundant network
//! requests when re-checking the same papers. Errors are never cached.
//! Positive (found) and negative (not-found) results carry independently
//! configurable TTLs, since a paper that doesn't exist yet is far more
//! likely to appear later than one that's already indexed to disappear.

use crate::db::DbQueryResult;
use crate::matching::normalize_title;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default TTL for results where the title was found (7 days).
pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default TTL for results where the title was not found (24 hours).
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A query result cache, optionally backed by a persistent SQLite file.
///
/// Thread-safe via `Mutex<Connection>`. All SQLite operations silently log
/// and swallow errors rather than propagating them, so the cache never
/// blocks validation — a corrupt or unwritable cache just behaves as an
/// always-miss cache.
pub struct QueryCache {
    conn: Mutex<Connection>,
    persistent: bool,
    positive_ttl: Duration,
    negative_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("persistent", &self.persistent)
            .field("positive_ttl", &self.positive_ttl)
            .field("negative_ttl", &self.negative_ttl)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL)
    }
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS query_cache (
    db_name     TEXT NOT NULL,
    norm_title  TEXT NOT NULL,
    found_title TEXT,
    authors     TEXT NOT NULL DEFAULT '[]',
    paper_url   TEXT,
    retraction  TEXT,
    cached_at   INTEGER NOT NULL,
    ttl_secs    INTEGER NOT NULL,
    PRIMARY KEY (db_name, norm_title)
)";

impl QueryCache {
    /// Create an in-memory-only cache (never touches disk).
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        let conn = Connection::open_in_memory().expect("in-memory sqlite connection");
        conn.execute_batch(SCHEMA)
            .expect("create in-memory cache schema");
        Self {
            conn: Mutex::new(conn),
            persistent: false,
            positive_ttl,
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open (or create) a persistent cache database at the given path.
    pub fn open(
        path: &Path,
        positive_ttl: Duration,
        negative_ttl: Duration,
    ) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            persistent: true,
            positive_ttl,
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Whether this cache is backed by an on-disk file.
    pub fn has_persistence(&self) -> bool {
        self.persistent
    }

    pub fn positive_ttl(&self) -> Duration {
        self.positive_ttl
    }

    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Look up a cached result. Returns `None` on miss or expiry.
    pub fn get(&self, title: &str, db_name: &str) -> Option<DbQueryResult> {
        let norm = normalize_title(title);
        let now = now_epoch();
        let conn = self.conn.lock().ok()?;

        let result = conn.query_row(
            "SELECT found_title, authors, paper_url, retraction, cached_at, ttl_secs
             FROM query_cache
             WHERE db_name = ?1 AND norm_title = ?2",
            rusqlite::params![db_name, norm],
            |row| {
                let found_title: Option<String> = row.get(0)?;
                let authors_json: String = row.get(1)?;
                let paper_url: Option<String> = row.get(2)?;
                let retraction_json: Option<String> = row.get(3)?;
                let cached_at: i64 = row.get(4)?;
                let ttl_secs: i64 = row.get(5)?;
                Ok((
                    found_title,
                    authors_json,
                    paper_url,
                    retraction_json,
                    cached_at,
                    ttl_secs,
                ))
            },
        );

        match result {
            Ok((found_title, authors_json, paper_url, retraction_json, cached_at, ttl_secs)) => {
                if now - cached_at > ttl_secs {
                    let _ = conn.execute(
                        "DELETE FROM query_cache WHERE db_name = ?1 AND norm_title = ?2",
                        rusqlite::params![db_name, norm],
                    );
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }

                let authors: Vec<String> =
                    serde_json::from_str(&authors_json).unwrap_or_default();
                let retraction = retraction_json.and_then(|j| serde_json::from_str(&j).ok());
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(DbQueryResult {
                    found_title,
                    authors,
                    paper_url,
                    retraction,
                })
            }
            Err(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result in the cache. Only call for `Ok(...)` adapter results —
    /// never cache errors, timeouts, or rate-limit responses.
    pub fn insert(&self, title: &str, db_name: &str, result: &DbQueryResult) {
        let norm = normalize_title(title);
        let now = now_epoch();
        let ttl = if result.is_found() {
            self.positive_ttl.as_secs() as i64
        } else {
            self.negative_ttl.as_secs() as i64
        };

        let authors_json =
            serde_json::to_string(&result.authors).unwrap_or_else(|_| "[]".to_string());
        let retraction_json = result
            .retraction
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok());

        let Ok(conn) = self.conn.lock() else {
            return;
        };

        let _ = conn.execute(
            "INSERT OR REPLACE INTO query_cache
             (db_name, norm_title, found_title, authors, paper_url, retraction, cached_at, ttl_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                db_name,
                norm,
                result.found_title,
                authors_json,
                result.paper_url,
                retraction_json,
                now,
                ttl
            ],
        );
    }

    /// Remove all entries from the cache.
    pub fn clear(&self) {
        if let Ok(conn) = self.conn.lock() {
            let _ = conn.execute("DELETE FROM query_cache", []);
        }
    }

    /// Remove expired entries.
    pub fn evict_expired(&self) {
        let now = now_epoch();
        if let Ok(conn) = self.conn.lock() {
            let _ = conn.execute(
                "DELETE FROM query_cache WHERE (cached_at + ttl_secs) < ?1",
                rusqlite::params![now],
            );
        }
    }

    /// Return the number of cached entries (for diagnostics).
    pub fn len(&self) -> usize {
        let Ok(conn) = self.conn.lock() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
