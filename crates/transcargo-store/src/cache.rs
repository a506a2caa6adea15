//! Key/value cache with per-entry TTL.
//!
//! Two backends: [`MemoryCache`] (per process) and the `cache_entries` table of
//! [`SqliteStore`] (shared by every process using the same database file).
//! Callers treat cache errors as misses.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rusqlite::{params, OptionalExtension};

use crate::sqlite::{db_err, SqliteStore, StoreTx};
use transcargo_core::time::{now, to_db};
use transcargo_core::Result;

pub trait Cache: Send + Sync {
    fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;

    fn set_json(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Increment an integer counter, creating it at 1 with `ttl` on first use.
    /// The expiry is not extended by later increments.
    fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;
}

// ---------------------------------------------------------------
// In-process backend
// ---------------------------------------------------------------

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Thread-safe in-memory cache with bounded size.
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    max_size: usize,
}

impl MemoryCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(max_size.min(1024)),
                max_size,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheInner {
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        let expired = self
            .entries
            .get(key)
            .map(|e| e.expires_at <= Instant::now())?;
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: &str, entry: CacheEntry) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_size {
            let now = Instant::now();
            self.entries.retain(|_, e| e.expires_at > now);
            // Still full: evict the entry closest to expiry
            if self.entries.len() >= self.max_size {
                if let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(key.to_string(), entry);
    }
}

impl Cache for MemoryCache {
    fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().live(key).map(|e| e.value.clone()))
    }

    fn set_json(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        self.inner.lock().insert(
            key,
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.lock().entries.remove(key);
        Ok(())
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.live(key) {
            let next = entry.value.as_i64().unwrap_or(0) + 1;
            entry.value = serde_json::Value::from(next);
            return Ok(next);
        }
        inner.insert(
            key,
            CacheEntry {
                value: serde_json::Value::from(1),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(1)
    }
}

// ---------------------------------------------------------------
// Shared backend
// ---------------------------------------------------------------

fn expiry(ttl: Duration) -> String {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
    to_db(&(now() + ttl))
}

/// Drop every expired row. Runs on each write so keys that are never
/// touched again (per-minute counters, old listing versions) do not pile up.
fn sweep(tx: &StoreTx<'_>, now_ts: &str) -> Result<usize> {
    tx.tx
        .prepare_cached("DELETE FROM cache_entries WHERE expires_at <= ?1")
        .map_err(db_err)?
        .execute(params![now_ts])
        .map_err(db_err)
}

impl Cache for SqliteStore {
    fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = self.read(|tx| {
            tx.tx
                .prepare_cached("SELECT value_json FROM cache_entries WHERE key = ?1 AND expires_at > ?2")
                .map_err(db_err)?
                .query_row(params![key, to_db(&now())], |row| row.get(0))
                .optional()
                .map_err(db_err)
        })?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    fn set_json(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        self.write(|tx| {
            sweep(tx, &to_db(&now()))?;
            tx.tx
                .prepare_cached(
                    "INSERT INTO cache_entries (key, value_json, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, expires_at = excluded.expires_at",
                )
                .map_err(db_err)?
                .execute(params![key, value.to_string(), expiry(ttl)])
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write(|tx| {
            tx.tx
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<i64> {
        self.write(|tx| {
            sweep(tx, &to_db(&now()))?;
            let current: Option<String> = tx
                .tx
                .prepare_cached("SELECT value_json FROM cache_entries WHERE key = ?1")
                .map_err(db_err)?
                .query_row(params![key], |row| row.get(0))
                .optional()
                .map_err(db_err)?;
            match current {
                Some(raw) => {
                    let next = raw.trim().parse::<i64>().unwrap_or(0) + 1;
                    tx.tx
                        .execute(
                            "UPDATE cache_entries SET value_json = ?2 WHERE key = ?1",
                            params![key, next.to_string()],
                        )
                        .map_err(db_err)?;
                    Ok(next)
                }
                None => {
                    tx.tx
                        .execute(
                            "INSERT INTO cache_entries (key, value_json, expires_at) VALUES (?1, '1', ?2)",
                            params![key, expiry(ttl)],
                        )
                        .map_err(db_err)?;
                    Ok(1)
                }
            }
        })
    }
}
