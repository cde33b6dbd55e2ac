use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::types::QueryResult;

/// SQLite-backed result cache shared by concurrent runs.
///
/// The cache is advisory: read and write failures are logged and reported
/// as a miss, never returned to the caller.
#[derive(Clone)]
pub struct ResultCache {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS result_cache (
    key TEXT PRIMARY KEY,
    results TEXT NOT NULL,
    created_at TEXT NOT NULL
);";

impl ResultCache {
    /// Open or create a cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TenderError::Cache(format!("Failed to create cache directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| TenderError::Cache(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TenderError::Cache(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| TenderError::Cache(e.to_string()))?;

        debug!(path = %path.display(), "Result cache opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory cache (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| TenderError::Cache(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| TenderError::Cache(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Look up cached results. Any failure is a miss.
    pub async fn get(&self, key: &str) -> Option<Vec<QueryResult>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let lookup = tokio::task::spawn_blocking(move || read_entry(&conn, &key)).await;

        match lookup {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!(error = %e, "Cache read failed, treating as miss");
                None
            }
            Err(e) => {
                warn!(error = %e, "Cache read task failed, treating as miss");
                None
            }
        }
    }

    /// Store results under `key`, replacing any previous entry. Failures are logged.
    pub async fn put(&self, key: &str, results: &[QueryResult]) {
        let payload = match serde_json::to_string(results) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Cache entry could not be serialized");
                return;
            }
        };
        let conn = self.conn.clone();
        let key = key.to_string();
        let write = tokio::task::spawn_blocking(move || write_entry(&conn, &key, &payload)).await;

        match write {
            Ok(Ok(())) => debug!(count = results.len(), "Results cached"),
            Ok(Err(e)) => warn!(error = %e, "Cache write failed"),
            Err(e) => warn!(error = %e, "Cache write task failed"),
        }
    }
}

fn read_entry(conn: &Mutex<Connection>, key: &str) -> Result<Option<Vec<QueryResult>>> {
    let conn = conn.lock().map_err(|e| TenderError::Cache(e.to_string()))?;
    let payload: Option<String> = conn
        .query_row(
            "SELECT results FROM result_cache WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| TenderError::Cache(e.to_string()))?;

    match payload {
        Some(p) => Ok(Some(serde_json::from_str(&p)?)),
        None => Ok(None),
    }
}

fn write_entry(conn: &Mutex<Connection>, key: &str, payload: &str) -> Result<()> {
    let conn = conn.lock().map_err(|e| TenderError::Cache(e.to_string()))?;
    conn.execute(
        "INSERT OR REPLACE INTO result_cache (key, results, created_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, payload],
    )
    .map_err(|e| TenderError::Cache(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, score: f64) -> QueryResult {
        let mut content = serde_json::Map::new();
        content.insert("title".into(), json!(format!("Doc {}", id)));
        QueryResult::new(id, content, score).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResultCache::in_memory().unwrap();
        assert!(cache.get("k").await.is_none());

        let results = vec![result("1", 0.9), result("2", 0.8)];
        cache.put("k", &results).await;
        assert_eq!(cache.get("k").await.unwrap(), results);

        cache.put("k", &results[..1]).await;
        assert_eq!(cache.get("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_scores_keep_every_bit() {
        let cache = ResultCache::in_memory().unwrap();
        let results = vec![result("1", 0.9856906946328695), result("2", 0.1 + 0.2)];
        cache.put("k", &results).await;

        let cached = cache.get("k").await.unwrap();
        assert_eq!(cached, results);
        assert_eq!(cached[0].relevance_score().to_bits(), 0.9856906946328695f64.to_bits());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache/cache.db");
        {
            let cache = ResultCache::open(&path).unwrap();
            cache.put("k", &[result("1", 0.5)]).await;
        }
        let cache = ResultCache::open(&path).unwrap();
        assert_eq!(cache.get("k").await.unwrap()[0].node_id(), "1");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let cache = ResultCache::in_memory().unwrap();
        write_entry(&cache.conn, "bad", "{not json").unwrap();
        assert!(cache.get("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_table_is_a_miss_and_write_does_not_panic() {
        let cache = ResultCache::in_memory().unwrap();
        cache
            .conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE result_cache;")
            .unwrap();
        cache.put("k", &[result("1", 0.5)]).await;
        assert!(cache.get("k").await.is_none());
    }
}
