use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use tenderflow_core::error::{Result, TenderError};
use tenderflow_core::types::QueryResult;

/// On-disk representation of a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Pretty-printed JSON array, one object per result.
    Json,
    /// SQLite snapshot file, one row per result.
    Snapshot,
}

impl ResultFormat {
    /// Infer the format from a file extension (`.json`, `.db`).
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("db") | Some("sqlite") => Ok(Self::Snapshot),
            other => Err(TenderError::Store(format!(
                "cannot infer result format from extension {:?} of {}",
                other,
                path.display()
            ))),
        }
    }
}

fn store_err(e: rusqlite::Error) -> TenderError {
    TenderError::Store(e.to_string())
}

pub fn save_results(
    results: &[QueryResult],
    path: &Path,
    format: Option<ResultFormat>,
) -> Result<()> {
    let format = match format {
        Some(f) => f,
        None => ResultFormat::from_path(path)?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match format {
        ResultFormat::Json => {
            let json = serde_json::to_string_pretty(results)?;
            fs::write(path, json)?;
        }
        ResultFormat::Snapshot => write_snapshot(results, path)?,
    }

    info!(path = %path.display(), count = results.len(), ?format, "Results saved");
    Ok(())
}

pub fn load_results(path: &Path, format: Option<ResultFormat>) -> Result<Vec<QueryResult>> {
    let format = match format {
        Some(f) => f,
        None => ResultFormat::from_path(path)?,
    };

    if !path.exists() {
        return Err(TenderError::Store(format!(
            "result file not found: {}",
            path.display()
        )));
    }

    match format {
        ResultFormat::Json => {
            let content = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content)?)
        }
        ResultFormat::Snapshot => read_snapshot(path),
    }
}

fn write_snapshot(results: &[QueryResult], path: &Path) -> Result<()> {
    let mut conn = Connection::open(path).map_err(store_err)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS results (
            position INTEGER PRIMARY KEY,
            node_id TEXT NOT NULL,
            record TEXT NOT NULL
        );",
    )
    .map_err(store_err)?;

    let tx = conn.transaction().map_err(store_err)?;
    tx.execute("DELETE FROM results", []).map_err(store_err)?;
    for (i, result) in results.iter().enumerate() {
        tx.execute(
            "INSERT INTO results (position, node_id, record) VALUES (?1, ?2, ?3)",
            params![i as i64, result.node_id(), result.to_json()?],
        )
        .map_err(store_err)?;
    }
    tx.commit().map_err(store_err)
}

fn read_snapshot(path: &Path) -> Result<Vec<QueryResult>> {
    let conn = Connection::open(path).map_err(store_err)?;
    let mut stmt = conn
        .prepare("SELECT record FROM results ORDER BY position")
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(store_err)?;

    let mut results = Vec::new();
    for row in rows {
        let record = row.map_err(store_err)?;
        results.push(serde_json::from_str(&record)?);
    }
    Ok(results)
}
