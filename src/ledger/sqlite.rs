//! SQLite-backed cost ledger implementation.

use super::{CostFilter, CostLedger, CostRecord, OperationKind};
use crate::error::{NotesError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// SQLite-backed cost ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) a ledger database at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        info!("Opened cost ledger at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cost_records (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                provider TEXT NOT NULL,
                amount REAL NOT NULL,
                episode_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cost_records_episode ON cost_records(episode_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| NotesError::Ledger(format!("Failed to acquire lock: {}", e)))
    }

    /// Build the WHERE clause and parameters for a filter.
    fn filter_clause(filter: &CostFilter) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(kind) = filter.kind {
            clauses.push(format!("kind = ?{}", values.len() + 1));
            values.push(kind.to_string());
        }
        if let Some(ref episode_id) = filter.episode_id {
            clauses.push(format!("episode_id = ?{}", values.len() + 1));
            values.push(episode_id.clone());
        }
        if let Some(since) = filter.since {
            clauses.push(format!("recorded_at >= ?{}", values.len() + 1));
            values.push(since.to_rfc3339());
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

#[async_trait]
impl CostLedger for SqliteLedger {
    async fn record(&self, record: CostRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO cost_records (id, kind, provider, amount, episode_id, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id.to_string(),
                record.kind.to_string(),
                record.provider,
                record.amount,
                record.episode_id,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn total(&self, filter: &CostFilter) -> Result<f64> {
        let conn = self.lock()?;
        let (clause, values) = Self::filter_clause(filter);
        let sql = format!("SELECT COALESCE(SUM(amount), 0.0) FROM cost_records{}", clause);

        let total: f64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(total)
    }

    async fn records(&self, filter: &CostFilter) -> Result<Vec<CostRecord>> {
        let conn = self.lock()?;
        let (clause, values) = Self::filter_clause(filter);
        let sql = format!(
            "SELECT id, kind, provider, amount, episode_id, recorded_at FROM cost_records{} ORDER BY recorded_at",
            clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            let id: String = row.get(0)?;
            let kind: String = row.get(1)?;
            let provider: String = row.get(2)?;
            let amount: f64 = row.get(3)?;
            let episode_id: String = row.get(4)?;
            let recorded_at: String = row.get(5)?;
            Ok((id, kind, provider, amount, episode_id, recorded_at))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, kind, provider, amount, episode_id, recorded_at) = row?;
            records.push(CostRecord {
                id: Uuid::parse_str(&id)
                    .map_err(|e| NotesError::Ledger(format!("bad record id: {}", e)))?,
                kind: kind
                    .parse::<OperationKind>()
                    .map_err(NotesError::Ledger)?,
                provider,
                amount,
                episode_id,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|e| NotesError::Ledger(format!("bad timestamp: {}", e)))?
                    .with_timezone(&Utc),
            });
        }
        Ok(records)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM cost_records", [])?;
        Ok(removed)
    }
}
