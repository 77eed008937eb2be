//! In-memory cost ledger implementation.

use super::{CostFilter, CostLedger, CostRecord};
use crate::error::{NotesError, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory cost ledger, used in tests and dry runs.
pub struct MemoryLedger {
    records: RwLock<Vec<CostRecord>>,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CostLedger for MemoryLedger {
    async fn record(&self, record: CostRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| NotesError::Ledger(format!("lock poisoned: {}", e)))?;
        records.push(record);
        Ok(())
    }

    async fn total(&self, filter: &CostFilter) -> Result<f64> {
        let records = self
            .records
            .read()
            .map_err(|e| NotesError::Ledger(format!("lock poisoned: {}", e)))?;
        Ok(records
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| r.amount)
            .sum())
    }

    async fn records(&self, filter: &CostFilter) -> Result<Vec<CostRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| NotesError::Ledger(format!("lock poisoned: {}", e)))?;
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    async fn clear(&self) -> Result<usize> {
        let mut records = self
            .records
            .write()
            .map_err(|e| NotesError::Ledger(format!("lock poisoned: {}", e)))?;
        let count = records.len();
        records.clear();
        Ok(count)
    }
}
