//! Append-only cost ledger.
//!
//! Every priced operation (transcription, extraction, interview turn)
//! appends a record here. Records are never mutated; the only destructive
//! operation is an explicit bulk clear.

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of priced operation a record covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Transcription,
    Extraction,
    Interview,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Transcription => write!(f, "transcription"),
            OperationKind::Extraction => write!(f, "extraction"),
            OperationKind::Interview => write!(f, "interview"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transcription" => Ok(OperationKind::Transcription),
            "extraction" => Ok(OperationKind::Extraction),
            "interview" => Ok(OperationKind::Interview),
            _ => Err(format!("Unknown operation kind: {}", s)),
        }
    }
}

/// A single priced operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Record ID.
    pub id: Uuid,
    /// What kind of operation incurred the cost.
    pub kind: OperationKind,
    /// Provider that charged it.
    pub provider: String,
    /// Amount in USD.
    pub amount: f64,
    /// Episode the operation ran for.
    pub episode_id: String,
    /// When the cost was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl CostRecord {
    /// Create a new record stamped with the current time.
    pub fn new(kind: OperationKind, provider: &str, amount: f64, episode_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            provider: provider.to_string(),
            amount,
            episode_id: episode_id.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Filter for ledger queries. All fields are conjunctive; None matches all.
#[derive(Debug, Clone, Default)]
pub struct CostFilter {
    pub kind: Option<OperationKind>,
    pub episode_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl CostFilter {
    pub(crate) fn matches(&self, record: &CostRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(ref episode_id) = self.episode_id {
            if &record.episode_id != episode_id {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        true
    }
}

/// Trait for cost ledger implementations.
#[async_trait]
pub trait CostLedger: Send + Sync {
    /// Append a record.
    async fn record(&self, record: CostRecord) -> Result<()>;

    /// Sum of all recorded amounts matching the filter.
    async fn total(&self, filter: &CostFilter) -> Result<f64>;

    /// All records matching the filter, in append order.
    async fn records(&self, filter: &CostFilter) -> Result<Vec<CostRecord>>;

    /// Remove all records. Explicit, user-invoked only.
    async fn clear(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matching() {
        let record = CostRecord::new(OperationKind::Extraction, "openai", 0.01, "ep1");

        assert!(CostFilter::default().matches(&record));
        assert!(CostFilter {
            kind: Some(OperationKind::Extraction),
            ..Default::default()
        }
        .matches(&record));
        assert!(!CostFilter {
            kind: Some(OperationKind::Transcription),
            ..Default::default()
        }
        .matches(&record));
        assert!(!CostFilter {
            episode_id: Some("other".to_string()),
            ..Default::default()
        }
        .matches(&record));
    }

    #[test]
    fn test_operation_kind_parse() {
        assert_eq!(
            "extraction".parse::<OperationKind>().unwrap(),
            OperationKind::Extraction
        );
        assert!("mystery".parse::<OperationKind>().is_err());
    }
}
