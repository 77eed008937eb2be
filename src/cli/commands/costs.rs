//! Costs command: show or clear the spend ledger.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::ledger::{CostFilter, CostLedger, OperationKind, SqliteLedger};

/// Show recorded costs, optionally filtered.
pub async fn run_costs_show(
    episode: Option<String>,
    kind: Option<String>,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Maintenance)?;
    let ledger = SqliteLedger::new(&settings.ledger_path())?;

    let kind = match kind {
        Some(k) => Some(
            k.parse::<OperationKind>()
                .map_err(crate::error::NotesError::InvalidInput)?,
        ),
        None => None,
    };
    let filter = CostFilter {
        kind,
        episode_id: episode,
        since: None,
    };

    let records = ledger.records(&filter).await?;
    if records.is_empty() {
        Output::info("No recorded costs.");
        return Ok(());
    }

    Output::header("Recorded costs");
    for record in &records {
        Output::list_item(&format!(
            "{} {} {} ${:.4} ({})",
            record.recorded_at.format("%Y-%m-%d %H:%M"),
            record.kind,
            record.episode_id,
            record.amount,
            record.provider,
        ));
    }

    let total = ledger.total(&filter).await?;
    Output::cost("Total", total);

    Ok(())
}

/// Clear all cost history.
pub async fn run_costs_clear(settings: Settings) -> Result<()> {
    preflight::check(Operation::Maintenance)?;
    let ledger = SqliteLedger::new(&settings.ledger_path())?;
    let removed = ledger.clear().await?;
    Output::success(&format!("Cleared {} cost records.", removed));
    Ok(())
}
