//! Pre-flight checks before expensive operations.
//!
//! Validates required configuration before starting operations that would
//! otherwise fail midway through paid API calls.

use crate::error::{NotesError, Result};
use crate::openai::is_api_key_configured;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Full processing needs an API key for transcription and extraction.
    Process,
    /// Cost and cache maintenance need no external services.
    Maintenance,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation) -> Result<()> {
    match operation {
        Operation::Process => check_api_key(),
        Operation::Maintenance => Ok(()),
    }
}

/// Check if the OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    if is_api_key_configured() {
        Ok(())
    } else {
        Err(NotesError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_has_no_requirements() {
        assert!(check(Operation::Maintenance).is_ok());
    }
}
