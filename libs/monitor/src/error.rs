//! Errors that end a monitoring session.

use std::time::Duration;

use thiserror::Error;

use crate::client::ApiError;

/// Reasons a monitoring session stops without reaching a terminal evaluation.
///
/// Scheduling failures are not errors: they are an observed outcome and are
/// reported through diagnostics and the exit status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Error reading evaluation: {0}")]
    ReadEvaluation(#[source] ApiError),

    #[error("Error reading allocations: {0}")]
    ReadAllocations(#[source] ApiError),

    #[error("Error querying allocation {alloc_id:?}: {source}")]
    QueryAllocation {
        alloc_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Monitoring evaluation {eval_id:?} timed out after {elapsed:?}")]
    TimedOut { eval_id: String, elapsed: Duration },

    #[error("Monitoring evaluation {eval_id:?} cancelled")]
    Cancelled { eval_id: String },
}

impl MonitorError {
    /// Returns true if the session was stopped from outside.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::Cancelled { .. })
    }
}
