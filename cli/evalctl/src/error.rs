//! Error handling and display for the CLI.

use colored::Colorize;
use evalwatch_monitor::ApiError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
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

    #[error("Invalid output format {0:?} (expected table or json)")]
    InvalidFormat(String),
}

impl CliError {
    /// The API error behind this one, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::ReadEvaluation(err) | Self::ReadAllocations(err) => Some(err),
            Self::QueryAllocation { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let api_err = err
        .downcast_ref::<CliError>()
        .and_then(CliError::api_error)
        .or_else(|| err.downcast_ref::<ApiError>());

    if let Some(hint) = api_err.and_then(hint) {
        eprintln!("\n{}", hint.yellow());
    }
}

fn hint(err: &ApiError) -> Option<&'static str> {
    match err {
        ApiError::Transport(_) => {
            Some("Hint: Check that the API address is reachable (--address or EVALCTL_ADDR).")
        }
        ApiError::Status { status: 401, .. } | ApiError::Status { status: 403, .. } => {
            Some("Hint: The request was denied. Check your ACL token (--token or EVALCTL_TOKEN).")
        }
        ApiError::NotFound(_) => Some("Hint: Check the ID; prefixes are not expanded."),
        _ => None,
    }
}
