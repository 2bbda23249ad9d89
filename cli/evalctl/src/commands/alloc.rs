//! Allocation commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use evalwatch_monitor::{dump_allocation_status, EvaluationSource};

use crate::error::CliError;
use crate::output::{print_single, ConsoleSink, OutputFormat};

use super::CommandContext;

/// Allocation commands.
#[derive(Debug, Args)]
pub struct AllocCommand {
    #[command(subcommand)]
    command: AllocSubcommand,
}

#[derive(Debug, Subcommand)]
enum AllocSubcommand {
    /// Show an allocation's status and placement metrics.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Allocation ID.
    alloc_id: String,
}

impl AllocCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            AllocSubcommand::Status(args) => status(ctx, args).await,
        }
    }
}

async fn status(ctx: CommandContext, args: StatusArgs) -> Result<()> {
    let client = ctx.client()?;
    let alloc = client
        .allocation(&args.alloc_id)
        .await
        .map_err(|source| CliError::QueryAllocation {
            alloc_id: args.alloc_id.clone(),
            source,
        })?;

    match ctx.format {
        OutputFormat::Json => print_single(&alloc),
        OutputFormat::Table => dump_allocation_status(&mut ConsoleSink::stdio(), &alloc),
    }

    Ok(())
}
