//! Evaluation commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use evalwatch_monitor::{
    format_placement_failure, AllocationStub, DesiredStatus, Evaluation, EvaluationSource, Monitor,
    QueryOptions,
};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::watch;
use tracing::debug;

use crate::client::ApiClient;
use crate::config::Overrides;
use crate::error::CliError;
use crate::output::{print_output, print_single, ConsoleSink, OutputFormat};

use super::CommandContext;

/// Evaluation commands.
#[derive(Debug, Args)]
pub struct EvalCommand {
    #[command(subcommand)]
    command: EvalSubcommand,
}

#[derive(Debug, Subcommand)]
enum EvalSubcommand {
    /// Follow an evaluation until it settles.
    ///
    /// Exits 0 when every allocation was placed, 2 when some placements
    /// failed, and 1 on errors, timeout or interruption.
    Monitor(MonitorArgs),

    /// Show an evaluation and its allocations.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
struct MonitorArgs {
    /// Evaluation ID.
    eval_id: String,

    /// Give up after this many seconds (0 waits forever).
    #[arg(long)]
    timeout: Option<u64>,

    /// Seconds between polls when blocking queries are unavailable.
    #[arg(long)]
    poll_interval: Option<u64>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Evaluation ID.
    eval_id: String,
}

impl EvalCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<i32> {
        match self.command {
            EvalSubcommand::Monitor(args) => monitor(ctx, args).await,
            EvalSubcommand::Status(args) => status(ctx, args).await.map(|()| 0),
        }
    }
}

async fn monitor(ctx: CommandContext, args: MonitorArgs) -> Result<i32> {
    let config = ctx.config.with_overrides(Overrides {
        poll_interval_secs: args.poll_interval,
        timeout_secs: args.timeout,
        ..Overrides::default()
    });
    let client = ApiClient::new(&config)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received");
            let _ = cancel_tx.send(true);
        }
    });

    let mut monitor = Monitor::new(client, ConsoleSink::stdio(), config.monitor_config())
        .with_cancellation(cancel_rx);
    let status = monitor.monitor(&args.eval_id).await;

    ctrl_c.abort();
    Ok(status.code())
}

/// Allocation row in the status table.
#[derive(Debug, Clone, Serialize, Tabled)]
struct AllocationRow {
    #[tabled(rename = "ID")]
    id: String,

    #[tabled(rename = "Node")]
    node: String,

    #[tabled(rename = "Group")]
    task_group: String,

    #[tabled(rename = "Desired")]
    desired: String,

    #[tabled(rename = "Client")]
    client: String,

    #[tabled(rename = "Created")]
    create_index: u64,
}

impl From<&AllocationStub> for AllocationRow {
    fn from(stub: &AllocationStub) -> Self {
        Self {
            id: stub.id.clone(),
            node: display_or_dash(&stub.node_id),
            task_group: stub.task_group.clone(),
            desired: stub.desired_status.to_string(),
            client: stub.client_status.to_string(),
            create_index: stub.create_index,
        }
    }
}

#[derive(Debug, Serialize)]
struct EvalStatusOutput<'a> {
    evaluation: &'a Evaluation,
    allocations: &'a [AllocationStub],
}

async fn status(ctx: CommandContext, args: StatusArgs) -> Result<()> {
    let client = ctx.client()?;

    let (evaluation, _) = client
        .evaluation(&args.eval_id, &QueryOptions::default())
        .await
        .map_err(CliError::ReadEvaluation)?;
    let (allocations, _) = client
        .allocations(&evaluation.id, &QueryOptions::default())
        .await
        .map_err(CliError::ReadAllocations)?;

    if ctx.format == OutputFormat::Json {
        print_single(&EvalStatusOutput {
            evaluation: &evaluation,
            allocations: &allocations,
        });
        return Ok(());
    }

    print_evaluation(&evaluation);

    println!("ALLOCATIONS");
    let rows: Vec<AllocationRow> = allocations.iter().map(AllocationRow::from).collect();
    print_output(&rows, OutputFormat::Table);

    for stub in allocations
        .iter()
        .filter(|stub| stub.desired_status == DesiredStatus::Failed)
    {
        let alloc = client
            .allocation(&stub.id)
            .await
            .map_err(|source| CliError::QueryAllocation {
                alloc_id: stub.id.clone(),
                source,
            })?;

        println!();
        println!("Placement failure for group {:?}", alloc.task_group);
        for line in format_placement_failure(alloc.metrics.as_ref()) {
            println!("  * {}", line);
        }
    }

    Ok(())
}

fn print_evaluation(evaluation: &Evaluation) {
    println!("ID:           {}", evaluation.id);
    println!("Status:       {}", evaluation.status);
    if !evaluation.status_description.is_empty() {
        println!("Description:  {}", evaluation.status_description);
    }
    println!("Triggered By: {}", display_or_dash(&evaluation.triggered_by));
    println!("Trigger:      {}", evaluation.trigger());
    println!("Next Eval:    {}", display_or_dash(&evaluation.next_eval));
    println!("Blocked Eval: {}", display_or_dash(&evaluation.blocked_eval));
    println!();
}

fn display_or_dash(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use evalwatch_monitor::ClientStatus;

    use super::*;

    #[test]
    fn test_allocation_row() {
        let stub = AllocationStub {
            id: "alloc1".to_string(),
            eval_id: "eval1".to_string(),
            job_id: "web".to_string(),
            task_group: "frontend".to_string(),
            node_id: String::new(),
            desired_status: DesiredStatus::Failed,
            desired_description: "failed to place".to_string(),
            client_status: ClientStatus::Failed,
            client_description: String::new(),
            create_index: 12,
            modify_index: 12,
        };

        let row = AllocationRow::from(&stub);
        assert_eq!(row.node, "-");
        assert_eq!(row.desired, "failed");
        assert_eq!(row.client, "failed");

        let table = tabled::Table::new([row]).to_string();
        assert!(table.contains("alloc1"));
        assert!(table.contains("Desired"));
    }
}
