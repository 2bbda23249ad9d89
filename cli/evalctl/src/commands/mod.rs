//! CLI commands.

mod alloc;
mod eval;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use crate::client::ApiClient;
use crate::config::{Config, Overrides};
use crate::output::OutputFormat;

/// evalctl - Watch scheduler evaluations until they settle.
#[derive(Debug, Parser)]
#[command(name = "evalctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address of the orchestrator API.
    #[arg(long, global = true, env = "EVALCTL_ADDR")]
    address: Option<String>,

    /// ACL token sent with every request.
    #[arg(long, global = true, env = "EVALCTL_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Inspect and monitor evaluations.
    Eval(eval::EvalCommand),

    /// Inspect allocations.
    Alloc(alloc::AllocCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Default log filter for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }

    /// Run the CLI command and return the process exit code.
    pub async fn run(self) -> Result<i32> {
        if self.no_color {
            colored::control::set_override(false);
        }

        let format: OutputFormat = self.format.parse()?;

        let config = Config::load()?.with_overrides(Overrides {
            address: self.address,
            token: self.token,
            ..Overrides::default()
        });

        let ctx = CommandContext { config, format };

        match self.command {
            Commands::Eval(cmd) => cmd.run(ctx).await,
            Commands::Alloc(cmd) => cmd.run(ctx).await.map(|()| 0),
            Commands::Version => {
                println!("evalctl {}", env!("CARGO_PKG_VERSION"));
                Ok(0)
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Get an API client for the configured address.
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_monitor_with_global_flags() {
        let cli = Cli::try_parse_from([
            "evalctl",
            "eval",
            "monitor",
            "eval1",
            "--address",
            "http://10.0.0.1:4646",
            "--timeout",
            "60",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.address.as_deref(), Some("http://10.0.0.1:4646"));
        assert_eq!(cli.log_filter(), "debug");
        assert!(matches!(cli.command, Commands::Eval(_)));
    }

    #[test]
    fn test_monitor_requires_eval_id() {
        assert!(Cli::try_parse_from(["evalctl", "eval", "monitor"]).is_err());
    }
}
