//! evalctl - watch scheduler evaluations until they settle.
//!
//! Exit codes follow the monitor: 0 when every allocation was placed,
//! 2 when placements failed, 1 on any error.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod client;
mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.log_filter().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let code = match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            error::print_error(&e);
            1
        }
    };

    std::process::exit(code);
}
