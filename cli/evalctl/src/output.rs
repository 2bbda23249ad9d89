//! Output formatting for CLI commands.

use std::io::{self, Write};
use std::str::FromStr;

use chrono::{DateTime, Local};
use colored::Colorize;
use evalwatch_monitor::OutputSink;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::CliError;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(CliError::InvalidFormat(other.to_string())),
        }
    }
}

/// Print data in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No allocations found.".dimmed());
            } else {
                let table = Table::new(data).to_string();
                println!("{}", table);
            }
        }
        OutputFormat::Json => {
            println!("{}", format_json(data, "[]"));
        }
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", format_json(data, "{}"));
}

fn format_json<T: Serialize + ?Sized>(data: &T, fallback: &str) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| fallback.to_string())
}

/// Terminal sink for monitor output.
///
/// Progress lines are stamped and highlighted, change events are indented
/// beneath them, and errors go to stderr.
pub struct ConsoleSink<O, E> {
    out: O,
    err: E,
    clock: fn() -> DateTime<Local>,
}

impl ConsoleSink<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write + Send, E: Write + Send> ConsoleSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            clock: Local::now,
        }
    }

    fn timestamp(&self) -> String {
        (self.clock)().format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    }
}

// Write errors on a closed terminal are dropped; there is nowhere to report them.
impl<O: Write + Send, E: Write + Send> OutputSink for ConsoleSink<O, E> {
    fn output(&mut self, line: &str) {
        let _ = writeln!(self.out, "    {}", line);
    }

    fn info(&mut self, line: &str) {
        let stamped = format!("==> {}: {}", self.timestamp(), line);
        let _ = writeln!(self.out, "{}", stamped.bold());
    }

    fn error(&mut self, line: &str) {
        let _ = writeln!(self.err, "{}", line.red());
    }
}
