// ABOUTME: Command implementations for the gradebook migration
// ABOUTME: Exports repair, migrate, and verify commands and their output format

pub mod migrate;
pub mod repair;
pub mod verify;

pub use migrate::migrate;
pub use repair::{repair, RepairTarget};
pub use verify::verify;

/// Output format for a command's final result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Print `value` as pretty JSON on stdout
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    use anyhow::Context;

    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}
