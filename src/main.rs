// ABOUTME: CLI entry point for gradebook-migrator
// ABOUTME: Parses commands, resolves connection settings and routes to handlers

use clap::{Args, Parser, Subcommand};
use gradebook_migrator::commands::{self, ReportFormat, RepairTarget};
use gradebook_migrator::config::{Overrides, Settings, SslMode};
use gradebook_migrator::migration::{LEGACY_COLUMN, LEGACY_TABLE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gradebook-migrator")]
#[command(about = "Repair and migrate the legacy SQLite gradebook to PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct ConnectionArgs {
    /// Path to a TOML config file with [source] and [destination] sections
    #[arg(long = "config", env = "MIGRATOR_CONFIG", global = true)]
    config_path: Option<PathBuf>,
    /// Path to the legacy SQLite database
    #[arg(long = "source", env = "SOURCE_DB_PATH", global = true)]
    source_path: Option<PathBuf>,
    /// Full PostgreSQL connection URL (takes precedence over the discrete fields)
    #[arg(long = "target", env = "MIGRATOR_DATABASE_URL", global = true)]
    url: Option<String>,
    #[arg(long, env = "DB_HOST", global = true)]
    host: Option<String>,
    #[arg(long, env = "DB_PORT", global = true)]
    port: Option<u16>,
    #[arg(long, env = "DB_USER", global = true)]
    user: Option<String>,
    #[arg(long, env = "DB_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
    #[arg(long = "dbname", env = "DB_NAME", global = true)]
    database: Option<String>,
    #[arg(long = "sslmode", env = "DB_SSLMODE", global = true, value_enum)]
    ssl_mode: Option<SslMode>,
}

impl ConnectionArgs {
    fn settings(&self) -> anyhow::Result<Settings> {
        let overrides = Overrides {
            source_path: self.source_path.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            ssl_mode: self.ssl_mode,
            url: self.url.clone(),
        };
        Settings::load(self.config_path.as_deref(), overrides)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Remove an obsolete column by rebuilding its table
    Repair {
        /// Which database holds the table
        #[arg(long = "on", value_enum, default_value_t = RepairTarget::Source)]
        target: RepairTarget,
        #[arg(long, default_value = LEGACY_TABLE)]
        table: String,
        #[arg(long, default_value = LEGACY_COLUMN)]
        column: String,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Copy every gradebook table from SQLite into PostgreSQL
    Migrate {
        /// Skip creating missing destination tables before loading
        #[arg(long)]
        no_create_schema: bool,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Compare per-table row counts between source and destination
    Verify {
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.connection.settings()?;

    match cli.command {
        Commands::Repair {
            target,
            table,
            column,
            format,
        } => commands::repair(&settings, target, &table, &column, format)
            .await
            .map(|_| ()),
        Commands::Migrate {
            no_create_schema,
            format,
        } => commands::migrate(&settings, !no_create_schema, format)
            .await
            .map(|_| ()),
        Commands::Verify { format } => commands::verify(&settings, format).await,
    }
}
