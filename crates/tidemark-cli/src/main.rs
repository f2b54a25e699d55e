mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tidemark::config::{DEFAULT_CHUNK_SIZE, DEFAULT_MIGRATIONS_DIR, DEFAULT_MIGRATIONS_TABLE};
use tidemark::MigrationKind;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::migrate::{self, MigrateOptions};

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "Apply, revert and scaffold ordered database migrations")]
#[command(version)]
struct Cli {
    /// Database connection URL (postgres://... or sqlite:...)
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory holding migration files
    #[arg(long, global = true, env = "TIDEMARK_MIGRATIONS_DIR", default_value = DEFAULT_MIGRATIONS_DIR)]
    dir: PathBuf,

    /// Name of the ledger table
    #[arg(long, global = true, env = "TIDEMARK_MIGRATIONS_TABLE", default_value = DEFAULT_MIGRATIONS_TABLE)]
    table: String,

    /// Maximum number of names per ledger lookup
    #[arg(long, global = true, env = "TIDEMARK_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Up,

    /// Apply a single migration
    UpOne {
        /// Migration name, e.g. 1542299549_create_users
        name: String,
    },

    /// Revert a single migration
    Down {
        /// Migration name, e.g. 1542299549_create_users
        name: String,
    },

    /// Show applied and pending migrations
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration file
    Make {
        /// Migration name, e.g. create_users
        name: String,

        /// Create a Rust migration stub, to be registered by the host application,
        /// instead of a SQL file
        #[arg(long)]
        rust: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_logging(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?,
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr))
            .try_init()?,
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    let options = MigrateOptions::new(cli.database_url, cli.dir, cli.table, cli.chunk_size)?;

    match cli.command {
        Commands::Up => migrate::up(&options).await?,
        Commands::UpOne { name } => migrate::up_one(&options, &name).await?,
        Commands::Down { name } => migrate::down(&options, &name).await?,
        Commands::Status { json } => migrate::status(&options, json).await?,
        Commands::Make { name, rust } => {
            let kind = if rust { MigrationKind::Rust } else { MigrationKind::Sql };
            migrate::make(&options, &name, kind)?
        }
    }

    Ok(())
}
