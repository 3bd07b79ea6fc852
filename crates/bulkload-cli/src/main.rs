//! bulkload CLI
//!
//! Small non-interactive front end over the bulkload library. Connection
//! settings come from `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER`,
//! `DB_PASSWORD` and `DB_SCHEMA`.

use anyhow::Context;
use bulkload::prelude::*;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHECKUP_TABLE: &str = "daily_checkups";

#[derive(Parser)]
#[command(name = "bulkload")]
#[command(about = "Bulk loading, upsert and replace for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Schema searched before `public` (overrides DB_SCHEMA)
    #[arg(long, global = true)]
    schema: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record today's checkup note in public.daily_checkups
    Checkup {
        /// Free-text checkup note
        text: String,
    },

    /// Open a session and check that it is usable
    Ping,
}

fn factory(schema: Option<String>) -> anyhow::Result<Arc<PgConnectionFactory>> {
    let mut config =
        ConnectionConfig::from_env().context("reading connection settings from environment")?;
    if let Some(schema) = schema {
        config = config.with_app_schema(schema);
    }
    let factory = PgConnectionFactory::new(config).context("invalid connection settings")?;
    Ok(Arc::new(factory))
}

async fn checkup(factory: Arc<PgConnectionFactory>, text: String) -> anyhow::Result<()> {
    let today = chrono::Local::now().date_naive();
    let record = Record::new().with("entry_time", today).with("checkup", text);

    let outcome = BulkLoader::new(factory)
        .load(
            RowSource::records(vec![record]),
            &TargetTable::public(CHECKUP_TABLE),
            &LoadOptions::default(),
        )
        .await
        .with_context(|| format!("recording checkup in public.{}", CHECKUP_TABLE))?;

    println!("✓ Recorded {} checkup for {}", outcome.rows_affected(), today);
    Ok(())
}

async fn ping(factory: Arc<PgConnectionFactory>) -> anyhow::Result<()> {
    let config = factory.config();
    let target = format!("{}:{}/{}", config.host, config.port, config.database);

    let conn = factory
        .connect()
        .await
        .with_context(|| format!("connecting to {}", target))?;
    let valid = conn.is_valid().await;
    conn.close().await?;

    if !valid {
        anyhow::bail!("session to {} is not usable", target);
    }
    info!(%target, "ping ok");
    println!("✓ {} is reachable", target);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulkload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let factory = factory(cli.schema)?;

    match cli.command {
        Commands::Checkup { text } => checkup(factory, text).await,
        Commands::Ping => ping(factory).await,
    }
}
