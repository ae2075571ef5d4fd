use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oppscout_storage::pg;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "oppscout")]
#[command(about = "Opportunity Scout ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass over every enabled source.
    Sync,
    /// Apply the SQL migrations to DATABASE_URL.
    Migrate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_json = std::env::var("OPPSCOUT_LOG_JSON")
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false);
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current item");
                    on_signal.cancel();
                }
            });

            let summary = oppscout_sync::run_sync_once_from_env(cancel).await?;
            println!(
                "sync complete: run_id={} seen={} persisted={} deduplicated={} stale={} rejected={} notified={}{}",
                summary.run_id,
                summary.candidates_seen,
                summary.persisted,
                summary.deduplicated,
                summary.rejected_stale,
                summary.rejected_by_classifier,
                summary.notified,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
        }
        Commands::Migrate => {
            let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
            let pool = pg::connect(&database_url).await?;
            pg::run_migrations(&pool).await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
