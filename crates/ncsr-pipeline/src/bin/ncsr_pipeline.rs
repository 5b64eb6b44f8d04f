use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ncsr_core::{create_pool, run_migrations, Settings};
use ncsr_pipeline::{TieredProcessor, DEFAULT_FORM_TYPES};

/// **N-CSR Pipeline CLI**
///
/// Daily ingestion of SEC N-CSR / N-CSRS filings: per-date processing,
/// night-batch retries, and retention cleanup.
#[derive(Parser)]
#[command(name = "ncsr-pipeline")]
#[command(about = "Tiered SEC N-CSR filing ingestion pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process filings for a date (default: yesterday)
    Run {
        /// A specific date to process (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Number of past days to process, newest first
        #[arg(long, conflicts_with = "date")]
        backfill: Option<u32>,

        /// Maximum number of filings to process per day
        #[arg(long)]
        max_filings: Option<usize>,
    },

    /// Drain retry candidates from the dead-letter queue
    NightBatch {
        /// Maximum number of retry candidates
        #[arg(long)]
        size: Option<usize>,
    },

    /// Delete old completed/failed filings and exhausted queue entries
    Cleanup {
        /// Days of data to keep
        #[arg(long)]
        retention_days: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ncsr_pipeline=info,ncsr_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Argument errors exit 1; clap's default of 2 is reserved for
    // infrastructure failures here
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    let dates = match resolve_dates(&cli.command) {
        Ok(dates) => dates,
        Err(message) => {
            error!("{}", message);
            return ExitCode::from(1);
        }
    };

    match run(cli.command, settings, dates).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unrecoverable error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Argument validation happens before any infrastructure is touched so
/// argument errors exit 1 and infrastructure errors exit 2
fn resolve_dates(command: &Commands) -> Result<Vec<NaiveDate>, String> {
    let Commands::Run { date, backfill, .. } = command else {
        return Ok(Vec::new());
    };

    if let Some(date) = date {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date format for --date: {} (expected YYYY-MM-DD)", date))?;
        return Ok(vec![parsed]);
    }

    let today = Utc::now().date_naive();
    if let Some(days) = backfill {
        if *days == 0 {
            return Err("--backfill must be at least 1".to_string());
        }
        return Ok((0..*days).map(|i| today - Duration::days(i as i64)).collect());
    }

    // Default: yesterday's filings
    Ok(vec![today - Duration::days(1)])
}

async fn run(command: Commands, settings: Settings, dates: Vec<NaiveDate>) -> Result<()> {
    run_migrations(&settings.database_url).await?;
    let pool = create_pool(&settings.database_url).await?;

    let batch_size = settings.night_batch_size;
    let retention_days = settings.data_retention_days;
    let mut processor = TieredProcessor::new(pool, settings)?;

    match command {
        Commands::Run { max_filings, .. } => {
            let form_types: Vec<String> =
                DEFAULT_FORM_TYPES.iter().map(|s| s.to_string()).collect();

            for date in dates {
                let summary = processor
                    .process_date(date, &form_types, max_filings)
                    .await?;
                info!(
                    %date,
                    discovered = summary.discovered,
                    already_known = summary.already_known,
                    attempted = summary.attempted,
                    completed = summary.completed,
                    failed = summary.failed,
                    dead_lettered = summary.dead_lettered,
                    "Finished processing date"
                );
            }
        }

        Commands::NightBatch { size } => {
            let summary = processor
                .process_night_batch(size.unwrap_or(batch_size))
                .await?;
            info!(
                processed = summary.processed,
                successful = summary.successful,
                failed = summary.failed,
                "Night batch finished"
            );
        }

        Commands::Cleanup {
            retention_days: requested,
        } => {
            let summary = processor
                .cleanup(requested.unwrap_or(retention_days))
                .await?;
            info!(
                filings = summary.filings_deleted,
                results = summary.results_deleted,
                dlq_entries = summary.dlq_entries_deleted,
                "Cleanup finished"
            );
        }
    }

    Ok(())
}
