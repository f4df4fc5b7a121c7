//! Newswire operational CLI.
//!
//! The scheduled-trigger surface for the pipeline: a cron job (or an
//! operator) invokes `newswire run --stage all` and reads the batch report
//! from stdout. Configuration comes from the environment (`DATABASE_URL`,
//! `FIRECRAWL_API_KEY`, `TWITTER_API_KEY`, `OPENAI_API_KEY`).

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use content_pipeline::providers::{
    FirecrawlScraper, OpenAiClassifier, OpenAiSummarizer, TwitterStream,
};
use content_pipeline::{PostgresStorage, RunCoordinator, StageSelection};
use firecrawl_client::FirecrawlClient;
use openai_client::OpenAIClient;
use twitterapi_client::TwitterApiClient;

#[derive(Parser)]
#[command(name = "newswire")]
#[command(about = "Content ingestion pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one collection window
    Run {
        /// Stages to run: all, 1 (discovery), 2 (enrichment), 3 (summarization)
        #[arg(long, default_value = "all")]
        stage: String,

        /// Collection window date (YYYY-MM-DD); defaults to yesterday
        #[arg(long)]
        date: Option<String>,

        /// Stop scheduling new work after this many seconds; in-flight
        /// items finish and persist their state
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Delete non-completed items older than the retention window
    Purge,

    /// Run pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            stage,
            date,
            timeout_secs,
        } => {
            let selection: StageSelection = stage.parse().map_err(|e: String| anyhow!(e))?;
            let window = match date {
                Some(date) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("invalid date '{date}', expected YYYY-MM-DD"))?,
                None => Utc::now().date_naive() - Duration::days(1),
            };

            let coordinator = build_coordinator().await?;

            let cancel = CancellationToken::new();
            if let Some(secs) = timeout_secs {
                let deadline = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                    tracing::warn!(secs, "Run timeout reached, cancelling remaining work");
                    deadline.cancel();
                });
            }

            let report = coordinator
                .run_with_cancel(selection, window, &cancel)
                .await?;
            println!("{report}");
        }

        Commands::Purge => {
            let coordinator = build_coordinator().await?;
            let purged = coordinator.purge_stale().await?;
            println!("Purged {purged} stale items");
        }

        Commands::Migrate => {
            let storage = connect_storage().await?;
            storage.migrate().await?;
            println!("Migrations applied");
        }
    }

    Ok(())
}

async fn connect_storage() -> Result<PostgresStorage> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PostgresStorage::new(pool))
}

async fn build_coordinator() -> Result<
    RunCoordinator<
        PostgresStorage,
        FirecrawlScraper,
        TwitterStream,
        OpenAiClassifier,
        OpenAiSummarizer,
    >,
> {
    let storage = connect_storage().await?;
    storage.migrate().await?;

    let scraper = FirecrawlScraper::new(FirecrawlClient::from_env()?);
    let stream = TwitterStream::new(TwitterApiClient::from_env()?);
    let openai = OpenAIClient::from_env()?;
    let classifier = OpenAiClassifier::new(openai.clone());
    let summarizer = OpenAiSummarizer::new(openai);

    Ok(RunCoordinator::new(
        storage, scraper, stream, classifier, summarizer,
    ))
}
