//! Batch poller
//!
//! Tracks generation batches at the provider and applies their results to
//! paper rows. `run` polls on a schedule until shutdown; the other
//! subcommands are one-shot operator tools.

use std::sync::Arc;

use anthropic_client::AnthropicClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enrichment_core::domains::batches::{submit_batch, BatchPoller, BatchType, PollerConfig};
use enrichment_core::domains::papers::HttpRevalidator;
use enrichment_core::kernel::{
    run_poll_cycle, start_scheduler, AnthropicBatchAdapter, BaseRevalidator,
    OpenAiEmbeddingAdapter, ServerDeps,
};
use enrichment_core::Config;
use openai_client::OpenAIClient;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "batch_poller")]
#[command(about = "Poll generation batches and apply their results")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on the configured schedule until Ctrl+C/SIGTERM (default)
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Print recent batch jobs as JSON
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Submit a batch for papers missing an outline or summary
    Submit {
        #[arg(long = "type")]
        batch_type: BatchType,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enrichment_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations complete");
    }

    let deps = Arc::new(build_deps(&config, pool)?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tracing::info!("Starting batch poller");
            let poller = Arc::new(BatchPoller::new(deps, PollerConfig::default()));
            let mut scheduler = start_scheduler(poller, &config.poll_cron).await?;

            shutdown_signal().await;
            tracing::info!("Shutdown signal received, stopping scheduler");
            scheduler.shutdown().await?;
        }
        Commands::Once => {
            let poller = BatchPoller::new(deps, PollerConfig::default());
            run_poll_cycle(&poller).await;
        }
        Commands::List { limit } => {
            let jobs = deps.batch_jobs.list_recent(limit).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        Commands::Submit { batch_type, limit } => {
            match submit_batch(batch_type, limit, &deps).await? {
                Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
                None => tracing::info!(batch_type = %batch_type, "Nothing to submit"),
            }
        }
    }

    Ok(())
}

fn build_deps(config: &Config, pool: sqlx::PgPool) -> Result<ServerDeps> {
    let mut anthropic = AnthropicClient::new(&config.anthropic_api_key);
    if let Some(base_url) = &config.anthropic_base_url {
        anthropic = anthropic.with_base_url(base_url);
    }

    let openai = OpenAIClient::new(&config.openai_api_key);

    let revalidator: Option<Arc<dyn BaseRevalidator>> = match config.revalidation() {
        Some((site_url, secret)) => Some(Arc::new(HttpRevalidator::new(site_url, secret)?)),
        None => {
            tracing::warn!("SITE_URL or REVALIDATION_SECRET not set, page revalidation disabled");
            None
        }
    };

    Ok(ServerDeps::with_postgres(
        pool,
        Arc::new(AnthropicBatchAdapter::new(Arc::new(anthropic))),
        Arc::new(OpenAiEmbeddingAdapter::new(
            Arc::new(openai),
            config.embedding_model.clone(),
        )),
        revalidator,
        config.generation_model.clone(),
    ))
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
