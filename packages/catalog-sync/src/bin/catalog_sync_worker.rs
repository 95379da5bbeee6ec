//! One catalog sync worker process.
//!
//! Run `--worker-count` of these side by side, each with its own
//! `--worker-index`; they split the category list between them without
//! talking to each other.

use anyhow::{Context, Result};
use catalog_sync::{
    BrowserSessionProvider, CatalogEndpoints, CatalogWorker, Category, CheckpointSink,
    Checkpointer, DetailClient, FileCheckpointSink, HttpBrowser, ListingPager,
    PartitionCoordinator, PostgresStore, RecordUpserter, ResourceEnricher, SyncConfig,
};
use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "catalog_sync_worker")]
#[command(about = "Sync one partition of the data catalog into the record store")]
struct Cli {
    /// This worker's index, starting at 0
    #[arg(long)]
    worker_index: usize,

    /// Total number of workers sharing the category list
    #[arg(long, default_value_t = 1)]
    worker_count: usize,

    /// JSON file with the category list
    #[arg(long)]
    categories: PathBuf,

    /// Restart from the category in this worker's last checkpoint
    #[arg(long)]
    resume: bool,

    /// Skip per-record detail enrichment
    #[arg(long)]
    no_enrich: bool,
}

/// Process settings loaded from environment variables.
#[derive(Debug, Clone)]
struct Settings {
    database_url: String,
    checkpoint_dir: PathBuf,
    endpoints: CatalogEndpoints,
    sync: SyncConfig,
    request_timeout: Duration,
}

impl Settings {
    fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let base_url = env::var("CATALOG_BASE_URL").context("CATALOG_BASE_URL must be set")?;
        let mut endpoints =
            CatalogEndpoints::parse(&base_url).context("CATALOG_BASE_URL must be a valid URL")?;

        if let Ok(path) = env::var("CATALOG_LISTING_VIEW_PATH") {
            endpoints = endpoints.with_listing_view_path(path);
        }
        if let Ok(path) = env::var("CATALOG_LISTING_API_PATH") {
            endpoints = endpoints.with_listing_api_path(path);
        }
        if let Ok(path) = env::var("CATALOG_DETAIL_API_PATH") {
            endpoints = endpoints.with_detail_api_path(path);
        }
        if let Ok(template) = env::var("CATALOG_RECORD_URL_TEMPLATE") {
            endpoints = endpoints.with_record_url_template(template);
        }
        let header = env::var("CATALOG_FINGERPRINT_HEADER")
            .unwrap_or_else(|_| endpoints.fingerprint_header.clone());
        let cookie = env::var("CATALOG_FINGERPRINT_COOKIE")
            .unwrap_or_else(|_| endpoints.fingerprint_cookie.clone());
        endpoints = endpoints.with_fingerprint_names(header, cookie);

        let mut sync = SyncConfig::default();
        if let Ok(size) = env::var("CATALOG_PAGE_SIZE") {
            sync = sync.with_page_size(size.parse().context("CATALOG_PAGE_SIZE must be a number")?);
        }
        if let Ok(ms) = env::var("CATALOG_ENRICH_DELAY_MS") {
            let ms: u64 = ms.parse().context("CATALOG_ENRICH_DELAY_MS must be a number")?;
            sync = sync.with_enrich_min_delay(Duration::from_millis(ms));
        }
        if let Ok(secs) = env::var("CATALOG_SETTLE_SECS") {
            let secs: u64 = secs.parse().context("CATALOG_SETTLE_SECS must be a number")?;
            sync = sync.with_settle_delay(Duration::from_secs(secs));
        }

        let request_timeout = env::var("CATALOG_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map(Duration::from_secs)
            .context("CATALOG_REQUEST_TIMEOUT_SECS must be a number")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            checkpoint_dir: env::var("CHECKPOINT_DIR")
                .unwrap_or_else(|_| "./checkpoints".to_string())
                .into(),
            endpoints,
            sync,
            request_timeout,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,catalog_sync=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let sync = settings.sync.clone().with_enrich(!cli.no_enrich);

    let json = tokio::fs::read_to_string(&cli.categories)
        .await
        .with_context(|| format!("Failed to read {}", cli.categories.display()))?;
    let categories = Category::list_from_json(&json).context("Invalid category list")?;

    let coordinator = PartitionCoordinator::new(categories, cli.worker_count)?;
    let sink: Arc<dyn CheckpointSink> = Arc::new(FileCheckpointSink::new(&settings.checkpoint_dir));
    let checkpointer = Checkpointer::new(cli.worker_index, sink, &sync);

    let resume = if cli.resume {
        checkpointer.load().await
    } else {
        None
    };
    let plan = coordinator.plan(cli.worker_index, resume.as_ref())?;

    tracing::info!(
        worker = cli.worker_index,
        workers = cli.worker_count,
        categories = plan.categories.len(),
        enrich = sync.enrich,
        "Starting catalog sync worker"
    );

    let store = Arc::new(
        PostgresStore::new(&settings.database_url)
            .await
            .context("Failed to connect to record store")?,
    );
    let upserter = RecordUpserter::new(store)
        .with_record_url_template(settings.endpoints.record_url_template.clone());

    let browser = Arc::new(HttpBrowser::new()?.with_timeout(settings.request_timeout)?);
    let pager = ListingPager::new(browser.clone(), settings.endpoints.clone(), sync.page_size);
    let provider = BrowserSessionProvider::new(browser.clone(), settings.endpoints.clone(), &sync);

    let mut worker = CatalogWorker::bootstrap(cli.worker_index, pager, provider, upserter.clone(), &sync)
        .await
        .context("Session bootstrap failed")?
        .with_checkpointer(checkpointer);

    if sync.enrich {
        let details = DetailClient::new(browser, settings.endpoints.clone());
        worker = worker.with_enricher(ResourceEnricher::new(details, upserter, sync.enrich_min_delay));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current page");
                cancel.cancel();
            }
        });
    }
    let mut worker = worker.with_cancellation(cancel);

    let report = worker.run_plan(&plan).await;

    for category in &report.categories {
        println!(
            "{:<32} {:>9} {:>7}/{:<7} failed={} enriched={}",
            category.category_id,
            category.status.as_str(),
            category.records_saved,
            category.total_elements,
            category.records_failed,
            category.records_enriched
        );
    }

    Ok(())
}
