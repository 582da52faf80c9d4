use anyhow::Context;
use catalog_scraper::{
    CatalogClient, CommitQueue, CourseDbManager, CourseStore, MemoryStore, ScrapePipeline,
    ScraperConfig, StorageConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const CONFIG_ENV: &str = "CATALOG_SCRAPER_CONFIG";

fn load_config() -> anyhow::Result<ScraperConfig> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from);

    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            ScraperConfig::load_from_file(&path)
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            info!("No config given, using defaults");
            Ok(ScraperConfig::default())
        }
    }
}

fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn CourseStore>> {
    Ok(match storage {
        StorageConfig::Sqlite { path } => Arc::new(
            CourseDbManager::open(path)
                .with_context(|| format!("Failed to open database at {}", path.display()))?,
        ),
        StorageConfig::Memory => {
            warn!("Using the in-memory store; nothing will be kept after exit");
            Arc::new(MemoryStore::new())
        }
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let store = open_store(&config.storage)?;

    let client = CatalogClient::new(&config.http, config.retry.clone())
        .context("Failed to build HTTP client")?;
    let mut queue = CommitQueue::new(
        Arc::clone(&store),
        config.commit.clone(),
        config.retry.clone(),
    );
    let mut pipeline = ScrapePipeline::new(client, config)?;

    let mut interrupted = false;
    loop {
        let next = tokio::select! {
            next = pipeline.next_course() => next,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, no further pages will be fetched");
                interrupted = true;
                break;
            }
        };

        match next.context("Course discovery failed")? {
            Some(course) => queue.submit(course),
            None => break,
        }
    }

    let summary = queue.finish().await;
    let stats = pipeline.stats();
    info!(
        discovered = stats.discovered,
        scraped = stats.scraped,
        transport_failures = stats.transport_failures,
        parse_failures = stats.parse_failures,
        dropped_sections = stats.dropped_sections,
        inserted = summary.inserted,
        unchanged = summary.unchanged,
        revised = summary.revised,
        failed = summary.failed.len(),
        interrupted,
        "Scrape finished"
    );

    store.close().context("Failed to close the course store")?;
    Ok(())
}
