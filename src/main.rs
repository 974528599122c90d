mod config;
mod error;
mod models;
mod normalizer;
mod orchestrator;
mod reports;
mod scrapers;
mod store;
#[cfg(test)]
mod testing;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use models::Community;
use orchestrator::IngestOptions;
use store::{DealStore, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Dealabs,
    Vinted,
    Avenue,
    /// Scrape every source
    All,
    /// Report on stored deals without scraping
    Queries,
}

impl Target {
    fn communities(self) -> Vec<Community> {
        match self {
            Target::Dealabs => vec![Community::Dealabs],
            Target::Vinted => vec![Community::Vinted],
            Target::Avenue => vec![Community::AvenueDeLaBrique],
            Target::All => Community::ALL.to_vec(),
            Target::Queries => Vec::new(),
        }
    }

    fn selector(self) -> &'static str {
        match self {
            Target::Dealabs => "dealabs",
            Target::Vinted => "vinted",
            Target::Avenue => "avenue",
            Target::All => "all",
            Target::Queries => "queries",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "deal-scout", about = "Scrape LEGO deals from French marketplaces")]
struct Cli {
    /// Source to scrape, `all`, or `queries`
    #[arg(value_enum)]
    target: Target,

    /// Stop each source after this many pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Skip the JSON snapshot file
    #[arg(long)]
    no_snapshot: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🧱 Deal Scout - LEGO deals");
    info!("==========================================");

    if cli.target == Target::Queries {
        let store = SqliteStore::connect(&config.database_url)
            .await
            .context("Failed to open deal store")?;
        let results = reports::run_queries(&store, Utc::now()).await;
        store.close().await;
        reports::print_results(&results.context("Reporting queries failed")?);
        return Ok(());
    }

    let options = IngestOptions {
        selector: cli.target.selector().to_string(),
        max_pages: cli.max_pages.unwrap_or(config.max_pages),
        snapshot_dir: if cli.no_snapshot {
            None
        } else {
            config.snapshot_dir.clone()
        },
    };

    let report = orchestrator::run(&config, &cli.target.communities(), &options)
        .await
        .context("Ingestion run failed")?;

    for failure in report.failures() {
        warn!("⚠️ {} did not complete: {}", failure.community, failure.status);
    }
    if let Some(path) = &report.snapshot {
        info!("📄 Snapshot: {}", path.display());
    }

    Ok(())
}
