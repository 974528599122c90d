use std::path::PathBuf;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::models::{Community, Deal};
use crate::normalizer::Normalizer;
use crate::scrapers::pagination::{collect, SourceStatus};
use crate::scrapers::{
    build_client, AvenueSource, DealabsSource, MarkupAdapter, SearchParams, SourceAdapter,
    VintedAdapter,
};
use crate::store::snapshot::write_snapshot;
use crate::store::{replace, DealStore, SqliteStore};

/// Outcome of one source's pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub community: Community,
    pub pages: u32,
    pub raw_items: usize,
    pub deals: usize,
    pub skipped: usize,
    pub status: SourceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub stored: u64,
    pub snapshot: Option<PathBuf>,
}

impl RunReport {
    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.status.is_failure())
    }
}

/// Per-run knobs that don't belong to any single adapter
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Names the snapshot file, e.g. `vinted` or `all`.
    pub selector: String,
    pub max_pages: u32,
    pub snapshot_dir: Option<PathBuf>,
}

pub fn build_adapter(community: Community, client: &Client, config: &Config) -> Box<dyn SourceAdapter> {
    match community {
        Community::Dealabs => Box::new(MarkupAdapter::new(
            client.clone(),
            DealabsSource::new(&config.dealabs_origin),
        )),
        Community::Vinted => Box::new(VintedAdapter::new(
            client.clone(),
            &config.vinted_origin,
            SearchParams {
                search_text: config.search_text.clone(),
                per_page: config.vinted_per_page,
                ..SearchParams::default()
            },
        )),
        Community::AvenueDeLaBrique => Box::new(MarkupAdapter::new(
            client.clone(),
            AvenueSource::new(&config.avenue_origin),
        )),
    }
}

/// Scrape `communities` and replace their stored deals. The store is opened
/// here and closed before returning, whatever the outcome.
pub async fn run(config: &Config, communities: &[Community], options: &IngestOptions) -> Result<RunReport> {
    let client = build_client(config.request_timeout)?;
    let adapters: Vec<Box<dyn SourceAdapter>> = communities
        .iter()
        .map(|&c| build_adapter(c, &client, config))
        .collect();

    let store = SqliteStore::connect(&config.database_url).await?;
    let result = ingest(&adapters, &store, options).await;
    store.close().await;
    result
}

/// Run every adapter's pipeline concurrently, then write the combined batch once.
pub async fn ingest(
    adapters: &[Box<dyn SourceAdapter>],
    store: &dyn DealStore,
    options: &IngestOptions,
) -> Result<RunReport> {
    let run_started = Utc::now();

    let outcomes = join_all(
        adapters
            .iter()
            .map(|adapter| run_source(adapter.as_ref(), options.max_pages, run_started)),
    )
    .await;

    let mut scope: Vec<Community> = adapters.iter().map(|a| a.community()).collect();
    scope.sort();
    scope.dedup();

    let mut sources = Vec::with_capacity(outcomes.len());
    let mut deals: Vec<Deal> = Vec::new();
    for (report, source_deals) in outcomes {
        sources.push(report);
        deals.extend(source_deals);
    }

    let stored = replace(store, &scope, &deals).await?;

    let snapshot = match &options.snapshot_dir {
        Some(dir) => match write_snapshot(dir, &options.selector, &deals, run_started).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("⚠️ Could not write snapshot: {}", e);
                None
            }
        },
        None => None,
    };

    let report = RunReport {
        sources,
        stored,
        snapshot,
    };
    log_summary(&report);
    Ok(report)
}

async fn run_source(
    adapter: &dyn SourceAdapter,
    max_pages: u32,
    run_started: DateTime<Utc>,
) -> (SourceReport, Vec<Deal>) {
    let community = adapter.community();
    info!("🔎 Scraping {}...", community);

    if let Err(e) = adapter.prepare().await {
        error!("❌ Could not start a {} session: {}", community, e);
        let report = SourceReport {
            community,
            pages: 0,
            raw_items: 0,
            deals: 0,
            skipped: 0,
            status: SourceStatus::Failed(e.to_string()),
        };
        return (report, Vec::new());
    }

    let collected = collect(adapter, max_pages).await;
    let raw_items = collected.items.len();

    let normalizer = Normalizer::new(community, adapter.origin(), run_started);
    let (deals, skipped) = normalizer.normalize_all(collected.items);

    let report = SourceReport {
        community,
        pages: collected.pages,
        raw_items,
        deals: deals.len(),
        skipped,
        status: collected.status,
    };
    (report, deals)
}

fn log_summary(report: &RunReport) {
    info!("");
    info!("📊 Run summary");
    info!("==========================================");
    for source in &report.sources {
        let icon = match source.status {
            SourceStatus::Completed => "✅",
            SourceStatus::RateLimited | SourceStatus::CeilingReached => "⚠️",
            SourceStatus::Failed(_) => "❌",
        };
        info!(
            "{} {}: {} deals from {} pages ({} skipped), {}",
            icon, source.community, source.deals, source.pages, source.skipped, source.status
        );
    }
    info!("💾 Stored {} deals", report.stored);

    let failed = report.failures().count();
    if failed > 0 {
        warn!("⚠️ {} source(s) failed", failed);
    }
}
