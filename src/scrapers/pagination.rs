use tracing::{error, info, warn};

use crate::models::RawItem;
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::TerminationSignal;

/// How a source's pagination ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Empty page or an explicit "past the last page" answer.
    Completed,
    /// Throttled; the items gathered so far are kept.
    RateLimited,
    /// The page ceiling was hit before the source ran dry.
    CeilingReached,
    Failed(String),
}

impl SourceStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, SourceStatus::Failed(_))
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Completed => f.write_str("completed"),
            SourceStatus::RateLimited => f.write_str("rate limited"),
            SourceStatus::CeilingReached => f.write_str("page ceiling reached"),
            SourceStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Everything one source produced
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub items: Vec<RawItem>,
    pub pages: u32,
    pub status: SourceStatus,
}

/// Walk `adapter` from page 1 upward, one page at a time, until it signals the
/// end, fails, or `max_pages` pages have been fetched.
pub async fn collect(adapter: &dyn SourceAdapter, max_pages: u32) -> Collected {
    let community = adapter.community();
    let mut items = Vec::new();
    let mut pages = 0;

    let status = loop {
        let cursor = pages + 1;
        if cursor > max_pages {
            warn!(
                "⚠️ {} still had pages after {} pages, stopping at the ceiling",
                community, max_pages
            );
            break SourceStatus::CeilingReached;
        }

        let page = match adapter.fetch_page(cursor).await {
            Ok(page) => page,
            Err(e) => {
                error!("❌ Error scraping {} page {}: {}", community, cursor, e);
                break SourceStatus::Failed(e.to_string());
            }
        };
        pages = cursor;

        let fetched = page.items.len();
        items.extend(page.items);

        match page.signal {
            None if fetched == 0 => {
                info!("✅ No more deals on {}, stopping at page {}", community, cursor);
                break SourceStatus::Completed;
            }
            None => {
                info!("📄 Fetched {} deals from {} page {}", fetched, community, cursor);
            }
            Some(TerminationSignal::Exhausted) => {
                info!("✅ {} pagination ended at page {}", community, cursor);
                break SourceStatus::Completed;
            }
            Some(TerminationSignal::RateLimited) => {
                warn!(
                    "⚠️ {} rate limit hit on page {}, keeping {} deals",
                    community,
                    cursor,
                    items.len()
                );
                break SourceStatus::RateLimited;
            }
            Some(TerminationSignal::Fatal(reason)) => {
                error!("❌ {} page {} failed: {}", community, cursor, reason);
                break SourceStatus::Failed(reason);
            }
        }
    };

    Collected {
        items,
        pages,
        status,
    }
}
