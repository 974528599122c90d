use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::config::RECENT_DAYS;
use crate::error::Result;
use crate::models::Deal;
use crate::store::{DealQuery, DealStore, ExternalIdCount, SortOrder};

const TOP: u32 = 10;
const BUSY_THREAD_COMMENTS: u32 = 10;

pub fn best_discounts() -> DealQuery {
    DealQuery {
        with_discount: true,
        ..DealQuery::sorted(SortOrder::DiscountDesc).limit(TOP)
    }
}

pub fn most_commented() -> DealQuery {
    DealQuery {
        min_comments: Some(BUSY_THREAD_COMMENTS),
        ..DealQuery::sorted(SortOrder::CommentsDesc).limit(TOP)
    }
}

pub fn by_price() -> DealQuery {
    DealQuery::sorted(SortOrder::PriceAsc)
}

pub fn by_date() -> DealQuery {
    DealQuery::sorted(SortOrder::PublishedDesc)
}

pub fn recent(now: DateTime<Utc>) -> DealQuery {
    DealQuery {
        published_after: Some(now - Duration::days(RECENT_DAYS)),
        ..DealQuery::sorted(SortOrder::PublishedDesc)
    }
}

/// Everything the `queries` command prints
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    pub best_discounts: Vec<Deal>,
    pub most_commented: Vec<Deal>,
    pub by_price: Vec<Deal>,
    pub by_date: Vec<Deal>,
    pub external_ids: Vec<ExternalIdCount>,
    pub recent: Vec<Deal>,
}

pub async fn run_queries(store: &dyn DealStore, now: DateTime<Utc>) -> Result<QueryResults> {
    info!("📈 Running reporting queries");
    Ok(QueryResults {
        best_discounts: store.find(&best_discounts()).await?,
        most_commented: store.find(&most_commented()).await?,
        by_price: store.find(&by_price()).await?,
        by_date: store.find(&by_date()).await?,
        external_ids: store.count_by_external_id().await?,
        recent: store.find(&recent(now)).await?,
    })
}

pub fn print_results(results: &QueryResults) {
    print_deals("🏷️ Best discounts", &results.best_discounts);
    print_deals("💬 Most commented", &results.most_commented);
    print_deals("💶 By price", &results.by_price);
    print_deals("🕒 By date", &results.by_date);

    println!("🔢 Deals per set number ({})", results.external_ids.len());
    for count in &results.external_ids {
        println!("   {}: {}", count.external_id, count.occurrences);
    }
    println!();

    print_deals(&format!("🆕 Last {RECENT_DAYS} days"), &results.recent);
}

fn print_deals(heading: &str, deals: &[Deal]) {
    println!("{} ({})", heading, deals.len());
    for (i, deal) in deals.iter().enumerate() {
        let discount = deal
            .discount
            .map(|d| format!(" -{d:.0}%"))
            .unwrap_or_default();
        println!(
            "{}. [{}] {} ({:.2} €{})",
            i + 1,
            deal.community,
            deal.title,
            deal.price,
            discount
        );
        println!(
            "   {} comments, {}°, {}",
            deal.comment_count,
            deal.temperature,
            deal.published_at.format("%Y-%m-%d %H:%M")
        );
        println!("   {}", deal.link);
    }
    println!();
}
