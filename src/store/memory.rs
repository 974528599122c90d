use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Community, Deal};
use crate::store::{DealQuery, DealStore, ExternalIdCount, SortOrder};

/// Observable store operations, in the order the store saw them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ClearStarted(Vec<Community>),
    ClearFinished,
    Inserted(usize),
    Closed,
}

/// In-memory store that records every call for ordering assertions.
#[derive(Default)]
pub struct MemoryStore {
    deals: Mutex<Vec<Deal>>,
    events: Mutex<Vec<StoreEvent>>,
}

impl MemoryStore {
    pub fn with_deals(deals: Vec<Deal>) -> Self {
        Self {
            deals: Mutex::new(deals),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn deals(&self) -> Vec<Deal> {
        self.deals.lock().unwrap().clone()
    }

    fn record(&self, event: StoreEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl DealStore for MemoryStore {
    async fn clear(&self, scope: &[Community]) -> Result<u64> {
        self.record(StoreEvent::ClearStarted(scope.to_vec()));
        // Give concurrently scheduled inserts a chance to run mid-clear.
        tokio::task::yield_now().await;

        let deleted = {
            let mut deals = self.deals.lock().unwrap();
            let before = deals.len();
            deals.retain(|d| !scope.contains(&d.community));
            before - deals.len()
        };
        self.record(StoreEvent::ClearFinished);
        Ok(deleted as u64)
    }

    async fn insert_many(&self, deals: &[Deal]) -> Result<u64> {
        tokio::task::yield_now().await;
        self.deals.lock().unwrap().extend_from_slice(deals);
        self.record(StoreEvent::Inserted(deals.len()));
        Ok(deals.len() as u64)
    }

    async fn find(&self, query: &DealQuery) -> Result<Vec<Deal>> {
        let mut found: Vec<Deal> = self
            .deals()
            .into_iter()
            .filter(|d| query.max_price.map_or(true, |max| d.price <= max))
            .filter(|d| query.published_after.map_or(true, |after| d.published_at >= after))
            .filter(|d| query.min_comments.map_or(true, |min| d.comment_count > min))
            .filter(|d| !query.with_discount || d.discount.is_some())
            .collect();

        match query.sort {
            SortOrder::PriceAsc => found.sort_by(|a, b| a.price.total_cmp(&b.price)),
            SortOrder::DiscountDesc => found.sort_by(|a, b| {
                b.discount
                    .unwrap_or(f64::MIN)
                    .total_cmp(&a.discount.unwrap_or(f64::MIN))
            }),
            SortOrder::CommentsDesc => found.sort_by(|a, b| b.comment_count.cmp(&a.comment_count)),
            SortOrder::PublishedDesc => found.sort_by(|a, b| b.published_at.cmp(&a.published_at)),
        }
        if let Some(limit) = query.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
    }

    async fn count_by_external_id(&self) -> Result<Vec<ExternalIdCount>> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for deal in self.deals() {
            if let Some(id) = deal.external_id {
                *counts.entry(id).or_default() += 1;
            }
        }
        let mut counts: Vec<ExternalIdCount> = counts
            .into_iter()
            .map(|(external_id, occurrences)| ExternalIdCount {
                external_id,
                occurrences,
            })
            .collect();
        counts.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        Ok(counts)
    }

    async fn close(&self) {
        self.record(StoreEvent::Closed);
    }
}
