pub mod sink;
pub mod snapshot;
pub mod sqlite;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Community, Deal};

pub use sink::replace;
pub use sqlite::SqliteStore;

/// Ordering applied to a deal query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    PriceAsc,
    DiscountDesc,
    CommentsDesc,
    PublishedDesc,
}

/// Filter for reading stored deals. Every field is optional; the default
/// query returns everything sorted by price.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DealQuery {
    pub max_price: Option<f64>,
    pub published_after: Option<DateTime<Utc>>,
    /// Strictly more comments than this.
    pub min_comments: Option<u32>,
    pub with_discount: bool,
    pub sort: SortOrder,
    pub limit: Option<u32>,
}

impl DealQuery {
    pub fn sorted(sort: SortOrder) -> Self {
        Self {
            sort,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIdCount {
    pub external_id: String,
    pub occurrences: u64,
}

/// Destination for normalized deals
#[async_trait]
pub trait DealStore: Send + Sync {
    /// Delete every stored deal whose community is in `scope`.
    async fn clear(&self, scope: &[Community]) -> Result<u64>;

    async fn insert_many(&self, deals: &[Deal]) -> Result<u64>;

    async fn find(&self, query: &DealQuery) -> Result<Vec<Deal>>;

    /// Occurrences per external id, most frequent first. Deals without an
    /// external id are ignored.
    async fn count_by_external_id(&self) -> Result<Vec<ExternalIdCount>>;

    async fn close(&self);
}
