use crate::error::Result;
use crate::models::Community;
use crate::scrapers::types::Page;
use async_trait::async_trait;

/// Common trait for all deal sources.
/// Markup changes on a marketplace stay behind this boundary; pagination,
/// normalization and persistence never see source-specific shapes.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// One-time setup before the first page (session bootstrap for API sources).
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Fetch one page of raw items. Cursors start at 1.
    async fn fetch_page(&self, cursor: u32) -> Result<Page>;

    /// Marketplace tag stamped on every deal from this source
    fn community(&self) -> Community;

    /// Origin used to absolutize relative links
    fn origin(&self) -> &str;
}
