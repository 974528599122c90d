//! HTML listing scraper shared by the markup-based sources.
//!
//! A [`MarkupSource`] only knows selectors and URLs; [`MarkupAdapter`] does the
//! fetching, status classification and the per-page detail fan-out.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Selector};
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};
use crate::models::{Community, DealAttributes, RawItem, RawTimestamp};
use crate::normalizer::resolve_link;
use crate::scrapers::http::fetch_text;
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::{Page, TerminationSignal};

/// A listing node's extracted fields plus where to find the rest of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub item: RawItem,
    /// Detail page to follow, if the listing alone is incomplete
    pub detail_url: Option<String>,
}

impl ListingEntry {
    pub fn complete(item: RawItem) -> Self {
        Self {
            item,
            detail_url: None,
        }
    }

    pub fn with_detail(item: RawItem, detail_url: String) -> Self {
        Self {
            item,
            detail_url: Some(detail_url),
        }
    }
}

/// Fields a detail page can contribute. Present values override the listing's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailFields {
    pub title: Option<String>,
    pub price: Option<String>,
    pub base_price: Option<String>,
    pub discount_label: Option<String>,
    pub temperature: Option<String>,
    pub comment_count: Option<String>,
    pub published: Option<RawTimestamp>,
    pub photo: Option<String>,
    pub attributes: DealAttributes,
}

impl DetailFields {
    pub fn apply_to(self, item: &mut RawItem) {
        fn overlay(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                *slot = Some(v);
            }
        }
        if let Some(title) = self.title.filter(|t| !t.is_empty()) {
            item.title = title;
        }
        overlay(&mut item.price, self.price);
        overlay(&mut item.base_price, self.base_price);
        overlay(&mut item.discount_label, self.discount_label);
        overlay(&mut item.temperature, self.temperature);
        overlay(&mut item.comment_count, self.comment_count);
        overlay(&mut item.photo, self.photo);
        if self.published.is_some() {
            item.published = self.published;
        }
        item.attributes.merge(self.attributes);
    }
}

/// Selectors and URL scheme of one HTML marketplace.
pub trait MarkupSource: Send + Sync {
    fn community(&self) -> Community;

    fn origin(&self) -> &str;

    /// Listing URL for `cursor`, or None when the source has no such page.
    fn listing_url(&self, cursor: u32) -> Option<String>;

    fn parse_listing(&self, html: &str) -> Vec<ListingEntry>;

    fn parse_detail(&self, html: &str) -> DetailFields;

    fn classify_status(&self, status: StatusCode) -> TerminationSignal {
        match status {
            StatusCode::TOO_MANY_REQUESTS => TerminationSignal::RateLimited,
            other => TerminationSignal::Fatal(format!("HTTP {other}")),
        }
    }
}

pub struct MarkupAdapter<S> {
    client: Client,
    source: S,
}

impl<S: MarkupSource> MarkupAdapter<S> {
    pub fn new(client: Client, source: S) -> Self {
        Self { client, source }
    }

    /// Follow detail links for every entry of one page, all in flight at once,
    /// keeping the listing order.
    async fn enrich(&self, entries: Vec<ListingEntry>) -> Vec<RawItem> {
        let limit = entries.len().max(1);

        let enriched: Vec<Option<RawItem>> = stream::iter(entries)
            .map(|entry| self.enrich_one(entry))
            .buffered(limit)
            .collect()
            .await;

        enriched.into_iter().flatten().collect()
    }

    async fn enrich_one(&self, entry: ListingEntry) -> Option<RawItem> {
        let ListingEntry {
            mut item,
            detail_url,
        } = entry;

        let Some(raw_url) = detail_url else {
            return Some(item);
        };
        let Some(url) = resolve_link(self.source.origin(), &raw_url) else {
            warn!("Skipping detail fetch for unusable link {:?}", raw_url);
            return (!item.title.is_empty()).then_some(item);
        };

        match fetch_text(&self.client, &url).await {
            Ok(html) => {
                self.source.parse_detail(&html).apply_to(&mut item);
                Some(item)
            }
            Err(e) if item.title.is_empty() => {
                warn!("Dropping item {}: detail fetch failed and listing has no title: {}", url, e);
                None
            }
            Err(e) => {
                warn!("Detail fetch failed for {}: {}", url, e);
                Some(item)
            }
        }
    }
}

#[async_trait]
impl<S: MarkupSource> SourceAdapter for MarkupAdapter<S> {
    async fn fetch_page(&self, cursor: u32) -> Result<Page> {
        let Some(url) = self.source.listing_url(cursor) else {
            debug!("{} has no page {}", self.source.community(), cursor);
            return Ok(Page::terminated(TerminationSignal::Exhausted));
        };

        let html = match fetch_text(&self.client, &url).await {
            Ok(html) => html,
            Err(ScrapeError::Status { status, .. }) => {
                return Ok(Page::terminated(self.source.classify_status(status)));
            }
            Err(e) => return Err(e),
        };

        let entries = self.source.parse_listing(&html);
        info!(
            "Found {} deals on {} page {}",
            entries.len(),
            self.source.community(),
            cursor
        );

        if entries.is_empty() {
            return Ok(Page::default());
        }

        Ok(Page::items(self.enrich(entries).await))
    }

    fn community(&self) -> Community {
        self.source.community()
    }

    fn origin(&self) -> &str {
        self.source.origin()
    }
}

/// Parse a selector that is known at compile time.
pub(crate) fn css(selector: &str) -> Selector {
    Selector::parse(selector).unwrap_or_else(|e| panic!("invalid selector {selector:?}: {e:?}"))
}

/// Whitespace-collapsed text of the first match, empty when nothing matches.
pub(crate) fn select_text(element: ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

pub(crate) fn select_attr(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .find_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
