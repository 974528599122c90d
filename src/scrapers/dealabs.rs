use reqwest::StatusCode;
use scraper::{ElementRef, Html};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Community, DealAttributes, RawItem, RawTimestamp};
use crate::scrapers::markup::{
    css, element_text, non_empty, select_attr, select_text, DetailFields, ListingEntry, MarkupSource,
};
use crate::scrapers::types::TerminationSignal;

const GROUP_PATH: &str = "/groupe/lego?hide_expired=true&time_frame=30";
const IMAGE_HOST: &str = "https://static-pepper.dealabs.com";

/// Dealabs community deals: one embedded JSON payload per thread card,
/// with plain markup on older templates.
pub struct DealabsSource {
    origin: String,
}

impl DealabsSource {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPayload {
    thread_id: Option<Value>,
    title: Option<String>,
    price: Option<f64>,
    next_best_price: Option<f64>,
    temperature: Option<f64>,
    comment_count: Option<u32>,
    published_at: Option<i64>,
    shareable_link: Option<String>,
    title_slug: Option<String>,
    link: Option<String>,
    main_image: Option<ThreadImage>,
    merchant: Option<Merchant>,
}

#[derive(Debug, Deserialize)]
struct ThreadImage {
    path: String,
    name: String,
    ext: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Merchant {
    merchant_name: Option<String>,
}

/// What a card's embedded payloads yielded
enum Embedded {
    Thread(Box<ThreadPayload>),
    Malformed(String),
    Absent,
}

impl MarkupSource for DealabsSource {
    fn community(&self) -> Community {
        Community::Dealabs
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn listing_url(&self, cursor: u32) -> Option<String> {
        Some(format!("{}{}&page={}", self.origin, GROUP_PATH, cursor))
    }

    fn parse_listing(&self, html: &str) -> Vec<ListingEntry> {
        let document = Html::parse_document(html);
        let card_selector = css("article.thread, div.threadGrid");

        let mut entries = Vec::new();
        let cards = document
            .select(&card_selector)
            .filter(|card| !inside_thread_article(*card));
        for (idx, card) in cards.enumerate() {
            match embedded_thread(card) {
                Embedded::Thread(thread) => match thread_to_item(*thread) {
                    Some(item) => entries.push(ListingEntry::complete(item)),
                    None => debug!("Skipped thread card {}: payload has no title or link", idx),
                },
                Embedded::Malformed(e) => {
                    warn!("Skipped thread card {}: malformed embedded payload: {}", idx, e)
                }
                Embedded::Absent => match legacy_card(card) {
                    Some(entry) => entries.push(entry),
                    None => debug!("Skipped thread card {}: no title or link", idx),
                },
            }
        }
        entries
    }

    fn parse_detail(&self, html: &str) -> DetailFields {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let published = select_attr(root, &css("time[datetime]"), "datetime")
            .map(RawTimestamp::Iso)
            .or_else(|| {
                root.select(&css("[title]"))
                    .filter_map(|el| el.value().attr("title"))
                    .find(|t| t.chars().any(|c| c.is_ascii_digit()))
                    .map(|t| RawTimestamp::Locale(t.trim().to_string()))
            });

        DetailFields {
            temperature: non_empty(select_text(root, &css(".cept-vote-temp, .vote-temp"))),
            comment_count: non_empty(select_text(root, &css(".cept-comment-link"))),
            published,
            attributes: DealAttributes {
                retailer: non_empty(select_text(
                    root,
                    &css(".threadItemCard-gallery-controls + div .link, .cept-merchant-name"),
                )),
                shipping: non_empty(select_text(root, &css(".icon--truck + span"))),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn classify_status(&self, status: StatusCode) -> TerminationSignal {
        match status {
            StatusCode::GONE => TerminationSignal::Exhausted,
            StatusCode::TOO_MANY_REQUESTS => TerminationSignal::RateLimited,
            other => TerminationSignal::Fatal(format!("HTTP {other}")),
        }
    }
}

/// Legacy grids nested in a thread article are parsed through the article.
fn inside_thread_article(card: ElementRef<'_>) -> bool {
    card.ancestors().filter_map(ElementRef::wrap).any(|el| {
        el.value().name() == "article" && el.value().classes().any(|c| c == "thread")
    })
}

/// Look through a card's `data-vue3` attributes for the thread payload.
/// Other components (vote buttons etc.) carry payloads too and are ignored.
fn embedded_thread(card: ElementRef<'_>) -> Embedded {
    let payload_selector = css("[data-vue3]");
    let own = card.value().attr("data-vue3");
    let nested = card
        .select(&payload_selector)
        .filter_map(|el| el.value().attr("data-vue3"));

    let mut malformed = None;
    for raw in own.into_iter().chain(nested) {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                malformed = Some(e.to_string());
                continue;
            }
        };
        let Some(thread) = value.pointer("/props/thread") else {
            continue;
        };
        return match ThreadPayload::deserialize(thread) {
            Ok(payload) => Embedded::Thread(Box::new(payload)),
            Err(e) => Embedded::Malformed(e.to_string()),
        };
    }

    malformed.map(Embedded::Malformed).unwrap_or(Embedded::Absent)
}

fn thread_to_item(thread: ThreadPayload) -> Option<RawItem> {
    let title = thread.title.map(|t| t.trim().to_string()).unwrap_or_default();
    let source_id = thread.thread_id.map(|id| match id {
        Value::String(s) => s,
        other => other.to_string(),
    });

    let link = thread
        .shareable_link
        .or_else(|| match (&thread.title_slug, &source_id) {
            (Some(slug), Some(id)) => Some(format!("/bons-plans/{slug}-{id}")),
            _ => None,
        })
        .or(thread.link)?;

    if title.is_empty() {
        return None;
    }

    Some(RawItem {
        source_id,
        title,
        price: thread.price.map(|p| p.to_string()),
        base_price: thread.next_best_price.map(|p| p.to_string()),
        discount_label: None,
        comment_count: thread.comment_count.map(|c| c.to_string()),
        temperature: thread.temperature.map(|t| t.to_string()),
        published: thread.published_at.map(RawTimestamp::UnixSeconds),
        link: Some(link),
        photo: thread.main_image.map(|img| {
            format!(
                "{IMAGE_HOST}/{}/{}/re/300x300/qt/60/{}.{}",
                img.path, img.name, img.name, img.ext
            )
        }),
        attributes: DealAttributes {
            retailer: thread.merchant.and_then(|m| m.merchant_name),
            ..Default::default()
        },
    })
}

/// Older templates: plain sub-selectors, the rest comes from the detail page.
fn legacy_card(card: ElementRef<'_>) -> Option<ListingEntry> {
    let title_selector = css(".threadGrid-title a, .thread-title a");
    let title_link = card.select(&title_selector).next()?;

    let title = element_text(title_link);
    let link = title_link.value().attr("href")?.trim().to_string();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let item = RawItem {
        title,
        price: non_empty(select_text(card, &css(".threadItemCard-price, .thread-price"))),
        base_price: non_empty(select_text(card, &css(".text--lineThrough"))),
        temperature: non_empty(select_text(card, &css(".cept-vote-temp, .vote-temp"))),
        link: Some(link.clone()),
        photo: select_attr(card, &css("img.thread-image"), "src"),
        attributes: DealAttributes {
            description: non_empty(select_text(card, &css(".userHtml-content"))),
            ..Default::default()
        },
        ..Default::default()
    };
    Some(ListingEntry::with_detail(item, link))
}
