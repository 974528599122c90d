use reqwest::StatusCode;
use scraper::Html;
use tracing::debug;

use crate::models::{Community, DealAttributes, RawItem};
use crate::scrapers::markup::{
    css, non_empty, select_attr, select_text, DetailFields, ListingEntry, MarkupSource,
};
use crate::scrapers::types::TerminationSignal;

const PROMOTIONS_PATH: &str = "/promotions-et-bons-plans-lego";

/// Avenue de la Brique promotions. The whole catalogue of current promotions
/// sits on one listing page; set details live on each product page.
pub struct AvenueSource {
    origin: String,
}

impl AvenueSource {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }
}

impl MarkupSource for AvenueSource {
    fn community(&self) -> Community {
        Community::AvenueDeLaBrique
    }

    fn origin(&self) -> &str {
        &self.origin
    }

    fn listing_url(&self, cursor: u32) -> Option<String> {
        (cursor == 1).then(|| format!("{}{}", self.origin, PROMOTIONS_PATH))
    }

    fn parse_listing(&self, html: &str) -> Vec<ListingEntry> {
        let document = Html::parse_document(html);
        let product_selector = css("a.prodl");
        let title_selector = css("span.prodl-libelle");
        let price_selector = css("span.prodl-prix span");
        let discount_selector = css("span.prodl-reduc");

        document
            .select(&product_selector)
            .enumerate()
            .filter_map(|(idx, product)| {
                let Some(link) = product
                    .value()
                    .attr("href")
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                else {
                    debug!("Skipped product {}: no link", idx);
                    return None;
                };

                let item = RawItem {
                    title: select_text(product, &title_selector),
                    price: non_empty(select_text(product, &price_selector)),
                    discount_label: non_empty(select_text(product, &discount_selector)),
                    link: Some(link.to_string()),
                    ..Default::default()
                };
                Some(ListingEntry::with_detail(item, link.to_string()))
            })
            .collect()
    }

    fn parse_detail(&self, html: &str) -> DetailFields {
        let document = Html::parse_document(html);
        let root = document.root_element();

        DetailFields {
            title: non_empty(select_text(root, &css(".prodf-libelle"))),
            price: non_empty(select_text(root, &css("span[itemprop=\"lowPrice\"]"))),
            discount_label: non_empty(select_text(root, &css(".prodf-reduc strong"))),
            photo: select_attr(root, &css(".prodf-img img"), "src"),
            attributes: DealAttributes {
                model: non_empty(select_text(root, &css("span[itemprop=\"model\"]"))),
                brand: select_attr(root, &css("meta[itemprop=\"name\"]"), "content"),
                sku: non_empty(select_text(root, &css("span[itemprop=\"sku\"]"))),
                release_date: non_empty(select_text(root, &css("span[itemprop=\"releaseDate\"]"))),
                category: non_empty(select_text(root, &css("span[itemprop=\"category\"]"))),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn classify_status(&self, status: StatusCode) -> TerminationSignal {
        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => TerminationSignal::Exhausted,
            StatusCode::TOO_MANY_REQUESTS => TerminationSignal::RateLimited,
            other => TerminationSignal::Fatal(format!("HTTP {other}")),
        }
    }
}
