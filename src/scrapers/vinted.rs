use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE, REFERER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::models::{Community, DealAttributes, RawItem, RawTimestamp};
use crate::scrapers::session::{bootstrap, Session};
use crate::scrapers::traits::SourceAdapter;
use crate::scrapers::types::{Page, SearchParams, TerminationSignal};

const CATALOG_PATH: &str = "/api/v2/catalog/items";

/// Vinted catalogue search over the JSON API. Needs a bootstrapped session.
pub struct VintedAdapter {
    client: Client,
    origin: String,
    params: SearchParams,
    session: RwLock<Option<Session>>,
    /// Set once the session has been refreshed after an auth failure.
    refreshed: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    items: Vec<Value>,
    pagination: Option<CatalogPagination>,
}

#[derive(Debug, Deserialize)]
struct CatalogPagination {
    current_page: u32,
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    id: Option<Value>,
    #[serde(default)]
    title: String,
    price: Option<Value>,
    brand_title: Option<String>,
    size_title: Option<String>,
    status: Option<String>,
    favourite_count: Option<u32>,
    url: Option<String>,
    path: Option<String>,
    photo: Option<CatalogPhoto>,
    user: Option<CatalogUser>,
    created_at_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogPhoto {
    url: Option<String>,
    high_resolution: Option<HighResolution>,
}

#[derive(Debug, Deserialize)]
struct HighResolution {
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CatalogUser {
    login: Option<String>,
}

enum ApiReply {
    Body(String),
    Status(StatusCode),
}

impl VintedAdapter {
    pub fn new(client: Client, origin: impl Into<String>, params: SearchParams) -> Self {
        Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
            params,
            session: RwLock::new(None),
            refreshed: AtomicBool::new(false),
        }
    }

    fn page_url(&self, cursor: u32) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}{}", self.origin, CATALOG_PATH),
            &[
                ("search_text", self.params.search_text.clone()),
                ("page", cursor.to_string()),
                ("per_page", self.params.per_page.to_string()),
                ("order", self.params.order.clone()),
            ],
        )
        .map_err(|e| ScrapeError::Config(format!("invalid Vinted origin {:?}: {e}", self.origin)))
    }

    async fn current_session(&self) -> Result<Session> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }
        self.refresh_session().await
    }

    async fn refresh_session(&self) -> Result<Session> {
        let fresh = bootstrap(&self.client, &self.origin).await?;
        *self.session.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    async fn request(&self, cursor: u32, session: &Session) -> Result<ApiReply> {
        let url = self.page_url(cursor)?;
        debug!("Fetching Vinted page {}: {}", cursor, url);

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(REFERER, format!("{}/", self.origin))
            .header("X-CSRF-Token", &session.token);
        if !session.cookies.is_empty() {
            request = request.header(COOKIE, &session.cookies);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(ApiReply::Status(status));
        }
        Ok(ApiReply::Body(response.text().await?))
    }
}

#[async_trait]
impl SourceAdapter for VintedAdapter {
    async fn prepare(&self) -> Result<()> {
        self.refresh_session().await.map(|_| ())
    }

    async fn fetch_page(&self, cursor: u32) -> Result<Page> {
        let session = self.current_session().await?;

        let reply = match self.request(cursor, &session).await? {
            ApiReply::Status(status) if is_auth_failure(status) => {
                if self.refreshed.swap(true, Ordering::SeqCst) {
                    return Err(ScrapeError::SessionExpired {
                        origin: self.origin.clone(),
                        status,
                    });
                }
                warn!("⚠️ Vinted session rejected (HTTP {}), bootstrapping again", status);
                let session = self.refresh_session().await?;
                self.request(cursor, &session).await?
            }
            reply => reply,
        };

        match reply {
            ApiReply::Body(body) => parse_catalog(&body),
            ApiReply::Status(status) if is_auth_failure(status) => Err(ScrapeError::SessionExpired {
                origin: self.origin.clone(),
                status,
            }),
            ApiReply::Status(status) => Ok(Page::terminated(classify_status(status))),
        }
    }

    fn community(&self) -> Community {
        Community::Vinted
    }

    fn origin(&self) -> &str {
        &self.origin
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

fn classify_status(status: StatusCode) -> TerminationSignal {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TerminationSignal::RateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE => TerminationSignal::Exhausted,
        other => TerminationSignal::Fatal(format!("HTTP {other}")),
    }
}

/// Decode one catalogue page. A body that isn't JSON fails the page; single
/// items that don't decode are skipped.
fn parse_catalog(body: &str) -> Result<Page> {
    let response: CatalogResponse = serde_json::from_str(body)?;

    let total = response.items.len();
    let items: Vec<RawItem> = response
        .items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<CatalogItem>(value) {
            Ok(item) => catalog_item_to_raw(item),
            Err(e) => {
                warn!("Skipped Vinted item {}: {}", idx, e);
                None
            }
        })
        .collect();

    info!("Parsed {} of {} Vinted items", items.len(), total);

    let last_page = response
        .pagination
        .map(|p| p.current_page >= p.total_pages)
        .unwrap_or(false);

    let page = Page::items(items);
    Ok(if last_page && total > 0 {
        page.with_signal(TerminationSignal::Exhausted)
    } else {
        page
    })
}

fn catalog_item_to_raw(item: CatalogItem) -> Option<RawItem> {
    let Some(link) = item.url.or(item.path) else {
        debug!("Skipped Vinted item {:?}: no url", item.id);
        return None;
    };

    let published = item
        .photo
        .as_ref()
        .and_then(|p| p.high_resolution.as_ref())
        .and_then(|h| h.timestamp)
        .map(RawTimestamp::UnixSeconds)
        .or_else(|| item.created_at_ts.map(RawTimestamp::Iso));

    Some(RawItem {
        source_id: item.id.map(|id| match id {
            Value::String(s) => s,
            other => other.to_string(),
        }),
        title: item.title.trim().to_string(),
        price: item.price.as_ref().and_then(price_text),
        // Favourites are the only engagement signal Vinted exposes.
        temperature: item.favourite_count.map(|c| c.to_string()),
        published,
        link: Some(link),
        photo: item.photo.and_then(|p| p.url),
        attributes: DealAttributes {
            brand: item.brand_title.filter(|b| !b.is_empty()),
            size: item.size_title.filter(|s| !s.is_empty()),
            condition: item.status,
            seller: item.user.and_then(|u| u.login),
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Vinted has sent prices as strings, numbers and `{amount, currency_code}` objects.
fn price_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("amount").and_then(price_text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::http::build_client;
    use crate::testing::{StubResponse, StubServer};
    use std::time::Duration;

    const CATALOG: &str = r#"{
      "items": [
        {
          "id": 4411223344,
          "title": "LEGO Star Wars 75192 Millennium Falcon",
          "price": {"amount": "650.0", "currency_code": "EUR"},
          "brand_title": "LEGO",
          "size_title": "",
          "status": "Neuf avec étiquette",
          "favourite_count": 23,
          "url": "https://www.vinted.fr/items/4411223344-lego-75192",
          "photo": {"url": "https://images1.vinted.net/t/01.jpeg", "high_resolution": {"timestamp": 1710252300}},
          "user": {"login": "brickfan"}
        },
        {
          "id": 4411223345,
          "title": "Lot LEGO City",
          "price": "15,00",
          "path": "/items/4411223345-lot-lego-city",
          "created_at_ts": "2024-03-10T09:00:00+01:00"
        },
        {
          "id": 4411223346,
          "title": ["not", "a", "string"],
          "url": "https://www.vinted.fr/items/4411223346"
        },
        {
          "id": 4411223347,
          "title": "No link at all",
          "price": 3
        }
      ],
      "pagination": {"current_page": 1, "total_pages": 5}
    }"#;

    #[test]
    fn test_catalog_items_map_to_raw_items() {
        let page = parse_catalog(CATALOG).unwrap();
        assert_eq!(page.signal, None);
        assert_eq!(page.items.len(), 2);

        let falcon = &page.items[0];
        assert_eq!(falcon.source_id.as_deref(), Some("4411223344"));
        assert_eq!(falcon.price.as_deref(), Some("650.0"));
        assert_eq!(falcon.temperature.as_deref(), Some("23"));
        assert_eq!(falcon.published, Some(RawTimestamp::UnixSeconds(1710252300)));
        assert_eq!(falcon.attributes.brand.as_deref(), Some("LEGO"));
        assert_eq!(falcon.attributes.size, None);
        assert_eq!(falcon.attributes.seller.as_deref(), Some("brickfan"));
        assert_eq!(
            falcon.photo.as_deref(),
            Some("https://images1.vinted.net/t/01.jpeg")
        );

        let city = &page.items[1];
        assert_eq!(city.price.as_deref(), Some("15,00"));
        assert_eq!(city.link.as_deref(), Some("/items/4411223345-lot-lego-city"));
        assert_eq!(
            city.published,
            Some(RawTimestamp::Iso("2024-03-10T09:00:00+01:00".to_string()))
        );
    }

    #[test]
    fn test_last_page_carries_exhausted_signal() {
        let body = r#"{"items":[{"id":1,"title":"LEGO 10300","price":"120","path":"/items/1"}],
                       "pagination":{"current_page":3,"total_pages":3}}"#;
        let page = parse_catalog(body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.signal, Some(TerminationSignal::Exhausted));
    }

    #[test]
    fn test_empty_catalog_is_plain_empty_page() {
        let page = parse_catalog(r#"{"items":[],"pagination":{"current_page":9,"total_pages":8}}"#).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.signal, None);
    }

    #[test]
    fn test_non_json_body_is_an_error() {
        assert!(matches!(
            parse_catalog("<html>captcha</html>"),
            Err(ScrapeError::Json(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), TerminationSignal::RateLimited);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), TerminationSignal::Exhausted);
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            TerminationSignal::Fatal(_)
        ));
        assert!(is_auth_failure(StatusCode::UNAUTHORIZED));
        assert!(!is_auth_failure(StatusCode::TOO_MANY_REQUESTS));
    }

    fn landing(token: &str, cookie: &str) -> StubResponse {
        StubResponse::ok(format!(
            r#"<html><script>window.__CONFIG__ = {{"CSRF_TOKEN":"{token}"}};</script></html>"#
        ))
        .header("Set-Cookie", &format!("{cookie}; Path=/; HttpOnly"))
    }

    const LAST_PAGE: &str = r#"{"items":[{"id":1,"title":"LEGO 10300 DeLorean","price":"120","path":"/items/1"}],
                               "pagination":{"current_page":1,"total_pages":1}}"#;

    fn adapter_for(server: &StubServer) -> VintedAdapter {
        VintedAdapter::new(
            build_client(Duration::from_secs(5)).unwrap(),
            server.origin(),
            SearchParams::default(),
        )
    }

    #[tokio::test]
    async fn test_rejected_session_is_refreshed_once() {
        let server = StubServer::start(vec![
            ("/", vec![landing("tok-1", "anon_id=a1"), landing("tok-2", "anon_id=a2")]),
            (CATALOG_PATH, vec![StubResponse::status(401), StubResponse::ok(LAST_PAGE)]),
        ])
        .await;
        let adapter = adapter_for(&server);

        adapter.prepare().await.unwrap();
        let page = adapter.fetch_page(1).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.signal, Some(TerminationSignal::Exhausted));
        assert_eq!(server.hits("/"), 2);

        let api_calls: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.path == CATALOG_PATH)
            .collect();
        assert_eq!(api_calls.len(), 2);
        assert!(api_calls[0].head.contains("x-csrf-token: tok-1"));
        assert!(api_calls[1].head.contains("x-csrf-token: tok-2"));
        assert!(api_calls[1].head.contains("cookie: anon_id=a2"));
        assert!(api_calls[1].head.contains("search_text=lego"));
    }

    #[tokio::test]
    async fn test_second_rejection_expires_session() {
        let server = StubServer::start(vec![
            ("/", vec![landing("tok-1", "anon_id=a1")]),
            (CATALOG_PATH, vec![StubResponse::status(401)]),
        ])
        .await;
        let adapter = adapter_for(&server);

        adapter.prepare().await.unwrap();
        let err = adapter.fetch_page(1).await.unwrap_err();

        assert!(matches!(
            err,
            ScrapeError::SessionExpired { status, .. } if status == StatusCode::UNAUTHORIZED
        ));
        assert_eq!(server.hits("/"), 2);
        assert_eq!(server.hits(CATALOG_PATH), 2);

        // The refresh is spent; later pages fail without bootstrapping again.
        assert!(adapter.fetch_page(2).await.is_err());
        assert_eq!(server.hits("/"), 2);
    }

    #[tokio::test]
    async fn test_landing_without_token_fails_prepare() {
        let server = StubServer::start(vec![(
            "/",
            vec![StubResponse::ok("<html><body>Bienvenue</body></html>")],
        )])
        .await;

        let err = adapter_for(&server).prepare().await.unwrap_err();
        assert!(matches!(err, ScrapeError::MissingToken { .. }));
        assert_eq!(server.hits(CATALOG_PATH), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_api_page_is_signal() {
        let server = StubServer::start(vec![
            ("/", vec![landing("tok-1", "anon_id=a1")]),
            (CATALOG_PATH, vec![StubResponse::status(429)]),
        ])
        .await;
        let adapter = adapter_for(&server);

        adapter.prepare().await.unwrap();
        assert_eq!(
            adapter.fetch_page(1).await.unwrap(),
            Page::terminated(TerminationSignal::RateLimited)
        );
    }

    #[test]
    fn test_page_url_encodes_query() {
        let adapter = VintedAdapter::new(
            Client::new(),
            "https://www.vinted.fr/",
            SearchParams {
                search_text: "lego star wars".to_string(),
                per_page: 48,
                order: "newest_first".to_string(),
            },
        );
        let url = adapter.page_url(2).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.vinted.fr/api/v2/catalog/items?search_text=lego+star+wars&page=2&per_page=48&order=newest_first"
        );
    }
}
