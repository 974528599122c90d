use std::sync::LazyLock;

use regex::Regex;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};

/// Token embedded in inline JSON, either raw or JSON-escaped inside a script string.
static RE_JSON_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?"CSRF_TOKEN\\?"\s*:\s*\\?"([^"\\]+)\\?""#).expect("valid token regex")
});

static RE_META_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta[^>]*name="csrf-token"[^>]*content="([^"]+)""#).expect("valid meta regex")
});

/// Credentials replayed on every authenticated API call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Ready-to-send `Cookie` header value
    pub cookies: String,
}

/// Fetch the landing page of `origin` and pull out the anti-forgery token and session cookies.
///
/// Fails with `MissingToken` when no token pattern matches; callers must not
/// fall back to unauthenticated requests.
pub async fn bootstrap(client: &Client, origin: &str) -> Result<Session> {
    let url = format!("{}/", origin.trim_end_matches('/'));
    info!("🔑 Bootstrapping session from {}", url);

    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        warn!("Session bootstrap got status {} from {}", status, url);
        return Err(ScrapeError::Status { status, url });
    }

    let cookies = cookie_header(
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    );
    let body = response.text().await?;

    let token = extract_token(&body).ok_or_else(|| ScrapeError::MissingToken {
        origin: origin.to_string(),
    })?;

    debug!(
        "Session ready: token of {} chars, {} cookie(s)",
        token.len(),
        cookies.split("; ").filter(|c| !c.is_empty()).count()
    );
    Ok(Session { token, cookies })
}

/// Find the anti-forgery token in a landing page.
pub fn extract_token(html: &str) -> Option<String> {
    RE_JSON_TOKEN
        .captures(html)
        .or_else(|| RE_META_TOKEN.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|t| !t.is_empty())
}

/// Collapse `Set-Cookie` values into a single `Cookie` header, keeping only `name=value`.
pub fn cookie_header<'a>(set_cookies: impl Iterator<Item = &'a str>) -> String {
    set_cookies
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('=') && !pair.starts_with('='))
        .collect::<Vec<_>>()
        .join("; ")
}
