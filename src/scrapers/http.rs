use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::USER_AGENT;
use crate::error::{Result, ScrapeError};

/// Build the HTTP client shared by every source in a run.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.8"));

    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// GET a page body. Non-success statuses come back as `ScrapeError::Status`
/// so callers can classify them per source.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    debug!("Fetching URL: {}", url);

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        warn!("{} returned status: {}", url, status);
        return Err(ScrapeError::Status {
            status,
            url: url.to_string(),
        });
    }

    let body = response.text().await?;
    debug!("Downloaded {} bytes from {}", body.len(), url);
    Ok(body)
}
