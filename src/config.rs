use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ScrapeError};

pub const DEALABS_ORIGIN: &str = "https://www.dealabs.com";
pub const VINTED_ORIGIN: &str = "https://www.vinted.fr";
pub const AVENUE_ORIGIN: &str = "https://www.avenuedelabrique.com";

/// Browser user agent sent with every request; the marketplaces reject obvious bots.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Hard ceiling on pages requested from one source in one run.
pub const DEFAULT_MAX_PAGES: u32 = 100;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_SEARCH_TEXT: &str = "lego";

pub const DEFAULT_VINTED_PER_PAGE: u32 = 96;

/// Deals published within this many days count as "recent" for the reporting queries.
pub const RECENT_DAYS: i64 = 21;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub log_level: String,
    /// Pagination ceiling per source (MAX_PAGES)
    pub max_pages: u32,
    /// Per-call transport timeout (REQUEST_TIMEOUT_SECS)
    pub request_timeout: Duration,
    /// Directory receiving the JSON snapshot; None disables it (SNAPSHOT_DIR, SNAPSHOT=off)
    pub snapshot_dir: Option<PathBuf>,
    /// Free-text query sent to API sources (SEARCH_TEXT)
    pub search_text: String,
    /// Items requested per Vinted page (VINTED_PER_PAGE)
    pub vinted_per_page: u32,
    pub dealabs_origin: String,
    pub vinted_origin: String,
    pub avenue_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://deals.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            snapshot_dir: Some(PathBuf::from(".")),
            search_text: DEFAULT_SEARCH_TEXT.to_string(),
            vinted_per_page: DEFAULT_VINTED_PER_PAGE,
            dealabs_origin: DEALABS_ORIGIN.to_string(),
            vinted_origin: VINTED_ORIGIN.to_string(),
            avenue_origin: AVENUE_ORIGIN.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup so tests don't have to mutate the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let snapshot_disabled = lookup("SNAPSHOT")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "off" | "false" | "0"))
            .unwrap_or(false);
        let snapshot_dir = if snapshot_disabled {
            None
        } else {
            lookup("SNAPSHOT_DIR")
                .map(PathBuf::from)
                .or(defaults.snapshot_dir)
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            max_pages: parse_var(&lookup, "MAX_PAGES", defaults.max_pages)?,
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
            snapshot_dir,
            search_text: lookup("SEARCH_TEXT").unwrap_or(defaults.search_text),
            vinted_per_page: parse_var(&lookup, "VINTED_PER_PAGE", defaults.vinted_per_page)?,
            dealabs_origin: lookup("DEALABS_ORIGIN").unwrap_or(defaults.dealabs_origin),
            vinted_origin: lookup("VINTED_ORIGIN").unwrap_or(defaults.vinted_origin),
            avenue_origin: lookup("AVENUE_ORIGIN").unwrap_or(defaults.avenue_origin),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ScrapeError::Config(format!("{key} must be a number, got {raw:?}"))),
        None => Ok(default),
    }
}
