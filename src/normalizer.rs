//! Canonicalization of source-shaped items into [`Deal`] records.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, ScrapeError};
use crate::models::{Community, Deal, RawItem, RawTimestamp};

static RE_PAREN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d{5,})\)").expect("valid id regex"));

static RE_NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})(?:\D+?(\d{1,2})[:h](\d{2}))?")
        .expect("valid numeric date regex")
});

static RE_FRENCH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{1,2})(?:er)?\s+(janv(?:ier)?|f[ée]vr(?:ier)?|mars|avr(?:il)?|mai|juin|juil(?:let)?|ao[ûu]t|sept(?:embre)?|oct(?:obre)?|nov(?:embre)?|d[ée]c(?:embre)?)\.?(?:\s+(\d{4}))?(?:\D+?(\d{1,2})[:h](\d{2}))?",
    )
    .expect("valid french date regex")
});

/// Maps raw items from one source onto canonical deals.
#[derive(Debug, Clone)]
pub struct Normalizer {
    community: Community,
    origin: String,
    /// Fallback publication time and reference year for partial dates
    run_started: DateTime<Utc>,
}

impl Normalizer {
    pub fn new(community: Community, origin: impl Into<String>, run_started: DateTime<Utc>) -> Self {
        Self {
            community,
            origin: origin.into(),
            run_started,
        }
    }

    pub fn normalize(&self, raw: RawItem) -> Result<Deal> {
        let title = raw.title.trim().to_string();

        let link = raw
            .link
            .as_deref()
            .and_then(|l| resolve_link(&self.origin, l))
            .ok_or_else(|| {
                let id = raw.source_id.as_deref().unwrap_or("?");
                ScrapeError::InvalidItem(format!("no usable link for {title:?} (source id {id})"))
            })?;

        let price = raw.price.as_deref().and_then(parse_price).unwrap_or(0.0);
        let base_price = raw.base_price.as_deref().and_then(parse_price);

        let published_at = match raw.published.as_ref() {
            Some(ts) => normalize_timestamp(ts, self.run_started).unwrap_or_else(|| {
                debug!("Unparseable timestamp {:?}, using run start", ts);
                self.run_started
            }),
            None => self.run_started,
        };

        Ok(Deal {
            uuid: Uuid::new_v4(),
            external_id: extract_external_id(&title),
            community: self.community,
            price,
            base_price,
            discount: derive_discount(price, base_price),
            discount_label: raw.discount_label.filter(|l| !l.trim().is_empty()),
            comment_count: raw.comment_count.as_deref().map(parse_count).unwrap_or(0),
            temperature: raw
                .temperature
                .as_deref()
                .and_then(parse_temperature)
                .unwrap_or(0.0)
                .max(0.0),
            published_at,
            link,
            photo: raw.photo.as_deref().and_then(|p| resolve_link(&self.origin, p)),
            attributes: raw.attributes,
            title,
        })
    }

    /// Normalize a whole source batch; items that can't be normalized are logged and skipped.
    pub fn normalize_all(&self, items: Vec<RawItem>) -> (Vec<Deal>, usize) {
        let mut skipped = 0;
        let deals = items
            .into_iter()
            .filter_map(|item| match self.normalize(item) {
                Ok(deal) => Some(deal),
                Err(e) => {
                    warn!("Skipping {} item: {}", self.community, e);
                    skipped += 1;
                    None
                }
            })
            .collect();
        (deals, skipped)
    }
}

/// Percentage saved relative to `base_price`, rounded to 2 decimals and clamped to [-100, 100].
pub fn derive_discount(price: f64, base_price: Option<f64>) -> Option<f64> {
    let base = base_price.filter(|b| *b > 0.0)?;
    let discount = round2((1.0 - price / base) * 100.0);
    Some(discount.clamp(-100.0, 100.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Set number embedded in a title: a parenthesized run of 5+ digits first,
/// else the first whitespace-delimited token made only of 5+ digits.
pub fn extract_external_id(title: &str) -> Option<String> {
    if let Some(caps) = RE_PAREN_ID.captures(title) {
        return Some(caps[1].to_string());
    }
    title
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c.is_ascii_punctuation()))
        .find(|token| token.len() >= 5 && token.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Parse locale-formatted money: `1 299,99 €`, `29.99€`, `EUR 12`.
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Whichever separator comes last is the decimal one.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned,
    };

    normalized
        .trim_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .map(|p| p.max(0.0))
}

/// Parse a count like `12`, `1 204 commentaires`; anything else is 0.
pub fn parse_count(text: &str) -> u32 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Parse a vote temperature such as `152°`, `-12°` or `152.3`.
pub fn parse_temperature(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
        .collect();
    cleaned.replace(',', ".").parse().ok()
}

/// Turn any source timestamp into an absolute UTC instant.
///
/// `reference` supplies the year for locale dates that omit it.
pub fn normalize_timestamp(raw: &RawTimestamp, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::UnixSeconds(secs) => {
            // Some feeds send milliseconds.
            let secs = if secs.unsigned_abs() >= 100_000_000_000 { secs / 1000 } else { *secs };
            DateTime::from_timestamp(secs, 0)
        }
        RawTimestamp::Iso(text) => parse_iso(text.trim()),
        RawTimestamp::Locale(text) => parse_locale(text, reference),
    }
}

fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// French-locale dates as shown on the marketplaces. Interpreted as UTC.
fn parse_locale(text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();

    let (day, month, year, hour, minute) = if let Some(c) = RE_NUMERIC_DATE.captures(&lower) {
        (
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
            c.get(4).and_then(|m| m.as_str().parse().ok()),
            c.get(5).and_then(|m| m.as_str().parse().ok()),
        )
    } else if let Some(c) = RE_FRENCH_DATE.captures(&lower) {
        let year = match c.get(3) {
            Some(y) => y.as_str().parse().ok()?,
            None => reference.year(),
        };
        (
            c[1].parse().ok()?,
            french_month(&c[2])?,
            year,
            c.get(4).and_then(|m| m.as_str().parse().ok()),
            c.get(5).and_then(|m| m.as_str().parse().ok()),
        )
    } else {
        return None;
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour.unwrap_or(0), minute.unwrap_or(0), 0)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

fn french_month(token: &str) -> Option<u32> {
    let month = match token {
        t if t.starts_with("jan") => 1,
        t if t.starts_with('f') => 2,
        t if t.starts_with("mar") => 3,
        t if t.starts_with("avr") => 4,
        t if t.starts_with("mai") => 5,
        t if t.starts_with("juin") => 6,
        t if t.starts_with("juil") => 7,
        t if t.starts_with("ao") => 8,
        t if t.starts_with("sep") => 9,
        t if t.starts_with("oct") => 10,
        t if t.starts_with("nov") => 11,
        t if t.starts_with('d') => 12,
        _ => return None,
    };
    Some(month)
}

/// Make `raw` absolute against `origin`. Absolute http(s) links are returned unchanged.
pub fn resolve_link(origin: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(raw.to_string()),
        Ok(_) => None,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(origin)
            .ok()?
            .join(raw)
            .ok()
            .map(String::from),
        Err(_) => None,
    }
}
