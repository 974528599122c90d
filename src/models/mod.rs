use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marketplace a deal was scraped from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Community {
    Dealabs,
    Vinted,
    #[serde(rename = "avenuedelabrique")]
    AvenueDeLaBrique,
}

impl Community {
    pub const ALL: [Community; 3] = [
        Community::Dealabs,
        Community::Vinted,
        Community::AvenueDeLaBrique,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Community::Dealabs => "dealabs",
            Community::Vinted => "vinted",
            Community::AvenueDeLaBrique => "avenuedelabrique",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }
}

impl std::fmt::Display for Community {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication time exactly as a source emitted it
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    UnixSeconds(i64),
    Iso(String),
    Locale(String),
}

/// Optional descriptive fields; none of them feed into derived values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DealAttributes {
    /// Overlay non-empty values from `other` onto `self`.
    pub fn merge(&mut self, other: DealAttributes) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }
        take(&mut self.brand, other.brand);
        take(&mut self.model, other.model);
        take(&mut self.sku, other.sku);
        take(&mut self.category, other.category);
        take(&mut self.release_date, other.release_date);
        take(&mut self.retailer, other.retailer);
        take(&mut self.shipping, other.shipping);
        take(&mut self.size, other.size);
        take(&mut self.condition, other.condition);
        take(&mut self.seller, other.seller);
        take(&mut self.description, other.description);
    }
}

/// Unnormalized record as a Source Adapter extracted it.
///
/// Prices and counts stay as text here; sources disagree on formats and the
/// normalizer owns the parsing rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub source_id: Option<String>,
    pub title: String,
    pub price: Option<String>,
    pub base_price: Option<String>,
    pub discount_label: Option<String>,
    pub comment_count: Option<String>,
    pub temperature: Option<String>,
    pub published: Option<RawTimestamp>,
    pub link: Option<String>,
    pub photo: Option<String>,
    pub attributes: DealAttributes,
}

impl RawItem {
    #[cfg(test)]
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: Some(link.into()),
            ..Self::default()
        }
    }
}

/// Canonical deal record, identical in shape across all sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub uuid: Uuid,
    pub external_id: Option<String>,
    pub community: Community,
    pub title: String,
    pub price: f64,
    #[serde(alias = "nextBestPrice")]
    pub base_price: Option<f64>,
    pub discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_label: Option<String>,
    pub comment_count: u32,
    pub temperature: f64,
    pub published_at: DateTime<Utc>,
    pub link: String,
    #[serde(alias = "imageUrl")]
    pub photo: Option<String>,
    #[serde(default)]
    pub attributes: DealAttributes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_tags_round_trip() {
        for community in Community::ALL {
            assert_eq!(Community::from_tag(community.as_str()), Some(community));
        }
        assert_eq!(Community::from_tag("leboncoin"), None);
    }

    #[test]
    fn test_attribute_merge_keeps_existing_on_empty() {
        let mut attrs = DealAttributes {
            brand: Some("LEGO".to_string()),
            category: Some("Technic".to_string()),
            ..Default::default()
        };
        attrs.merge(DealAttributes {
            brand: Some("  ".to_string()),
            category: Some("City".to_string()),
            sku: Some("60337".to_string()),
            ..Default::default()
        });
        assert_eq!(attrs.brand.as_deref(), Some("LEGO"));
        assert_eq!(attrs.category.as_deref(), Some("City"));
        assert_eq!(attrs.sku.as_deref(), Some("60337"));
    }

    #[test]
    fn test_deal_serializes_camel_case() {
        let deal = Deal {
            uuid: Uuid::new_v4(),
            external_id: Some("42151".to_string()),
            community: Community::AvenueDeLaBrique,
            title: "Bugatti Bolide".to_string(),
            price: 39.99,
            base_price: Some(49.99),
            discount: Some(20.0),
            discount_label: None,
            comment_count: 0,
            temperature: 0.0,
            published_at: Utc::now(),
            link: "https://www.avenuedelabrique.com/lego-42151".to_string(),
            photo: None,
            attributes: DealAttributes::default(),
        };
        let value = serde_json::to_value(&deal).unwrap();
        assert_eq!(value["externalId"], "42151");
        assert_eq!(value["community"], "avenuedelabrique");
        assert_eq!(value["basePrice"], 49.99);
        assert!(value.get("publishedAt").is_some());
        assert!(value.get("discountLabel").is_none());
    }
}
