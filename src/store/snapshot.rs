use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::models::Deal;

/// Write the run's combined batch as one pretty-printed JSON array, named
/// after the source selector and the run's start time.
pub async fn write_snapshot(
    dir: &Path,
    selector: &str,
    deals: &[Deal],
    run_started: DateTime<Utc>,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let filename = format!(
        "{}_deals_{}.json",
        selector,
        run_started.format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(filename);

    let json = serde_json::to_string_pretty(deals)?;
    tokio::fs::write(&path, json).await?;
    info!("💾 Saved {} deals to {}", deals.len(), path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Community, DealAttributes};
    use chrono::TimeZone;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_snapshot_is_camel_case_array() {
        let dir = tempfile::tempdir().unwrap();
        let started = Utc.with_ymd_and_hms(2024, 11, 2, 8, 30, 5).unwrap();
        let deal = Deal {
            uuid: Uuid::new_v4(),
            external_id: Some("75192".to_string()),
            community: Community::Dealabs,
            title: "Millennium Falcon".to_string(),
            price: 649.99,
            base_price: Some(849.99),
            discount: Some(23.53),
            discount_label: None,
            comment_count: 12,
            temperature: 152.0,
            published_at: started,
            link: "https://www.dealabs.com/bons-plans/falcon-123".to_string(),
            photo: None,
            attributes: DealAttributes::default(),
        };

        let path = write_snapshot(dir.path(), "all", &[deal], started)
            .await
            .unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "all_deals_20241102_083005.json"
        );

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let first = &written.as_array().unwrap()[0];
        assert_eq!(first["externalId"], "75192");
        assert_eq!(first["commentCount"], 12);
        assert_eq!(first["publishedAt"], "2024-11-02T08:30:05Z");
    }
}
