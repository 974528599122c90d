use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, ScrapeError};
use crate::models::{Community, Deal, DealAttributes};
use crate::store::{DealQuery, DealStore, ExternalIdCount, SortOrder};

const DEAL_COLUMNS: &str = "uuid, external_id, community, title, price, base_price, discount, \
     discount_label, comment_count, temperature, published_at, link, photo, attributes";

/// SQLite-backed deal store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the `deals` table if needed.
    ///
    /// `sqlite::memory:` gives an ephemeral database pinned to a single
    /// connection; `sqlite://deals.db?mode=rwc` creates the file on first use.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("🗄️ Connected to {}", database_url);
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                uuid TEXT PRIMARY KEY,
                external_id TEXT,
                community TEXT NOT NULL,
                title TEXT NOT NULL,
                price REAL NOT NULL,
                base_price REAL,
                discount REAL,
                discount_label TEXT,
                comment_count INTEGER NOT NULL DEFAULT 0,
                temperature REAL NOT NULL DEFAULT 0,
                published_at TEXT NOT NULL,
                link TEXT NOT NULL,
                photo TEXT,
                attributes TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_deals_community ON deals(community);
            CREATE INDEX IF NOT EXISTS idx_deals_published_at ON deals(published_at);
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Fixed-width UTC text so lexical order matches chronological order.
fn timestamp_text(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, FromRow)]
struct DealRow {
    uuid: String,
    external_id: Option<String>,
    community: String,
    title: String,
    price: f64,
    base_price: Option<f64>,
    discount: Option<f64>,
    discount_label: Option<String>,
    comment_count: i64,
    temperature: f64,
    published_at: String,
    link: String,
    photo: Option<String>,
    attributes: String,
}

impl TryFrom<DealRow> for Deal {
    type Error = ScrapeError;

    fn try_from(row: DealRow) -> Result<Self> {
        let uuid = Uuid::parse_str(&row.uuid)
            .map_err(|e| ScrapeError::InvalidItem(format!("stored uuid {}: {e}", row.uuid)))?;
        let community = Community::from_tag(&row.community).ok_or_else(|| {
            ScrapeError::InvalidItem(format!("unknown community {}", row.community))
        })?;
        let published_at = DateTime::parse_from_rfc3339(&row.published_at)
            .map_err(|e| ScrapeError::InvalidItem(format!("stored date {}: {e}", row.published_at)))?
            .with_timezone(&Utc);
        let attributes: DealAttributes = serde_json::from_str(&row.attributes)?;

        Ok(Deal {
            uuid,
            external_id: row.external_id,
            community,
            title: row.title,
            price: row.price,
            base_price: row.base_price,
            discount: row.discount,
            discount_label: row.discount_label,
            comment_count: u32::try_from(row.comment_count).unwrap_or(0),
            temperature: row.temperature,
            published_at,
            link: row.link,
            photo: row.photo,
            attributes,
        })
    }
}

#[async_trait]
impl DealStore for SqliteStore {
    async fn clear(&self, scope: &[Community]) -> Result<u64> {
        if scope.is_empty() {
            return Ok(0);
        }

        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM deals WHERE community IN (");
        let mut tags = builder.separated(", ");
        for community in scope {
            tags.push_bind(community.as_str());
        }
        tags.push_unseparated(")");

        let deleted = builder.build().execute(&self.pool).await?.rows_affected();
        debug!("Deleted {} stored deals", deleted);
        Ok(deleted)
    }

    async fn insert_many(&self, deals: &[Deal]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for deal in deals {
            let attributes = serde_json::to_string(&deal.attributes)?;
            sqlx::query(
                r#"
                INSERT INTO deals (uuid, external_id, community, title, price, base_price,
                    discount, discount_label, comment_count, temperature, published_at,
                    link, photo, attributes)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(deal.uuid.to_string())
            .bind(&deal.external_id)
            .bind(deal.community.as_str())
            .bind(&deal.title)
            .bind(deal.price)
            .bind(deal.base_price)
            .bind(deal.discount)
            .bind(&deal.discount_label)
            .bind(i64::from(deal.comment_count))
            .bind(deal.temperature)
            .bind(timestamp_text(&deal.published_at))
            .bind(&deal.link)
            .bind(&deal.photo)
            .bind(attributes)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(deals.len() as u64)
    }

    async fn find(&self, query: &DealQuery) -> Result<Vec<Deal>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {DEAL_COLUMNS} FROM deals WHERE 1 = 1"
        ));
        if let Some(max_price) = query.max_price {
            builder.push(" AND price <= ").push_bind(max_price);
        }
        if let Some(after) = &query.published_after {
            builder
                .push(" AND published_at >= ")
                .push_bind(timestamp_text(after));
        }
        if let Some(min_comments) = query.min_comments {
            builder
                .push(" AND comment_count > ")
                .push_bind(i64::from(min_comments));
        }
        if query.with_discount {
            builder.push(" AND discount IS NOT NULL");
        }
        builder.push(match query.sort {
            SortOrder::PriceAsc => " ORDER BY price ASC",
            SortOrder::DiscountDesc => " ORDER BY discount DESC",
            SortOrder::CommentsDesc => " ORDER BY comment_count DESC",
            SortOrder::PublishedDesc => " ORDER BY published_at DESC",
        });
        builder.push(", title ASC");
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder
            .build_query_as::<DealRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Deal::try_from).collect()
    }

    async fn count_by_external_id(&self) -> Result<Vec<ExternalIdCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT external_id, COUNT(*) AS occurrences
            FROM deals
            WHERE external_id IS NOT NULL
            GROUP BY external_id
            ORDER BY occurrences DESC, external_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(external_id, occurrences)| ExternalIdCount {
                external_id,
                occurrences: occurrences.max(0) as u64,
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Closed deal store");
    }
}
