use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::{info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;

use crate::*;

const TTL_DAYS_DEFAULT: i64 = 30;
const ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub path: PathBuf,
    pub ttl_days: i64,
    /// Path prefix of the shareable link, e.g. `/view`.
    pub view_prefix: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(
                std::env::var("ROADMAP_DB_PATH").unwrap_or_else(|_| "roadmap.db".to_string()),
            ),
            ttl_days: std::env::var("ROADMAP_PUBLISH_TTL_DAYS")
                .ok()
                .and_then(|days| days.parse().ok())
                .filter(|days| *days > 0)
                .unwrap_or(TTL_DAYS_DEFAULT),
            view_prefix: std::env::var("ROADMAP_VIEW_PREFIX")
                .unwrap_or_else(|_| "/view".to_string()),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PublishedRow {
    payload: String,
    expires_at: String,
}

/// Write-once key-value store for shared roadmaps, kept in SQLite.
#[derive(Debug, Clone)]
pub struct SqlitePublishStore {
    pool: Pool<Sqlite>,
    config: PublishConfig,
}

/// Fixed-width UTC timestamps so that SQL string comparison orders them.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn transient(what: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |err| StoreError::Transient(format!("{what}: {err}"))
}

impl SqlitePublishStore {
    pub async fn new(config: PublishConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|err| StoreError::Config(format!("failed to open {}: {err}", config.path.display())))?;

        let store = Self { pool, config };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS published_roadmaps (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(transient("failed to create published_roadmaps table"))?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_published_expire ON published_roadmaps(expires_at)"#)
            .execute(&self.pool)
            .await
            .map_err(transient("failed to create published_roadmaps expiry index"))?;

        Ok(())
    }

    /// Deletes every entry past its expiry. Returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let deleted = sqlx::query(r#"DELETE FROM published_roadmaps WHERE expires_at <= ?"#)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(transient("failed to clean up expired roadmaps"))?
            .rows_affected();
        if deleted > 0 {
            info!("removed {deleted} expired published roadmap(s)");
        }
        Ok(deleted)
    }

    fn view_url(&self, id: &str) -> String {
        format!("{}/{}", self.config.view_prefix.trim_end_matches('/'), id)
    }

    async fn insert(&self, record: &PublishedRoadmap, expires_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(record)?;
        let inserted = sqlx::query(
            r#"INSERT OR IGNORE INTO published_roadmaps (id, title, payload, created_at, expires_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(payload)
        .bind(timestamp(record.created_at))
        .bind(timestamp(expires_at))
        .execute(&self.pool)
        .await
        .map_err(transient("failed to store published roadmap"))?
        .rows_affected();
        Ok(inserted == 1)
    }
}

impl PublishStore for SqlitePublishStore {
    async fn publish(
        &self,
        title: Option<&str>,
        topics: &[Topic],
        layout: &LayoutSnapshot,
    ) -> Result<PublishReceipt, StoreError> {
        if topics.is_empty() {
            return Err(StoreError::Validation("a roadmap needs at least one topic".into()));
        }

        let created_at = Utc::now();
        let expires_at = created_at + Duration::days(self.config.ttl_days);
        let mut record = PublishedRoadmap {
            id: String::new(),
            title: title
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .unwrap_or(DEFAULT_ROADMAP_TITLE)
                .to_string(),
            nodes: topics.to_vec(),
            layout: LayoutSnapshot {
                groups: Some(layout.groups.clone().unwrap_or_default()),
                edges: Some(layout.edges.clone().unwrap_or_default()),
                ..layout.clone()
            },
            created_at,
        };

        for _ in 0..ID_ATTEMPTS {
            record.id = short_id();
            if self.insert(&record, expires_at).await? {
                info!("published roadmap '{}' as {}", record.title, record.id);
                return Ok(PublishReceipt {
                    url: self.view_url(&record.id),
                    id: record.id,
                    expires_at,
                    expires_in_days: self.config.ttl_days,
                });
            }
            warn!("short id {} already taken; retrying", record.id);
        }
        Err(StoreError::Transient(format!(
            "could not allocate a free id after {ID_ATTEMPTS} attempts"
        )))
    }

    async fn fetch_published(&self, id: &str) -> Result<PublishedRoadmap, StoreError> {
        let row = sqlx::query_as::<_, PublishedRow>(
            r#"SELECT payload, expires_at FROM published_roadmaps WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient("failed to load published roadmap"))?
        .ok_or_else(|| StoreError::NotFound(format!("roadmap '{id}'")))?;

        let expires_at = DateTime::parse_from_rfc3339(&row.expires_at)
            .map_err(|err| StoreError::Serialization(format!("bad expiry for '{id}': {err}")))?;
        if expires_at.with_timezone(&Utc) <= Utc::now() {
            return Err(StoreError::NotFound(format!("roadmap '{id}' has expired")));
        }

        let mut roadmap: PublishedRoadmap = serde_json::from_str(&row.payload)?;
        roadmap.id = id.to_string();
        Ok(roadmap)
    }
}
