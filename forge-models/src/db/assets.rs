//! Asset record persistence
//!
//! Records are keyed by `id` but looked up by `provider_task_id`, the only
//! identifier a polling client sends back. Updates are plain
//! `UPDATE ... WHERE provider_task_id = ?`; concurrent writers race and the
//! last one wins.

use chrono::{DateTime, SecondsFormat, Utc};
use forge_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{AssetRecord, AssetStatus};

/// Local-storage URL prefix; paths under it are never replaced by remote URLs
pub const LOCAL_PREFIX: &str = "/storage/";

/// True when `path` points at a materialized local file
pub fn is_local_path(path: &str) -> bool {
    path.starts_with(LOCAL_PREFIX)
}

/// Fields written when a poll observes a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdate {
    pub status: AssetStatus,
    pub file_path: Option<String>,
    pub thumbnail_path: Option<String>,
}

impl AssetUpdate {
    pub fn status(status: AssetStatus) -> Self {
        Self {
            status,
            file_path: None,
            thumbnail_path: None,
        }
    }
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed precision keeps lexical order equal to chronological order
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Insert a freshly submitted record
pub async fn insert_asset(pool: &SqlitePool, asset: &AssetRecord) -> Result<()> {
    let tags = serde_json::to_string(&asset.tags)
        .map_err(|e| Error::Internal(format!("Failed to serialize tags: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO assets (
            id, name, prompt, enhanced_prompt, provider, provider_task_id,
            status, format, file_path, thumbnail_path, tags, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset.id.to_string())
    .bind(&asset.name)
    .bind(&asset.prompt)
    .bind(&asset.enhanced_prompt)
    .bind(asset.provider.as_str())
    .bind(&asset.provider_task_id)
    .bind(asset.status.as_str())
    .bind(asset.format.extension())
    .bind(&asset.file_path)
    .bind(&asset.thumbnail_path)
    .bind(tags)
    .bind(timestamp(&asset.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the record for a provider task, if one was stored
///
/// Task ids are unique per provider in practice; should two records share
/// one, the newest wins.
pub async fn find_by_task_id(pool: &SqlitePool, task_id: &str) -> Result<Option<AssetRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, prompt, enhanced_prompt, provider, provider_task_id,
               status, format, file_path, thumbnail_path, tags, created_at
        FROM assets
        WHERE provider_task_id = ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(row_to_asset).transpose()
}

/// Apply a terminal-state update to every record for `task_id`
///
/// A path already under [`LOCAL_PREFIX`] is kept when the update carries a
/// remote URL. Returns the number of rows touched (0 when the task was never
/// recorded).
pub async fn update_by_task_id(
    pool: &SqlitePool,
    task_id: &str,
    update: &AssetUpdate,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE assets SET
            status = ?,
            file_path = CASE
                WHEN ?2 IS NULL THEN file_path
                WHEN file_path LIKE '/storage/%' AND ?2 NOT LIKE '/storage/%' THEN file_path
                ELSE ?2
            END,
            thumbnail_path = CASE
                WHEN ?3 IS NULL THEN thumbnail_path
                WHEN thumbnail_path LIKE '/storage/%' AND ?3 NOT LIKE '/storage/%' THEN thumbnail_path
                ELSE ?3
            END
        WHERE provider_task_id = ?4
        "#,
    )
    .bind(update.status.as_str())
    .bind(update.file_path.as_deref())
    .bind(update.thumbnail_path.as_deref())
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Newest records first
pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<AssetRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, prompt, enhanced_prompt, provider, provider_task_id,
               status, format, file_path, thumbnail_path, tags, created_at
        FROM assets
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_asset).collect()
}

fn row_to_asset(row: &SqliteRow) -> Result<AssetRecord> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse asset id: {}", e)))?;

    let provider: String = row.get("provider");
    let status: String = row.get("status");
    let format: String = row.get("format");

    let tags: String = row.get("tags");
    let tags: Vec<String> = serde_json::from_str(&tags)
        .map_err(|e| Error::Internal(format!("Failed to deserialize tags: {}", e)))?;

    let created_at: String = row.get("created_at");

    Ok(AssetRecord {
        id,
        name: row.get("name"),
        prompt: row.get("prompt"),
        enhanced_prompt: row.get("enhanced_prompt"),
        provider: provider.parse().map_err(Error::Internal)?,
        provider_task_id: row.get("provider_task_id"),
        status: status.parse().map_err(Error::Internal)?,
        format: format.parse().map_err(Error::Internal)?,
        file_path: row.get("file_path"),
        thumbnail_path: row.get("thumbnail_path"),
        tags,
        created_at: parse_timestamp(&created_at, "created_at")?,
    })
}
