//! Conversion history persistence (append-only)

use forge_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::assets::{parse_timestamp, timestamp};
use crate::models::ConversionRecord;

pub async fn insert_conversion(pool: &SqlitePool, record: &ConversionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO conversion_history (id, name, from_format, to_format, file_size, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.name)
    .bind(record.from_format.extension())
    .bind(record.to_format.extension())
    .bind(record.file_size)
    .bind(timestamp(&record.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest conversions first
pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<ConversionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, from_format, to_format, file_size, created_at
        FROM conversion_history
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let from_format: String = row.get("from_format");
            let to_format: String = row.get("to_format");
            let created_at: String = row.get("created_at");

            Ok(ConversionRecord {
                id: Uuid::parse_str(&id)
                    .map_err(|e| Error::Internal(format!("Failed to parse conversion id: {}", e)))?,
                name: row.get("name"),
                from_format: from_format.parse().map_err(Error::Internal)?,
                to_format: to_format.parse().map_err(Error::Internal)?,
                file_size: row.get("file_size"),
                created_at: parse_timestamp(&created_at, "created_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelFormat;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_insert_and_list() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        forge_common::db::create_tables(&pool).await.unwrap();

        let first = ConversionRecord::new("chair.glb", ModelFormat::Glb, ModelFormat::Fbx, 1024);
        insert_conversion(&pool, &first).await.unwrap();
        let mut second = ConversionRecord::new("lamp.glb", ModelFormat::Glb, ModelFormat::Obj, 2048);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        insert_conversion(&pool, &second).await.unwrap();

        let recent = list_recent(&pool, 50).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "lamp.glb");
        assert_eq!(recent[0].to_format, ModelFormat::Obj);
        assert_eq!(recent[1].file_size, 1024);
    }
}
