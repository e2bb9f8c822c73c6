//! Conversion history entry

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::ModelFormat;

/// One completed format conversion (informational, insert-only)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionRecord {
    pub id: Uuid,
    /// Uploaded file name
    pub name: String,
    pub from_format: ModelFormat,
    pub to_format: ModelFormat,
    /// Size of the uploaded source file in bytes
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

impl ConversionRecord {
    pub fn new(
        name: impl Into<String>,
        from_format: ModelFormat,
        to_format: ModelFormat,
        file_size: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            from_format,
            to_format,
            file_size: i64::try_from(file_size).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        }
    }
}
