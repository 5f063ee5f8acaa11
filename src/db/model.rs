use chrono::{DateTime, Utc};
use serde::Serialize;

/// Alias row mapping a public short id to a platform-native id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq, Eq)]
pub struct ShortIdRow {
    pub short_id: String,
    pub native_id: String,
    pub created_at: DateTime<Utc>,
}
