use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    /// Credited stars. Only the review workflow mutates it.
    pub balance: i64,
    pub referrer_telegram_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
