use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::user::User;

const USER_COLUMNS: &str = "id, telegram_id, balance, referrer_telegram_id, created_at";

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by ID")
    }

    pub async fn get_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE telegram_id = ?"
        ))
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by TG ID")
    }

    /// Returns the user and whether this call created it. An existing row keeps
    /// its original referrer; a self-referral is dropped.
    pub async fn get_or_create(
        &self,
        telegram_id: i64,
        referrer_telegram_id: Option<i64>,
    ) -> Result<(User, bool)> {
        let referrer = referrer_telegram_id.filter(|r| *r != telegram_id);

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (telegram_id, balance, referrer_telegram_id, created_at)
            VALUES (?, 0, ?, ?)
            ON CONFLICT(telegram_id) DO NOTHING
            "#,
        )
        .bind(telegram_id)
        .bind(referrer)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?
        .rows_affected()
            > 0;

        let user = self
            .get_by_telegram_id(telegram_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} vanished after upsert", telegram_id))?;

        if inserted {
            tracing::info!(
                "Registered user {} (referrer: {:?})",
                telegram_id,
                user.referrer_telegram_id
            );
        }

        Ok((user, inserted))
    }

    /// Adds `stars` to the balance. Returns false when no such user exists.
    pub async fn count_referrals(&self, telegram_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE referrer_telegram_id = ?")
            .bind(telegram_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count referrals")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;

    #[tokio::test]
    async fn get_or_create_is_idempotent_and_keeps_referrer() {
        let repo = UserRepository::new(init_memory_db().await.unwrap());

        let (first, created) = repo.get_or_create(100, Some(7)).await.unwrap();
        assert!(created);
        assert_eq!(first.balance, 0);
        assert_eq!(first.referrer_telegram_id, Some(7));

        let (again, created) = repo.get_or_create(100, Some(8)).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.referrer_telegram_id, Some(7));
    }

    #[tokio::test]
    async fn self_referral_is_ignored() {
        let repo = UserRepository::new(init_memory_db().await.unwrap());
        let (user, _) = repo.get_or_create(42, Some(42)).await.unwrap();
        assert_eq!(user.referrer_telegram_id, None);
    }

    #[tokio::test]
    async fn counts_referrals() {
        let repo = UserRepository::new(init_memory_db().await.unwrap());
        repo.get_or_create(10, None).await.unwrap();
        repo.get_or_create(11, Some(10)).await.unwrap();
        repo.get_or_create(12, Some(10)).await.unwrap();
        repo.get_or_create(13, Some(11)).await.unwrap();

        assert_eq!(repo.count_referrals(10).await.unwrap(), 2);
        assert_eq!(repo.count_referrals(13).await.unwrap(), 0);
    }
}
