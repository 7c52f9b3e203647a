use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::models::promo::PromoCode;

#[derive(Clone, Debug)]
pub struct PromoRepository {
    pool: SqlitePool,
}

impl PromoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        code: &str,
        discount: i64,
        amount_money: i64,
        max_uses: i64,
    ) -> Result<PromoCode> {
        if max_uses <= 0 {
            return Err(anyhow::anyhow!("Promo code needs at least one use"));
        }

        sqlx::query(
            "INSERT INTO promocodes (code, discount, amount_money, max_uses) VALUES (?, ?, ?, ?)",
        )
        .bind(code)
        .bind(discount)
        .bind(amount_money)
        .bind(max_uses)
        .execute(&self.pool)
        .await
        .context("Failed to create promo code")?;

        self.get_by_code(code)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Promo code {} missing after insert", code))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<PromoCode>> {
        sqlx::query_as::<_, PromoCode>(
            "SELECT id, code, discount, amount_money, max_uses, uses, is_used FROM promocodes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch promo code")
    }

    /// Consumes one use. Returns false when the code is unknown or exhausted;
    /// the exhausted flag flips on the use that reaches the cap.
    pub async fn redeem(&self, code: &str) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE promocodes
            SET uses = uses + 1,
                is_used = CASE WHEN uses + 1 >= max_uses THEN 1 ELSE 0 END
            WHERE code = ? AND is_used = 0
            "#,
        )
        .bind(code)
        .execute(&self.pool)
        .await
        .context("Failed to redeem promo code")?
        .rows_affected();

        Ok(affected > 0)
    }
}
