use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::order::{NewOrder, Order, OrderStatus, PaymentMethod, from_minor_units, to_minor_units};

const ORDER_COLUMNS: &str = "id, user_id, stars, amount_minor, currency, payment_method, recipient, external_ref, status, created_at";

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &SqliteRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let method: String = row.try_get("payment_method")?;

        Ok(Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            stars: row.try_get("stars")?,
            amount: from_minor_units(row.try_get::<i64, _>("amount_minor")?),
            currency: row.try_get("currency")?,
            payment_method: method.parse::<PaymentMethod>()?,
            recipient: row.try_get("recipient")?,
            external_ref: row.try_get("external_ref")?,
            status: status.parse::<OrderStatus>()?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    pub async fn create(&self, order: &NewOrder) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO orders (user_id, stars, amount_minor, currency, payment_method, recipient, external_ref, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(order.user_id)
        .bind(order.stars)
        .bind(to_minor_units(order.amount))
        .bind(&order.currency)
        .bind(order.payment_method.as_str())
        .bind(&order.recipient)
        .bind(&order.external_ref)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to create order")?
        .last_insert_rowid();

        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    /// Moves a pending order to `status` in one statement. Returns false when
    /// the order is missing or already left `pending`.
    pub async fn set_status(&self, id: i64, status: OrderStatus) -> Result<bool> {
        self.transition(id, OrderStatus::Pending, status).await
    }

    /// Claims a pending order and credits `stars` to its buyer in one
    /// transaction. `false` when the order already left `pending`. A failed
    /// credit rolls the claim back, so the order stays pending.
    pub async fn complete_and_credit(&self, id: i64, user_id: i64, stars: i64) -> Result<bool> {
        if stars <= 0 {
            return Err(anyhow!("Refusing to credit non-positive amount {}", stars));
        }

        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        let claimed = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(OrderStatus::Completed.as_str())
            .bind(id)
            .bind(OrderStatus::Pending.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to update order status")?
            .rows_affected();
        if claimed == 0 {
            return Ok(false);
        }

        let credited = sqlx::query("UPDATE users SET balance = balance + ? WHERE id = ?")
            .bind(stars)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to credit user balance")?
            .rows_affected();
        if credited == 0 {
            return Err(anyhow!("User {} not found, order #{} not credited", user_id, id));
        }

        tx.commit().await.context("Failed to commit approval")?;
        Ok(true)
    }

    /// `completed -> error` for approvals whose delivery failed, taking back
    /// the stars credited by `complete_and_credit`.
    pub async fn mark_fulfillment_failed(&self, id: i64, user_id: i64, stars: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        let moved = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(OrderStatus::Error.as_str())
            .bind(id)
            .bind(OrderStatus::Completed.as_str())
            .execute(&mut *tx)
            .await
            .context("Failed to update order status")?
            .rows_affected();
        if moved == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE users SET balance = balance - ? WHERE id = ?")
            .bind(stars)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to reverse user balance")?;

        tx.commit().await.context("Failed to commit fulfillment failure")?;
        Ok(true)
    }

    async fn transition(&self, id: i64, from: OrderStatus, to: OrderStatus) -> Result<bool> {
        if from == to {
            return Ok(false);
        }

        let affected = sqlx::query("UPDATE orders SET status = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to update order status")?
            .rows_affected();

        Ok(affected > 0)
    }

    /// Most recent first.
    pub async fn list_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch user orders")?;

        rows.iter().map(Self::row_to_order).collect()
    }

    /// Oldest first, so reviewers work the queue in arrival order.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch pending orders")?;

        rows.iter().map(Self::row_to_order).collect()
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count orders")
    }
}
