use anyhow::Result;
use starshop_db::models::order::{NewOrder, Order, OrderStatus};
use starshop_db::repositories::OrderRepository;
use tracing::{info, warn};

/// The ledger: the only component that creates orders or moves their status.
#[derive(Clone)]
pub struct OrderService {
    repo: OrderRepository,
}

impl OrderService {
    pub fn new(repo: OrderRepository) -> Self {
        Self { repo }
    }

    pub async fn create_order(&self, order: NewOrder) -> Result<i64> {
        let id = self.repo.create(&order).await?;
        info!(
            "Order #{} created: user {} buys {} stars for @{} ({} {}, {})",
            id,
            order.user_id,
            order.stars,
            order.recipient,
            order.amount,
            order.currency,
            order.payment_method
        );
        Ok(id)
    }

    pub async fn get_order(&self, id: i64) -> Result<Option<Order>> {
        self.repo.get(id).await
    }

    /// Pending-only guard. `false` means somebody already resolved the order.
    pub async fn set_status(&self, id: i64, status: OrderStatus) -> Result<bool> {
        let changed = self.repo.set_status(id, status).await?;
        if changed {
            info!("Order #{} -> {}", id, status);
        } else {
            warn!("Order #{} not moved to {}: no longer pending", id, status);
        }
        Ok(changed)
    }

    /// Approval: claim and credit together. `false` means already resolved.
    pub async fn complete_and_credit(&self, id: i64, user_id: i64, stars: i64) -> Result<bool> {
        let changed = self.repo.complete_and_credit(id, user_id, stars).await?;
        if changed {
            info!("Order #{} -> completed, {} stars credited to user {}", id, stars, user_id);
        } else {
            warn!("Order #{} not completed: no longer pending", id);
        }
        Ok(changed)
    }

    pub async fn mark_fulfillment_failed(&self, id: i64, user_id: i64, stars: i64) -> Result<bool> {
        let changed = self.repo.mark_fulfillment_failed(id, user_id, stars).await?;
        if changed {
            warn!("Order #{} -> error (delivery failed), credit reversed", id);
        }
        Ok(changed)
    }

    pub async fn get_orders_for_user(&self, user_id: i64, limit: i64) -> Result<Vec<Order>> {
        self.repo.list_for_user(user_id, limit).await
    }

    pub async fn count_for_user(&self, user_id: i64) -> Result<i64> {
        self.repo.count_for_user(user_id).await
    }

    pub async fn pending_orders(&self, limit: i64) -> Result<Vec<Order>> {
        self.repo.list_pending(limit).await
    }
}
