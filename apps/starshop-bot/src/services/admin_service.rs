use anyhow::Result;
use starshop_db::models::order::{Order, OrderStatus};
use starshop_db::repositories::UserRepository;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::services::fulfillment_service::Fulfillment;
use crate::services::notification_service::{Notice, NotificationService};
use crate::services::order_service::OrderService;
use crate::utils::escape_html;

/// Two overlapping operator sets.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    admins: Vec<i64>,
    reviewers: Vec<i64>,
}

impl AccessControl {
    /// An empty reviewer list falls back to the admins.
    pub fn new(admins: Vec<i64>, reviewers: Vec<i64>) -> Self {
        let reviewers = if reviewers.is_empty() {
            admins.clone()
        } else {
            reviewers
        };
        Self { admins, reviewers }
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admins.contains(&tg_id)
    }

    pub fn can_review(&self, tg_id: i64) -> bool {
        self.reviewers.contains(&tg_id)
    }

    pub fn reviewers(&self) -> &[i64] {
        &self.reviewers
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Approved { order: Order, customer_tg_id: i64 },
    Rejected { order: Order, customer_tg_id: i64 },
    /// Claimed, but the delivery call failed. Status is `error`, nothing credited.
    FulfillmentFailed { order: Order, customer_tg_id: i64 },
    Unauthorized,
    NotFound,
    AlreadyHandled,
    InvalidOrder,
}

impl ReviewOutcome {
    /// Line appended to the reviewer's copy of the order message.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            ReviewOutcome::Approved { .. } => Some("✅ Payment confirmed and processed"),
            ReviewOutcome::Rejected { .. } => Some("❌ Payment rejected"),
            ReviewOutcome::FulfillmentFailed { .. } => {
                Some("⚠️ Approved, but delivery failed. Order marked as error")
            }
            _ => None,
        }
    }

    /// Short callback alert for outcomes only the reviewer sees.
    pub fn alert(&self) -> &'static str {
        match self {
            ReviewOutcome::Approved { .. } => "Approved",
            ReviewOutcome::Rejected { .. } => "Rejected",
            ReviewOutcome::FulfillmentFailed { .. } => "Delivery failed",
            ReviewOutcome::Unauthorized => "⛔ You are not allowed to review payments",
            ReviewOutcome::NotFound => "Order not found",
            ReviewOutcome::AlreadyHandled => "This order has already been handled",
            ReviewOutcome::InvalidOrder => "Order is invalid and cannot be approved",
        }
    }
}

#[derive(Clone)]
pub struct AdminService {
    access: AccessControl,
    orders: OrderService,
    users: UserRepository,
    fulfillment: Option<Arc<dyn Fulfillment>>,
    notifications: NotificationService,
    support_contact: String,
}

impl AdminService {
    pub fn new(
        access: AccessControl,
        orders: OrderService,
        users: UserRepository,
        fulfillment: Option<Arc<dyn Fulfillment>>,
        notifications: NotificationService,
        support_contact: String,
    ) -> Self {
        Self {
            access,
            orders,
            users,
            fulfillment,
            notifications,
            support_contact,
        }
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub async fn approve(&self, reviewer: i64, order_id: i64) -> Result<ReviewOutcome> {
        if !self.access.can_review(reviewer) {
            warn!("User {} tried to approve order #{} without permission", reviewer, order_id);
            return Ok(ReviewOutcome::Unauthorized);
        }
        let Some(order) = self.orders.get_order(order_id).await? else {
            return Ok(ReviewOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(ReviewOutcome::AlreadyHandled);
        }
        if order.stars <= 0 {
            return Ok(ReviewOutcome::InvalidOrder);
        }
        let Some(customer) = self.users.get_by_id(order.user_id).await? else {
            error!("Order #{} references missing user {}", order.id, order.user_id);
            return Ok(ReviewOutcome::InvalidOrder);
        };

        // Claim and credit together: a concurrent reviewer loses here, and a
        // failed credit leaves the order pending.
        if !self
            .orders
            .complete_and_credit(order.id, customer.id, order.stars)
            .await?
        {
            return Ok(ReviewOutcome::AlreadyHandled);
        }

        if let Some(fulfillment) = &self.fulfillment {
            if let Err(e) = fulfillment.deliver(&order.recipient, order.stars).await {
                error!("Delivery for order #{} failed: {}", order.id, e);
                self.orders
                    .mark_fulfillment_failed(order.id, customer.id, order.stars)
                    .await?;
                self.notifications
                    .notify(
                        customer.telegram_id,
                        &Notice::text(format!(
                            "⚠️ Your payment for order #{} was confirmed, but sending the stars failed.\n\
                             Please contact support: {}",
                            order.id,
                            escape_html(&self.support_contact)
                        )),
                    )
                    .await;
                return Ok(ReviewOutcome::FulfillmentFailed {
                    order: Order {
                        status: OrderStatus::Error,
                        ..order
                    },
                    customer_tg_id: customer.telegram_id,
                });
            }
        }

        info!(
            "Order #{} approved by {}: {} stars credited to user {}",
            order.id, reviewer, order.stars, customer.telegram_id
        );

        self.notifications
            .notify(
                customer.telegram_id,
                &Notice::text(format!(
                    "✅ <b>Payment confirmed!</b>\n\n\
                     Order #{}: {} stars for @{} have been processed.\n\
                     Thank you for your purchase!",
                    order.id,
                    order.stars,
                    escape_html(&order.recipient)
                )),
            )
            .await;

        Ok(ReviewOutcome::Approved {
            order: Order {
                status: OrderStatus::Completed,
                ..order
            },
            customer_tg_id: customer.telegram_id,
        })
    }

    pub async fn reject(&self, reviewer: i64, order_id: i64) -> Result<ReviewOutcome> {
        if !self.access.can_review(reviewer) {
            warn!("User {} tried to reject order #{} without permission", reviewer, order_id);
            return Ok(ReviewOutcome::Unauthorized);
        }
        let Some(order) = self.orders.get_order(order_id).await? else {
            return Ok(ReviewOutcome::NotFound);
        };
        if order.status != OrderStatus::Pending {
            return Ok(ReviewOutcome::AlreadyHandled);
        }
        let Some(customer) = self.users.get_by_id(order.user_id).await? else {
            error!("Order #{} references missing user {}", order.id, order.user_id);
            return Ok(ReviewOutcome::InvalidOrder);
        };

        if !self.orders.set_status(order.id, OrderStatus::Rejected).await? {
            return Ok(ReviewOutcome::AlreadyHandled);
        }
        info!("Order #{} rejected by {}", order.id, reviewer);

        self.notifications
            .notify(
                customer.telegram_id,
                &Notice::text(format!(
                    "❌ <b>Payment for order #{} was rejected.</b>\n\n\
                     Possible reasons:\n\
                     • wrong amount\n\
                     • payment not received\n\
                     • incorrect details\n\n\
                     If you believe this is a mistake, contact support: {}",
                    order.id,
                    escape_html(&self.support_contact)
                )),
            )
            .await;

        Ok(ReviewOutcome::Rejected {
            order: Order {
                status: OrderStatus::Rejected,
                ..order
            },
            customer_tg_id: customer.telegram_id,
        })
    }

    /// `None` when the requester is not an admin.
    pub async fn pending_orders(&self, requester: i64, limit: i64) -> Result<Option<Vec<Order>>> {
        if !self.access.is_admin(requester) {
            return Ok(None);
        }
        Ok(Some(self.orders.pending_orders(limit).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fulfillment_service::FulfillmentError;
    use crate::services::notification_service::testing::RecordingNotifier;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use starshop_db::models::order::{NewOrder, PaymentMethod};
    use starshop_db::repositories::OrderRepository;
    use starshop_db::sqlx::{self, SqlitePool};
    use tokio::sync::Mutex;

    const ADMIN: i64 = 1;
    const REVIEWER: i64 = 2;
    const CUSTOMER: i64 = 100;

    #[derive(Default)]
    struct RecordingFulfillment {
        fail: bool,
        calls: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl Fulfillment for RecordingFulfillment {
        async fn deliver(&self, recipient: &str, stars: i64) -> Result<(), FulfillmentError> {
            self.calls.lock().await.push((recipient.to_string(), stars));
            if self.fail {
                return Err(FulfillmentError::Rejected {
                    status: 500,
                    body: "out of stars".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        admin: AdminService,
        orders: OrderService,
        users: UserRepository,
        notifier: Arc<RecordingNotifier>,
        pool: SqlitePool,
    }

    async fn harness(fulfillment: Option<Arc<dyn Fulfillment>>) -> Harness {
        let pool = starshop_db::init_memory_db().await.unwrap();
        let orders = OrderService::new(OrderRepository::new(pool.clone()));
        let users = UserRepository::new(pool.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let admin = AdminService::new(
            AccessControl::new(vec![ADMIN], vec![REVIEWER]),
            orders.clone(),
            users.clone(),
            fulfillment,
            NotificationService::new(notifier.clone()),
            "@help".to_string(),
        );
        Harness {
            admin,
            orders,
            users,
            notifier,
            pool,
        }
    }

    async fn place(h: &Harness, stars: i64) -> i64 {
        let (user, _) = h.users.get_or_create(CUSTOMER, None).await.unwrap();
        h.orders
            .create_order(NewOrder {
                user_id: user.id,
                stars,
                amount: Decimal::new(stars * 145, 2),
                currency: "RUB".to_string(),
                payment_method: PaymentMethod::Manual,
                recipient: "friend".to_string(),
                external_ref: None,
            })
            .await
            .unwrap()
    }

    async fn balance(h: &Harness) -> i64 {
        h.users
            .get_by_telegram_id(CUSTOMER)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    #[test]
    fn reviewers_fall_back_to_admins() {
        let access = AccessControl::new(vec![1, 2], vec![]);
        assert!(access.can_review(2));
        let access = AccessControl::new(vec![1], vec![3]);
        assert!(access.is_admin(1));
        assert!(!access.can_review(1));
        assert!(access.can_review(3));
    }

    #[tokio::test]
    async fn approve_credits_once_and_notifies() {
        let h = harness(None).await;
        let order_id = place(&h, 75).await;

        let outcome = h.admin.approve(REVIEWER, order_id).await.unwrap();
        assert!(matches!(
            outcome,
            ReviewOutcome::Approved { ref order, customer_tg_id: CUSTOMER }
                if order.status == OrderStatus::Completed
        ));
        assert_eq!(balance(&h).await, 75);
        assert_eq!(h.notifier.sent_to(CUSTOMER).await.len(), 1);

        let again = h.admin.approve(REVIEWER, order_id).await.unwrap();
        assert_eq!(again, ReviewOutcome::AlreadyHandled);
        assert_eq!(balance(&h).await, 75);
        assert_eq!(h.notifier.sent_to(CUSTOMER).await.len(), 1);

        let stored = h.orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn balance_accumulates_across_orders() {
        let h = harness(None).await;
        for stars in [50, 120, 999] {
            let before = balance_or_zero(&h).await;
            let id = place(&h, stars).await;
            h.admin.approve(REVIEWER, id).await.unwrap();
            assert_eq!(balance(&h).await, before + stars);
        }
    }

    async fn balance_or_zero(h: &Harness) -> i64 {
        h.users
            .get_by_telegram_id(CUSTOMER)
            .await
            .unwrap()
            .map(|u| u.balance)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn first_decision_wins() {
        let h = harness(None).await;

        let id = place(&h, 60).await;
        assert!(matches!(h.admin.approve(REVIEWER, id).await.unwrap(), ReviewOutcome::Approved { .. }));
        assert_eq!(h.admin.reject(REVIEWER, id).await.unwrap(), ReviewOutcome::AlreadyHandled);

        let id = place(&h, 60).await;
        assert!(matches!(h.admin.reject(REVIEWER, id).await.unwrap(), ReviewOutcome::Rejected { .. }));
        assert_eq!(h.admin.approve(REVIEWER, id).await.unwrap(), ReviewOutcome::AlreadyHandled);
        assert_eq!(h.admin.reject(REVIEWER, id).await.unwrap(), ReviewOutcome::AlreadyHandled);

        assert_eq!(balance(&h).await, 60);
    }

    #[tokio::test]
    async fn reject_notifies_without_credit() {
        let h = harness(None).await;
        let id = place(&h, 80).await;

        h.admin.reject(REVIEWER, id).await.unwrap();

        assert_eq!(balance(&h).await, 0);
        let notices = h.notifier.sent_to(CUSTOMER).await;
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text.contains("@help"));
    }

    #[tokio::test]
    async fn unauthorized_and_missing_orders_change_nothing() {
        let h = harness(None).await;
        let id = place(&h, 75).await;

        // Admins without review rights cannot approve when a reviewer list is set.
        assert_eq!(h.admin.approve(ADMIN, id).await.unwrap(), ReviewOutcome::Unauthorized);
        assert_eq!(h.admin.reject(CUSTOMER, id).await.unwrap(), ReviewOutcome::Unauthorized);
        assert_eq!(h.admin.approve(REVIEWER, id + 100).await.unwrap(), ReviewOutcome::NotFound);

        let stored = h.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(balance(&h).await, 0);
        assert!(h.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn delivery_goes_to_recipient() {
        let fulfillment = Arc::new(RecordingFulfillment::default());
        let h = harness(Some(fulfillment.clone() as Arc<dyn Fulfillment>)).await;
        let id = place(&h, 75).await;

        assert!(matches!(h.admin.approve(REVIEWER, id).await.unwrap(), ReviewOutcome::Approved { .. }));
        assert_eq!(*fulfillment.calls.lock().await, vec![("friend".to_string(), 75)]);
        assert_eq!(balance(&h).await, 75);
    }

    #[tokio::test]
    async fn failed_delivery_marks_error_without_credit() {
        let fulfillment = Arc::new(RecordingFulfillment {
            fail: true,
            ..Default::default()
        });
        let h = harness(Some(fulfillment.clone() as Arc<dyn Fulfillment>)).await;
        let id = place(&h, 75).await;

        let outcome = h.admin.approve(REVIEWER, id).await.unwrap();
        assert!(matches!(outcome, ReviewOutcome::FulfillmentFailed { .. }));
        assert!(outcome.marker().is_some());

        let stored = h.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Error);
        assert_eq!(balance(&h).await, 0);

        assert_eq!(h.admin.approve(REVIEWER, id).await.unwrap(), ReviewOutcome::AlreadyHandled);
        assert_eq!(fulfillment.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_credit_leaves_order_pending() {
        let h = harness(None).await;
        let id = place(&h, 75).await;

        sqlx::query(
            "CREATE TRIGGER lock_balance BEFORE UPDATE OF balance ON users \
             BEGIN SELECT RAISE(ABORT, 'balance locked'); END",
        )
        .execute(&h.pool)
        .await
        .unwrap();

        assert!(h.admin.approve(REVIEWER, id).await.is_err());
        let stored = h.orders.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(balance(&h).await, 0);
        assert!(h.notifier.sent_to(CUSTOMER).await.is_empty());

        sqlx::query("DROP TRIGGER lock_balance")
            .execute(&h.pool)
            .await
            .unwrap();

        assert!(matches!(h.admin.approve(REVIEWER, id).await.unwrap(), ReviewOutcome::Approved { .. }));
        assert_eq!(balance(&h).await, 75);
    }

    #[tokio::test]
    async fn pending_list_is_admin_only() {
        let h = harness(None).await;
        place(&h, 75).await;
        place(&h, 90).await;

        assert!(h.admin.pending_orders(REVIEWER, 10).await.unwrap().is_none());
        let pending = h.admin.pending_orders(ADMIN, 10).await.unwrap().unwrap();
        assert_eq!(pending.len(), 2);
    }
}
