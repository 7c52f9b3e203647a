use rust_decimal::Decimal;
use starshop_db::models::order::{NewOrder, PaymentMethod};
use starshop_db::repositories::UserRepository;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::action::Action;
use crate::services::notification_service::{Notice, NoticeButton, NotificationService};
use crate::services::order_service::OrderService;
use crate::services::payment::{GatewayError, GatewayRegistry, Invoice, InvoiceStatus};
use crate::services::pricing::{InputError, Pricing, parse_handle};
use crate::services::session_service::{PendingInvoice, PurchaseState, SessionStore, Step};
use crate::utils::{escape_html, user_mention};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// The person talking to the bot.
#[derive(Debug, Clone)]
pub struct Customer {
    pub telegram_id: i64,
    /// Public handle without `@`, if the account has one.
    pub username: Option<String>,
    pub display_name: String,
}

/// What the transport should show after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowReply {
    AskRecipient,
    /// "For myself" needs a public handle; the session is dropped.
    NeedPublicHandle,
    AskFriendHandle,
    InvalidHandle(InputError),
    ConfirmRecipient {
        recipient: String,
    },
    AskStars {
        recipient: String,
        min: i64,
        max: i64,
    },
    InvalidStars(InputError),
    ChoosePayment {
        recipient: String,
        stars: i64,
        price: Decimal,
        currency: String,
        methods: Vec<PaymentMethod>,
    },
    AwaitingPayment {
        method: PaymentMethod,
        invoice: Invoice,
        price: Decimal,
        currency: String,
    },
    InvoicePending,
    /// Status poll failed; the user may retry.
    CheckFailed,
    InvoiceExpired,
    OrderPlaced {
        order_id: i64,
        stars: i64,
        price: Decimal,
        currency: String,
        recipient: String,
    },
    Cancelled,
    /// The action does not belong to the current step.
    Stale,
    /// Free text with no purchase in progress.
    Idle,
    /// Unrecoverable; the session was cleared.
    Failed,
}

/// The purchase form. Sessions live in memory, orders in the ledger.
#[derive(Clone)]
pub struct PurchaseFlow {
    sessions: SessionStore,
    pricing: Pricing,
    gateways: GatewayRegistry,
    users: UserRepository,
    orders: OrderService,
    notifications: NotificationService,
    reviewers: Vec<i64>,
}

impl PurchaseFlow {
    pub fn new(
        sessions: SessionStore,
        pricing: Pricing,
        gateways: GatewayRegistry,
        users: UserRepository,
        orders: OrderService,
        notifications: NotificationService,
        reviewers: Vec<i64>,
    ) -> Self {
        Self {
            sessions,
            pricing,
            gateways,
            users,
            orders,
            notifications,
            reviewers,
        }
    }

    pub async fn start(&self, customer: &Customer) -> FlowReply {
        self.sessions
            .set(customer.telegram_id, PurchaseState::WaitingForRecipient)
            .await;
        FlowReply::AskRecipient
    }

    pub async fn choose_self(&self, customer: &Customer) -> FlowReply {
        if self.sessions.step(customer.telegram_id).await != Some(Step::Recipient) {
            return FlowReply::Stale;
        }
        let Some(username) = customer.username.clone() else {
            self.sessions.clear(customer.telegram_id).await;
            return FlowReply::NeedPublicHandle;
        };
        self.ask_stars(customer.telegram_id, username).await
    }

    pub async fn choose_friend(&self, customer: &Customer) -> FlowReply {
        if self.sessions.step(customer.telegram_id).await != Some(Step::Recipient) {
            return FlowReply::Stale;
        }
        self.sessions
            .set(
                customer.telegram_id,
                PurchaseState::WaitingForUsername { candidate: None },
            )
            .await;
        FlowReply::AskFriendHandle
    }

    /// Routes free text by the current step.
    pub async fn handle_text(&self, customer: &Customer, text: &str) -> FlowReply {
        match self.sessions.step(customer.telegram_id).await {
            None => FlowReply::Idle,
            Some(Step::Username) => self.submit_handle(customer, text).await,
            Some(Step::Stars) => self.submit_stars(customer, text).await,
            Some(Step::Recipient) | Some(Step::Payment) => FlowReply::Stale,
        }
    }

    pub async fn submit_handle(&self, customer: &Customer, text: &str) -> FlowReply {
        if self.sessions.step(customer.telegram_id).await != Some(Step::Username) {
            return FlowReply::Stale;
        }
        match parse_handle(text) {
            Ok(handle) => {
                self.sessions
                    .set(
                        customer.telegram_id,
                        PurchaseState::WaitingForUsername {
                            candidate: Some(handle.clone()),
                        },
                    )
                    .await;
                FlowReply::ConfirmRecipient { recipient: handle }
            }
            Err(e) => FlowReply::InvalidHandle(e),
        }
    }

    pub async fn confirm_recipient(&self, customer: &Customer) -> FlowReply {
        match self.sessions.get(customer.telegram_id).await {
            Some(PurchaseState::WaitingForUsername {
                candidate: Some(recipient),
            }) => self.ask_stars(customer.telegram_id, recipient).await,
            _ => FlowReply::Stale,
        }
    }

    pub async fn cancel(&self, customer: &Customer) -> FlowReply {
        if self.sessions.clear(customer.telegram_id).await.is_some() {
            info!("User {} cancelled the purchase", customer.telegram_id);
        }
        FlowReply::Cancelled
    }

    pub async fn submit_stars(&self, customer: &Customer, text: &str) -> FlowReply {
        let Some(PurchaseState::WaitingForStars { recipient }) =
            self.sessions.get(customer.telegram_id).await
        else {
            return FlowReply::Stale;
        };

        let stars = match self.pricing.parse_stars(text) {
            Ok(stars) => stars,
            Err(e) => return FlowReply::InvalidStars(e),
        };
        let price = self.pricing.quote(stars);

        self.sessions
            .set(
                customer.telegram_id,
                PurchaseState::WaitingForPayment {
                    recipient: recipient.clone(),
                    stars,
                    price,
                    invoice: None,
                },
            )
            .await;

        FlowReply::ChoosePayment {
            recipient,
            stars,
            price,
            currency: self.pricing.currency().to_string(),
            methods: self.gateways.available(),
        }
    }

    pub async fn choose_method(&self, customer: &Customer, method: PaymentMethod) -> FlowReply {
        let Some(PurchaseState::WaitingForPayment {
            recipient,
            stars,
            price,
            invoice: None,
        }) = self.sessions.get(customer.telegram_id).await
        else {
            return FlowReply::Stale;
        };
        let Some(gateway) = self.gateways.get(method) else {
            return FlowReply::Stale;
        };

        let reference = format!("{}-{}", customer.telegram_id, Uuid::new_v4().simple());
        let invoice = match gateway
            .create_invoice(price, self.pricing.currency(), &reference)
            .await
        {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(
                    "Invoice creation via {} failed for user {}: {}",
                    method, customer.telegram_id, e
                );
                self.sessions.clear(customer.telegram_id).await;
                return FlowReply::Failed;
            }
        };

        self.sessions
            .set(
                customer.telegram_id,
                PurchaseState::WaitingForPayment {
                    recipient,
                    stars,
                    price,
                    invoice: Some(PendingInvoice {
                        method,
                        invoice: invoice.clone(),
                        reference,
                    }),
                },
            )
            .await;

        FlowReply::AwaitingPayment {
            method,
            invoice,
            price,
            currency: self.pricing.currency().to_string(),
        }
    }

    /// The user asserts they paid.
    pub async fn confirm_payment(&self, customer: &Customer) -> FlowReply {
        match self.sessions.get(customer.telegram_id).await {
            Some(PurchaseState::WaitingForPayment {
                recipient,
                stars,
                price,
                invoice: Some(pending),
            }) => self.finish(customer, recipient, stars, price, pending).await,
            _ => FlowReply::Stale,
        }
    }

    /// Manual poll of the provider. `Paid` behaves like `confirm_payment`.
    pub async fn check_invoice(&self, customer: &Customer) -> FlowReply {
        let Some(PurchaseState::WaitingForPayment {
            recipient,
            stars,
            price,
            invoice: Some(pending),
        }) = self.sessions.get(customer.telegram_id).await
        else {
            return FlowReply::Stale;
        };

        if pending.invoice.is_expired(chrono::Utc::now()) {
            self.sessions.clear(customer.telegram_id).await;
            return FlowReply::InvoiceExpired;
        }

        let Some(gateway) = self.gateways.get(pending.method) else {
            return FlowReply::Stale;
        };

        match gateway.check_status(&pending.invoice.external_id).await {
            Ok(InvoiceStatus::Paid) => self.finish(customer, recipient, stars, price, pending).await,
            Ok(InvoiceStatus::Expired) => {
                self.sessions.clear(customer.telegram_id).await;
                FlowReply::InvoiceExpired
            }
            Ok(InvoiceStatus::Pending) => FlowReply::InvoicePending,
            Err(e) => {
                warn!(
                    "Status check for invoice {} failed: {}",
                    pending.invoice.external_id, e
                );
                FlowReply::CheckFailed
            }
        }
    }

    async fn ask_stars(&self, telegram_id: i64, recipient: String) -> FlowReply {
        self.sessions
            .set(
                telegram_id,
                PurchaseState::WaitingForStars {
                    recipient: recipient.clone(),
                },
            )
            .await;
        let (min, max) = self.pricing.bounds();
        FlowReply::AskStars { recipient, min, max }
    }

    async fn finish(
        &self,
        customer: &Customer,
        recipient: String,
        stars: i64,
        price: Decimal,
        pending: PendingInvoice,
    ) -> FlowReply {
        let result = self
            .place_order(customer, &recipient, stars, price, &pending)
            .await;
        self.sessions.clear(customer.telegram_id).await;

        match result {
            Ok(order_id) => FlowReply::OrderPlaced {
                order_id,
                stars,
                price,
                currency: self.pricing.currency().to_string(),
                recipient,
            },
            Err(e) => {
                error!(
                    "Failed to place order for user {}: {:#}",
                    customer.telegram_id, e
                );
                FlowReply::Failed
            }
        }
    }

    async fn place_order(
        &self,
        customer: &Customer,
        recipient: &str,
        stars: i64,
        price: Decimal,
        pending: &PendingInvoice,
    ) -> Result<i64, FlowError> {
        let (user, _) = self.users.get_or_create(customer.telegram_id, None).await?;

        let order_id = self
            .orders
            .create_order(NewOrder {
                user_id: user.id,
                stars,
                amount: price,
                currency: self.pricing.currency().to_string(),
                payment_method: pending.method,
                recipient: recipient.to_string(),
                external_ref: Some(pending.invoice.external_id.clone()),
            })
            .await?;

        info!(
            "Order #{} placed by {} (invoice reference {})",
            order_id, customer.telegram_id, pending.reference
        );

        let notice = self.review_notice(order_id, customer, recipient, stars, price, pending);
        let reached = self.notifications.broadcast(&self.reviewers, &notice).await;
        if reached == 0 {
            warn!("Order #{} placed but no reviewer was notified", order_id);
        }

        Ok(order_id)
    }

    fn review_notice(
        &self,
        order_id: i64,
        customer: &Customer,
        recipient: &str,
        stars: i64,
        price: Decimal,
        pending: &PendingInvoice,
    ) -> Notice {
        let customer_handle = customer
            .username
            .as_deref()
            .map(|u| format!("@{}", escape_html(u)))
            .unwrap_or_else(|| "no username".to_string());

        let text = format!(
            "🛒 <b>New order #{}</b>\n\n\
             From: {}\n\
             ID: <code>{}</code>\n\
             Customer: {}\n\
             Recipient: @{}\n\
             Stars: <b>{}</b>\n\
             Amount: <b>{} {}</b>\n\
             Payment: {}\n\
             Reference: <code>{}</code>",
            order_id,
            user_mention(customer.telegram_id, &customer.display_name),
            customer.telegram_id,
            customer_handle,
            escape_html(recipient),
            stars,
            price,
            escape_html(self.pricing.currency()),
            pending.method,
            escape_html(&pending.invoice.external_id),
        );

        // The mention in the text links the customer; a tg:// URL button
        // fails for accounts with restricted privacy.
        Notice::text(text).with_row(vec![
            NoticeButton::Action("✅ Approve".to_string(), Action::Approve { order_id }),
            NoticeButton::Action("❌ Reject".to_string(), Action::Reject { order_id }),
        ])
    }
}
