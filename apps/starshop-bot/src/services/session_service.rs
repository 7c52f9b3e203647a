use rust_decimal::Decimal;
use starshop_db::models::order::PaymentMethod;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::payment::Invoice;

/// Where a user is in the purchase form.
#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseState {
    WaitingForRecipient,
    /// `candidate` is a validated handle awaiting explicit confirmation.
    WaitingForUsername { candidate: Option<String> },
    WaitingForStars { recipient: String },
    WaitingForPayment {
        recipient: String,
        stars: i64,
        price: Decimal,
        invoice: Option<PendingInvoice>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingInvoice {
    pub method: PaymentMethod,
    pub invoice: Invoice,
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Recipient,
    Username,
    Stars,
    Payment,
}

impl PurchaseState {
    pub fn step(&self) -> Step {
        match self {
            PurchaseState::WaitingForRecipient => Step::Recipient,
            PurchaseState::WaitingForUsername { .. } => Step::Username,
            PurchaseState::WaitingForStars { .. } => Step::Stars,
            PurchaseState::WaitingForPayment { .. } => Step::Payment,
        }
    }
}

/// In-memory, per-user. Lost on restart.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<i64, PurchaseState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, telegram_id: i64) -> Option<PurchaseState> {
        self.sessions.read().await.get(&telegram_id).cloned()
    }

    pub async fn set(&self, telegram_id: i64, state: PurchaseState) {
        self.sessions.write().await.insert(telegram_id, state);
    }

    pub async fn clear(&self, telegram_id: i64) -> Option<PurchaseState> {
        self.sessions.write().await.remove(&telegram_id)
    }

    pub async fn step(&self, telegram_id: i64) -> Option<Step> {
        self.sessions.read().await.get(&telegram_id).map(PurchaseState::step)
    }
}
