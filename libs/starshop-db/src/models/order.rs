use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle of an order. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Rejected,
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "rejected" => Ok(OrderStatus::Rejected),
            "error" => Ok(OrderStatus::Error),
            other => Err(UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Bank transfer to static requisites, verified by a reviewer.
    Manual,
    /// QR / instant-payment provider.
    Instant,
    /// Crypto invoice gateway.
    Crypto,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Manual,
        PaymentMethod::Instant,
        PaymentMethod::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Manual => "manual",
            PaymentMethod::Instant => "instant",
            PaymentMethod::Crypto => "crypto",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(PaymentMethod::Manual),
            "instant" => Ok(PaymentMethod::Instant),
            "crypto" => Ok(PaymentMethod::Crypto),
            other => Err(UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub stars: i64,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    /// Handle (without the leading `@`) that receives the stars.
    pub recipient: String,
    pub external_ref: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Everything the ledger needs to open a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub stars: i64,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub recipient: String,
    pub external_ref: Option<String>,
}

/// Amount in minor units (kopecks, cents), rounded half away from zero.
pub fn to_minor_units(amount: Decimal) -> i64 {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.mantissa() as i64
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
