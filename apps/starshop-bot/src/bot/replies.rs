use starshop_db::models::order::PaymentMethod;
use teloxide::types::InlineKeyboardMarkup;

use crate::bot::keyboards::{
    cancel_keyboard, confirm_recipient_keyboard, invoice_keyboard, payment_methods_keyboard,
    recipient_keyboard,
};
use crate::services::purchase_service::FlowReply;
use crate::utils::escape_html;

pub const STALE_ALERT: &str = "This button is no longer active.";

/// Button presses that leave the conversation on the same step. These are
/// answered with a callback alert and the pressed keyboard stays usable.
pub fn callback_alert(reply: &FlowReply) -> Option<&'static str> {
    match reply {
        FlowReply::Stale => Some(STALE_ALERT),
        FlowReply::InvoicePending => Some("⏳ Payment has not arrived yet"),
        FlowReply::CheckFailed => Some("⚠️ Could not check the payment right now. Try again shortly."),
        _ => None,
    }
}

pub struct Reply {
    pub text: String,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with(text: impl Into<String>, keyboard: InlineKeyboardMarkup) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// HTML message for a conversation step. `Stale` and `Idle` are left to the
/// caller, which knows whether it is answering a button or free text.
pub fn render(reply: &FlowReply) -> Option<Reply> {
    let reply = match reply {
        FlowReply::AskRecipient => Reply::with(
            "⭐ <b>Who are the stars for?</b>",
            recipient_keyboard(),
        ),
        FlowReply::NeedPublicHandle => Reply::plain(
            "❌ You need a public Telegram username to buy stars for yourself.\n\
             Set one in Telegram settings or buy for a friend.",
        ),
        FlowReply::AskFriendHandle => Reply::with(
            "✍️ Send the recipient's username starting with @ (for example <code>@durov</code>).",
            cancel_keyboard(),
        ),
        FlowReply::InvalidHandle(e) => Reply::with(
            format!(
                "❌ Invalid username: {}.\nSend it as @username using letters, digits and underscores.",
                e
            ),
            cancel_keyboard(),
        ),
        FlowReply::ConfirmRecipient { recipient } => Reply::with(
            format!("Send stars to <b>@{}</b>?", escape_html(recipient)),
            confirm_recipient_keyboard(),
        ),
        FlowReply::AskStars { recipient, min, max } => Reply::with(
            format!(
                "🎯 Recipient: <b>@{}</b>\n\nHow many stars? Send a number from {} to {}.",
                escape_html(recipient),
                min,
                max
            ),
            cancel_keyboard(),
        ),
        FlowReply::InvalidStars(e) => Reply::with(
            format!("❌ Invalid quantity: {}. Try again.", e),
            cancel_keyboard(),
        ),
        FlowReply::ChoosePayment {
            recipient,
            stars,
            price,
            currency,
            methods,
        } => Reply::with(
            format!(
                "⭐ Stars: <b>{}</b>\n🎯 Recipient: <b>@{}</b>\n💰 Price: <b>{} {}</b>\n\n\
                 Choose a payment method:",
                stars,
                escape_html(recipient),
                price,
                escape_html(currency)
            ),
            payment_methods_keyboard(methods),
        ),
        FlowReply::AwaitingPayment {
            method,
            invoice,
            price,
            currency,
        } => {
            let amount = format!("<b>{} {}</b>", price, escape_html(currency));
            let text = match method {
                PaymentMethod::Manual => format!(
                    "🏦 Transfer {} using these details:\n\n{}\n\n\
                     Press «I have paid» once the transfer is done.",
                    amount,
                    escape_html(invoice.instructions.as_deref().unwrap_or_default())
                ),
                PaymentMethod::Instant => format!(
                    "📱 Pay {} using the button below, then press «I have paid».",
                    amount
                ),
                PaymentMethod::Crypto => {
                    let expiry = invoice
                        .expires_at
                        .map(|at| format!("\nThe invoice expires at {} UTC.", at.format("%Y-%m-%d %H:%M")))
                        .unwrap_or_default();
                    format!(
                        "🪙 Pay {} using the button below, then press «Check payment».{}",
                        amount, expiry
                    )
                }
            };
            Reply::with(text, invoice_keyboard(*method, invoice.pay_url.as_deref()))
        }
        FlowReply::InvoicePending => {
            Reply::plain("⏳ Payment has not arrived yet. Check again in a minute.")
        }
        FlowReply::CheckFailed => Reply::plain(
            "⚠️ Could not check the payment status right now. Please try again later.",
        ),
        FlowReply::InvoiceExpired => {
            Reply::plain("⌛ The invoice has expired. Start a new purchase from the menu.")
        }
        FlowReply::OrderPlaced {
            order_id,
            stars,
            price,
            currency,
            recipient,
        } => Reply::plain(format!(
            "✅ <b>Order #{} created!</b>\n\n\
             {} stars for @{}, {} {}.\n\
             An administrator will verify your payment shortly.",
            order_id,
            stars,
            escape_html(recipient),
            price,
            escape_html(currency)
        )),
        FlowReply::Cancelled => Reply::plain("❌ Purchase cancelled."),
        FlowReply::Failed => Reply::plain("⚠️ Something went wrong. Please try again later."),
        FlowReply::Stale | FlowReply::Idle => return None,
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pricing::InputError;
    use rust_decimal::Decimal;

    #[test]
    fn price_is_shown_with_two_decimals() {
        let reply = render(&FlowReply::ChoosePayment {
            recipient: "alice".to_string(),
            stars: 100,
            price: Decimal::new(14500, 2),
            currency: "RUB".to_string(),
            methods: vec![PaymentMethod::Manual],
        })
        .unwrap();
        assert!(reply.text.contains("145.00 RUB"));
        assert!(reply.keyboard.is_some());
    }

    #[test]
    fn validation_errors_keep_cancel_button() {
        let reply = render(&FlowReply::InvalidStars(InputError::OutOfRange { min: 50, max: 100 })).unwrap();
        assert!(reply.text.contains("between 50 and 100"));
        assert!(reply.keyboard.is_some());
    }

    #[test]
    fn recipient_is_escaped() {
        let reply = render(&FlowReply::ConfirmRecipient {
            recipient: "a<b".to_string(),
        })
        .unwrap();
        assert!(reply.text.contains("@a&lt;b"));
    }

    #[test]
    fn retryable_checks_keep_the_invoice_keyboard() {
        assert!(callback_alert(&FlowReply::CheckFailed).is_some());
        assert!(callback_alert(&FlowReply::InvoicePending).is_some());
        assert_eq!(callback_alert(&FlowReply::Stale), Some(STALE_ALERT));
        assert!(callback_alert(&FlowReply::InvoiceExpired).is_none());
        assert!(callback_alert(&FlowReply::Cancelled).is_none());
    }

    #[test]
    fn stale_and_idle_are_left_to_caller() {
        assert!(render(&FlowReply::Stale).is_none());
        assert!(render(&FlowReply::Idle).is_none());
    }
}
