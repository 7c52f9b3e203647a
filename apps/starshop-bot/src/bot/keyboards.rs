use reqwest::Url;
use starshop_db::models::order::PaymentMethod;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::models::action::Action;
use crate::services::notification_service::{Notice, NoticeButton};

pub const BTN_BUY: &str = "⭐ Buy Stars";
pub const BTN_PROFILE: &str = "👤 My Profile";
pub const BTN_ORDERS: &str = "🧾 My Orders";
pub const BTN_REFERRAL: &str = "🎁 Referral";
pub const BTN_SUPPORT: &str = "❓ Support";
pub const BTN_FAQ: &str = "📖 FAQ";
pub const BTN_PENDING: &str = "🛠 Pending Orders";

pub fn main_menu(is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new(BTN_BUY)],
        vec![KeyboardButton::new(BTN_PROFILE), KeyboardButton::new(BTN_ORDERS)],
        vec![KeyboardButton::new(BTN_REFERRAL), KeyboardButton::new(BTN_SUPPORT)],
        vec![KeyboardButton::new(BTN_FAQ)],
    ];
    if is_admin {
        rows.push(vec![KeyboardButton::new(BTN_PENDING)]);
    }
    KeyboardMarkup::new(rows).resize_keyboard()
}

pub fn button(label: &str, action: Action) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.to_string(), action.encode())
}

pub fn recipient_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("🙋 For myself", Action::BuyForSelf),
            button("🎁 For a friend", Action::BuyForFriend),
        ],
        vec![button("❌ Cancel", Action::Cancel)],
    ])
}

pub fn confirm_recipient_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Confirm", Action::ConfirmRecipient),
        button("❌ Cancel", Action::Cancel),
    ]])
}

pub fn cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("❌ Cancel", Action::Cancel)]])
}

pub fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Manual => "🏦 Bank transfer",
        PaymentMethod::Instant => "📱 QR / instant payment",
        PaymentMethod::Crypto => "🪙 Crypto",
    }
}

pub fn payment_methods_keyboard(methods: &[PaymentMethod]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = methods
        .iter()
        .map(|&method| vec![button(method_label(method), Action::PayWith { method })])
        .collect();
    rows.push(vec![button("❌ Cancel", Action::Cancel)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn invoice_keyboard(method: PaymentMethod, pay_url: Option<&str>) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if let Some(url) = pay_url.and_then(|u| Url::parse(u).ok()) {
        rows.push(vec![InlineKeyboardButton::url("💳 Pay", url)]);
    }
    match method {
        PaymentMethod::Crypto => rows.push(vec![button("🔄 Check payment", Action::CheckInvoice)]),
        PaymentMethod::Manual | PaymentMethod::Instant => {
            rows.push(vec![button("✅ I have paid", Action::ConfirmPayment)])
        }
    }
    rows.push(vec![button("❌ Cancel", Action::Cancel)]);
    InlineKeyboardMarkup::new(rows)
}

pub fn profile_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("🧾 My Orders", Action::Orders),
            button("🎁 Referral", Action::Referral),
        ],
        vec![button("🗑 Delete account", Action::DeleteAccount)],
        vec![button("🏠 Main menu", Action::Home)],
    ])
}

pub fn home_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("⭐ Buy Stars", Action::Buy),
        button("👤 Profile", Action::Profile),
    ]])
}

pub fn admin_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("🛠 Pending orders", Action::AdminPending)]])
}

pub fn notice_keyboard(notice: &Notice) -> Option<InlineKeyboardMarkup> {
    if notice.buttons.is_empty() {
        return None;
    }
    let rows = notice
        .buttons
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| match b {
                    NoticeButton::Action(label, action) => button(label, *action),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Some(InlineKeyboardMarkup::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callbacks(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn payment_keyboard_lists_offered_methods() {
        let markup = payment_methods_keyboard(&[PaymentMethod::Manual, PaymentMethod::Crypto]);
        assert_eq!(callbacks(&markup), vec!["pay:manual", "pay:crypto", "cancel"]);
    }

    #[test]
    fn crypto_invoice_offers_status_check() {
        let markup = invoice_keyboard(PaymentMethod::Crypto, Some("https://pay.example/i/1"));
        assert_eq!(callbacks(&markup), vec!["check", "cancel"]);
        assert_eq!(markup.inline_keyboard.len(), 3);

        let manual = invoice_keyboard(PaymentMethod::Manual, None);
        assert_eq!(callbacks(&manual), vec!["paid", "cancel"]);
    }

    #[test]
    fn review_notice_maps_action_buttons() {
        let notice = Notice::text("order").with_row(vec![
            NoticeButton::Action("✅ Approve".to_string(), Action::Approve { order_id: 7 }),
            NoticeButton::Action("❌ Reject".to_string(), Action::Reject { order_id: 7 }),
        ]);
        let markup = notice_keyboard(&notice).unwrap();
        assert_eq!(callbacks(&markup), vec!["approve:7", "reject:7"]);
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert!(notice_keyboard(&Notice::text("plain")).is_none());
    }
}
