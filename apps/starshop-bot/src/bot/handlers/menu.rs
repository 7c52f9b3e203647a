use starshop_db::models::order::{Order, OrderStatus};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, ParseMode};
use tracing::error;

use crate::bot::keyboards::{admin_keyboard, button, home_keyboard, main_menu, profile_keyboard};
use crate::models::action::Action;
use crate::utils::escape_html;
use crate::AppState;

const HISTORY_LIMIT: i64 = 10;
const PENDING_LIMIT: i64 = 20;
const GENERIC_ERROR: &str = "⚠️ Something went wrong. Please try again later.";

pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "⏳ pending",
        OrderStatus::Completed => "✅ completed",
        OrderStatus::Rejected => "❌ rejected",
        OrderStatus::Error => "⚠️ error",
    }
}

fn order_line(order: &Order) -> String {
    format!(
        "#{} · {} ⭐ → @{} · {} {} · {} · {}",
        order.id,
        order.stars,
        escape_html(&order.recipient),
        order.amount,
        escape_html(&order.currency),
        status_label(order.status),
        order.created_at.format("%d.%m.%Y")
    )
}

async fn send_html(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<(), teloxide::RequestError> {
    let request = bot.send_message(chat_id, text.into()).parse_mode(ParseMode::Html);
    match keyboard {
        Some(markup) => request.reply_markup(markup).await?,
        None => request.await?,
    };
    Ok(())
}

pub async fn send_home(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    let is_admin = state.admin.access().is_admin(tg_id);
    bot.send_message(
        chat_id,
        "👋 <b>Welcome to the Stars shop!</b>\n\n\
         Buy Telegram Stars for yourself or a friend. Use the menu below.",
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(main_menu(is_admin))
    .await?;

    if is_admin || state.admin.access().can_review(tg_id) {
        send_html(bot, chat_id, "🛠 <b>Admin menu</b>", Some(admin_keyboard())).await?;
    }
    Ok(())
}

pub async fn send_profile(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    let user = match state.users.get_or_create(tg_id, None).await {
        Ok((user, _)) => user,
        Err(e) => {
            error!("Failed to load profile for {}: {:#}", tg_id, e);
            return send_html(bot, chat_id, GENERIC_ERROR, None).await;
        }
    };
    let orders = state.orders.count_for_user(user.id).await.unwrap_or_else(|e| {
        error!("Failed to count orders for {}: {:#}", tg_id, e);
        0
    });

    let text = format!(
        "👤 <b>Your profile</b>\n\n\
         ID: <code>{}</code>\n\
         Balance: <b>{} ⭐</b>\n\
         Orders: {}\n\
         Member since: {}",
        tg_id,
        user.balance,
        orders,
        user.created_at.format("%d.%m.%Y")
    );
    send_html(bot, chat_id, text, Some(profile_keyboard())).await
}

pub async fn send_orders(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    let orders = match state.users.get_by_telegram_id(tg_id).await {
        Ok(Some(user)) => state.orders.get_orders_for_user(user.id, HISTORY_LIMIT).await,
        Ok(None) => Ok(Vec::new()),
        Err(e) => Err(e),
    };

    let text = match orders {
        Ok(orders) if orders.is_empty() => "🧾 You have no orders yet.".to_string(),
        Ok(orders) => {
            let lines: Vec<String> = orders.iter().map(order_line).collect();
            format!("🧾 <b>Your last orders</b>\n\n{}", lines.join("\n"))
        }
        Err(e) => {
            error!("Failed to load orders for {}: {:#}", tg_id, e);
            GENERIC_ERROR.to_string()
        }
    };
    send_html(bot, chat_id, text, Some(home_keyboard())).await
}

pub async fn send_referral(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    let Some(bot_username) = state.bot_username() else {
        return send_html(bot, chat_id, "🎁 Referral links are not available yet.", None).await;
    };
    let invited = state.users.count_referrals(tg_id).await.unwrap_or_else(|e| {
        error!("Failed to count referrals for {}: {:#}", tg_id, e);
        0
    });

    let text = format!(
        "🎁 <b>Invite friends</b>\n\n\
         Your link:\n<code>https://t.me/{}?start={}</code>\n\n\
         Friends invited: <b>{}</b>",
        escape_html(bot_username),
        tg_id,
        invited
    );
    send_html(bot, chat_id, text, Some(home_keyboard())).await
}

pub async fn send_support(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let text = format!(
        "❓ <b>Support</b>\n\nQuestions about an order? Write to {} and include your order number.",
        escape_html(&state.config.support_contact)
    );
    send_html(bot, chat_id, text, None).await
}

pub async fn send_faq(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let pricing = &state.config.pricing;
    let text = format!(
        "📖 <b>FAQ</b>\n\n\
         <b>How much does a star cost?</b>\n{} {}\n\n\
         <b>How many stars can I buy?</b>\nFrom {} to {} per order.\n\n\
         <b>How long does delivery take?</b>\nAn administrator checks each payment manually, \
         usually within a few hours.\n\n\
         <b>Can I buy stars for a friend?</b>\nYes, choose «For a friend» and send their @username.",
        pricing.star_rate,
        escape_html(&pricing.currency),
        pricing.min_stars,
        pricing.max_stars
    );
    send_html(bot, chat_id, text, None).await
}

/// Informational only; accounts are never removed from the bot.
pub async fn send_delete_account(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let text = format!(
        "🗑 To delete your account and data, contact support: {}",
        escape_html(&state.config.support_contact)
    );
    send_html(bot, chat_id, text, Some(home_keyboard())).await
}

pub async fn send_pending(
    bot: &Bot,
    chat_id: ChatId,
    state: &AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    let orders = match state.admin.pending_orders(tg_id, PENDING_LIMIT).await {
        Ok(Some(orders)) => orders,
        Ok(None) => return send_html(bot, chat_id, "⛔ Admins only.", None).await,
        Err(e) => {
            error!("Failed to load pending orders: {:#}", e);
            return send_html(bot, chat_id, GENERIC_ERROR, None).await;
        }
    };

    if orders.is_empty() {
        return send_html(bot, chat_id, "✅ No pending orders.", None).await;
    }

    let lines: Vec<String> = orders.iter().map(order_line).collect();
    let rows = orders
        .iter()
        .map(|o| {
            vec![
                button(&format!("✅ #{}", o.id), Action::Approve { order_id: o.id }),
                button(&format!("❌ #{}", o.id), Action::Reject { order_id: o.id }),
            ]
        })
        .collect::<Vec<_>>();

    send_html(
        bot,
        chat_id,
        format!("🛠 <b>Pending orders</b>\n\n{}", lines.join("\n")),
        Some(InlineKeyboardMarkup::new(rows)),
    )
    .await
}
