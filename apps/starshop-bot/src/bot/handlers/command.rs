use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::{error, info};

use crate::bot::handlers::{customer_from, menu, send_reply};
use crate::bot::keyboards::{
    main_menu, BTN_BUY, BTN_FAQ, BTN_ORDERS, BTN_PENDING, BTN_PROFILE, BTN_REFERRAL, BTN_SUPPORT,
};
use crate::services::purchase_service::FlowReply;
use crate::AppState;

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let (Some(text), Some(from)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let customer = customer_from(from);
    let tg_id = customer.telegram_id;

    if let Some(payload) = start_payload(text) {
        let referrer = payload.parse::<i64>().ok();
        match state.users.get_or_create(tg_id, referrer).await {
            Ok((_, true)) => info!("New user {} via /start", tg_id),
            Ok(_) => {}
            Err(e) => error!("Failed to register user {}: {:#}", tg_id, e),
        }
        // A fresh /start abandons any purchase in progress.
        state.purchase.cancel(&customer).await;
        return menu::send_home(&bot, chat_id, &state, tg_id).await;
    }

    match text.trim() {
        "/id" | "/get_id" => {
            bot.send_message(
                chat_id,
                format!(
                    "Chat ID: <code>{}</code>\nUser ID: <code>{}</code>",
                    chat_id.0, tg_id
                ),
            )
            .parse_mode(ParseMode::Html)
            .await?;
        }
        "/cancel" => {
            let reply = state.purchase.cancel(&customer).await;
            send_reply(&bot, chat_id, &reply).await?;
        }
        "/admin" => {
            if state.admin.access().is_admin(tg_id) || state.admin.access().can_review(tg_id) {
                menu::send_home(&bot, chat_id, &state, tg_id).await?;
            }
        }
        BTN_BUY => {
            if let Err(e) = state.users.get_or_create(tg_id, None).await {
                error!("Failed to register user {}: {:#}", tg_id, e);
            }
            let reply = state.purchase.start(&customer).await;
            send_reply(&bot, chat_id, &reply).await?;
        }
        BTN_PROFILE => menu::send_profile(&bot, chat_id, &state, tg_id).await?,
        BTN_ORDERS => menu::send_orders(&bot, chat_id, &state, tg_id).await?,
        BTN_REFERRAL => menu::send_referral(&bot, chat_id, &state, tg_id).await?,
        BTN_SUPPORT => menu::send_support(&bot, chat_id, &state).await?,
        BTN_FAQ => menu::send_faq(&bot, chat_id, &state).await?,
        BTN_PENDING => menu::send_pending(&bot, chat_id, &state, tg_id).await?,
        _ => match state.purchase.handle_text(&customer, text).await {
            FlowReply::Idle => {
                let is_admin = state.admin.access().is_admin(tg_id);
                bot.send_message(chat_id, "Use the menu below 👇")
                    .reply_markup(main_menu(is_admin))
                    .await?;
            }
            FlowReply::Stale => {
                bot.send_message(chat_id, "Please use the buttons above, or /cancel.")
                    .await?;
            }
            reply => send_reply(&bot, chat_id, &reply).await?,
        },
    }

    Ok(())
}

/// Payload of `/start`, `/start <ref>` or `/start@bot <ref>`. Other commands
/// sharing the prefix (`/startfoo`) are not `/start`.
fn start_payload(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("/start")?;
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c.is_whitespace() => Some(rest.trim()),
        Some('@') => Some(
            rest.split_once(char::is_whitespace)
                .map(|(_, payload)| payload.trim())
                .unwrap_or(""),
        ),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_payload_matches_the_command_only() {
        assert_eq!(start_payload("/start"), Some(""));
        assert_eq!(start_payload("/start 12345"), Some("12345"));
        assert_eq!(start_payload("/start@star_shop_bot 77"), Some("77"));
        assert_eq!(start_payload("/start@star_shop_bot"), Some(""));
        assert_eq!(start_payload("/startfoo"), None);
        assert_eq!(start_payload("/starting 5"), None);
        assert_eq!(start_payload("hello"), None);
    }
}
