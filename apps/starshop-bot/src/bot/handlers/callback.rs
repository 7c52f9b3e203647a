use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, ParseMode};
use tracing::{error, info, warn};

use crate::bot::handlers::{customer_from, menu, send_reply};
use crate::bot::replies::callback_alert;
use crate::models::action::Action;
use crate::services::admin_service::ReviewOutcome;
use crate::utils::escape_html;
use crate::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let callback_id = q.id.clone();
    let customer = customer_from(&q.from);
    let tg_id = customer.telegram_id;
    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or(ChatId(tg_id));

    let Some(data) = q.data.as_deref() else {
        bot.answer_callback_query(callback_id).await?;
        return Ok(());
    };

    let action = match Action::decode(data) {
        Ok(action) => action,
        Err(e) => {
            warn!("Rejected callback {:?} from {}: {}", data, tg_id, e);
            bot.answer_callback_query(callback_id)
                .text("Unknown action")
                .await?;
            return Ok(());
        }
    };
    info!("Callback {} from {}", action, tg_id);

    let reply = match action {
        Action::Approve { order_id } | Action::Reject { order_id } => {
            let result = if matches!(action, Action::Approve { .. }) {
                state.admin.approve(tg_id, order_id).await
            } else {
                state.admin.reject(tg_id, order_id).await
            };
            return handle_review(&bot, &q, result).await;
        }
        Action::Buy => {
            if let Err(e) = state.users.get_or_create(tg_id, None).await {
                error!("Failed to register user {}: {:#}", tg_id, e);
            }
            state.purchase.start(&customer).await
        }
        Action::BuyForSelf => state.purchase.choose_self(&customer).await,
        Action::BuyForFriend => state.purchase.choose_friend(&customer).await,
        Action::ConfirmRecipient => state.purchase.confirm_recipient(&customer).await,
        Action::Cancel => state.purchase.cancel(&customer).await,
        Action::PayWith { method } => state.purchase.choose_method(&customer, method).await,
        Action::ConfirmPayment => state.purchase.confirm_payment(&customer).await,
        Action::CheckInvoice => state.purchase.check_invoice(&customer).await,
        Action::Profile => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_profile(&bot, chat_id, &state, tg_id).await;
        }
        Action::Orders => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_orders(&bot, chat_id, &state, tg_id).await;
        }
        Action::Referral => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_referral(&bot, chat_id, &state, tg_id).await;
        }
        Action::Support => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_support(&bot, chat_id, &state).await;
        }
        Action::Faq => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_faq(&bot, chat_id, &state).await;
        }
        Action::DeleteAccount => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_delete_account(&bot, chat_id, &state).await;
        }
        Action::Home => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_home(&bot, chat_id, &state, tg_id).await;
        }
        Action::AdminPending => {
            bot.answer_callback_query(callback_id).await?;
            return menu::send_pending(&bot, chat_id, &state, tg_id).await;
        }
    };

    if let Some(alert) = callback_alert(&reply) {
        bot.answer_callback_query(callback_id).text(alert).await?;
        return Ok(());
    }

    bot.answer_callback_query(callback_id).await?;
    // The step's buttons are spent once pressed.
    if let Some(msg) = q.message.as_ref() {
        let _ = bot
            .edit_message_reply_markup(msg.chat().id, msg.id())
            .await;
    }
    send_reply(&bot, chat_id, &reply).await?;

    Ok(())
}

async fn handle_review(
    bot: &Bot,
    q: &CallbackQuery,
    result: anyhow::Result<ReviewOutcome>,
) -> Result<(), teloxide::RequestError> {
    let callback_id = q.id.clone();
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Review action failed: {:#}", e);
            bot.answer_callback_query(callback_id)
                .text("⚠️ Something went wrong. Try again later.")
                .show_alert(true)
                .await?;
            return Ok(());
        }
    };

    let Some(marker) = outcome.marker() else {
        bot.answer_callback_query(callback_id)
            .text(outcome.alert())
            .show_alert(true)
            .await?;
        return Ok(());
    };

    bot.answer_callback_query(callback_id)
        .text(outcome.alert())
        .await?;

    if let Some(msg) = q.message.as_ref().and_then(|m| m.regular_message()) {
        let original = msg.text().unwrap_or_default();
        let edited = format!("{}\n\n<b>{}</b>", escape_html(original), marker);
        if let Err(e) = bot
            .edit_message_text(msg.chat.id, msg.id, edited)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!("Failed to update review message: {}", e);
        }
    }
    Ok(())
}
