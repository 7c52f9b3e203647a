use teloxide::prelude::*;
use teloxide::types::{ParseMode, User};

use crate::bot::replies::render;
use crate::services::purchase_service::{Customer, FlowReply};

pub mod callback;
pub mod command;
pub mod menu;

pub(crate) fn customer_from(user: &User) -> Customer {
    Customer {
        telegram_id: user.id.0 as i64,
        username: user.username.clone(),
        display_name: user.full_name(),
    }
}

pub(crate) async fn send_reply(
    bot: &Bot,
    chat_id: ChatId,
    reply: &FlowReply,
) -> Result<(), teloxide::RequestError> {
    let Some(reply) = render(reply) else {
        return Ok(());
    };
    let request = bot
        .send_message(chat_id, reply.text)
        .parse_mode(ParseMode::Html);
    match reply.keyboard {
        Some(markup) => request.reply_markup(markup).await?,
        None => request.await?,
    };
    Ok(())
}
