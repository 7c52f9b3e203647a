use anyhow::Result;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::bot::keyboards::notice_keyboard;
use crate::services::notification_service::{Notice, Notifier};

/// Delivers notices through the Bot API.
pub struct BotNotifier {
    bot: Bot,
}

impl BotNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for BotNotifier {
    async fn send(&self, chat_id: i64, notice: &Notice) -> Result<()> {
        let request = self
            .bot
            .send_message(ChatId(chat_id), notice.text.clone())
            .parse_mode(ParseMode::Html);

        match notice_keyboard(notice) {
            Some(markup) => request.reply_markup(markup).await?,
            None => request.await?,
        };
        Ok(())
    }
}
