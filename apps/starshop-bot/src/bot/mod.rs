use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

pub mod handlers;
pub mod keyboards;
pub mod notifier;
pub mod replies;

pub async fn run_bot(bot: Bot, state: crate::AppState) {
    info!("Starting bot dispatcher...");

    std::panic::set_hook(Box::new(|info| {
        error!("CRITICAL BOT PANIC: {:?}", info);
    }));

    match bot.get_me().await {
        Ok(me) => {
            let username = me.username.clone().unwrap_or_else(|| "unknown".into());
            info!("Bot connected as: @{}", username);
            let _ = state.bot_username.set(username);
        }
        Err(e) => {
            error!("CRITICAL: Bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let handler = Update::filter_message().endpoint(handlers::command::message_handler);
    let callback_handler =
        Update::filter_callback_query().endpoint(handlers::callback::callback_handler);

    Dispatcher::builder(bot, dptree::entry().branch(handler).branch(callback_handler))
        .dependencies(dptree::deps![state])
        .default_handler(|upd: std::sync::Arc<Update>| async move {
            info!("Unhandled update: {:?}", upd.id);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot dispatcher stopped");
}
