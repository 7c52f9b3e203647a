use dotenvy::dotenv;
use std::sync::{Arc, OnceLock};
use teloxide::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod bot;
mod config;
mod services;
mod state;
mod utils;
pub mod models;

use crate::bot::notifier::BotNotifier;
use crate::config::BotConfig;
use crate::services::admin_service::{AccessControl, AdminService};
use crate::services::fulfillment_service::{Fulfillment, HttpFulfillment};
use crate::services::notification_service::NotificationService;
use crate::services::order_service::OrderService;
use crate::services::payment::GatewayRegistry;
use crate::services::pricing::Pricing;
use crate::services::purchase_service::PurchaseFlow;
use crate::services::session_service::SessionStore;
use crate::state::AppState;
use starshop_db::repositories::{OrderRepository, UserRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starshop_bot=info,starshop_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Starshop Bot...");

    let config = Arc::new(BotConfig::load()?);
    let pool = starshop_db::init_db(&config.database_url).await?;

    let bot = Bot::new(&config.bot_token);

    let users = UserRepository::new(pool.clone());
    let orders = OrderService::new(OrderRepository::new(pool));
    let notifications = NotificationService::new(Arc::new(BotNotifier::new(bot.clone())));
    let access = AccessControl::new(
        config.admin_ids.clone(),
        config.effective_reviewers().to_vec(),
    );

    let gateways = GatewayRegistry::from_config(&config.payments)?;
    tracing::info!("Payment methods offered: {:?}", gateways.available());

    let fulfillment: Option<Arc<dyn Fulfillment>> = match &config.fulfillment {
        Some(cfg) => Some(Arc::new(HttpFulfillment::new(cfg.clone())?) as Arc<dyn Fulfillment>),
        None => {
            tracing::warn!("FULFILLMENT_API_URL not set; approvals only credit the balance");
            None
        }
    };

    let purchase = PurchaseFlow::new(
        SessionStore::new(),
        Pricing::new(&config.pricing),
        gateways,
        users.clone(),
        orders.clone(),
        notifications.clone(),
        access.reviewers().to_vec(),
    );
    let admin = AdminService::new(
        access,
        orders.clone(),
        users.clone(),
        fulfillment,
        notifications,
        config.support_contact.clone(),
    );

    let state = AppState {
        config,
        users,
        orders,
        purchase,
        admin,
        bot_username: Arc::new(OnceLock::new()),
    };

    bot::run_bot(bot, state).await;
    Ok(())
}
