use std::sync::{Arc, OnceLock};

use starshop_db::repositories::UserRepository;

use crate::config::BotConfig;
use crate::services::admin_service::AdminService;
use crate::services::order_service::OrderService;
use crate::services::purchase_service::PurchaseFlow;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BotConfig>,
    pub users: UserRepository,
    pub orders: OrderService,
    pub purchase: PurchaseFlow,
    pub admin: AdminService,
    /// Learned from `get_me` at startup.
    pub bot_username: Arc<OnceLock<String>>,
}

impl AppState {
    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username
            .get()
            .map(String::as_str)
            .or(self.config.bot_username.as_deref())
    }
}
