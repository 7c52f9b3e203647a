pub mod order_repo;
pub mod promo_repo;
pub mod user_repo;

pub use order_repo::OrderRepository;
pub use promo_repo::PromoRepository;
pub use user_repo::UserRepository;
