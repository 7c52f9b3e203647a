pub mod order;
pub mod promo;
pub mod user;
