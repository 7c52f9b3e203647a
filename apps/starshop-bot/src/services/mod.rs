pub mod admin_service;
pub mod fulfillment_service;
pub mod notification_service;
pub mod order_service;
pub mod payment;
pub mod pricing;
pub mod purchase_service;
pub mod session_service;
