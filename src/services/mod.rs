pub mod admin_service;
pub mod auth_service;
pub mod catalog_service;
pub mod chat_service;
pub mod mfa_service;
pub mod user_service;
pub mod wallet_service;

pub use admin_service::*;
pub use auth_service::*;
pub use catalog_service::*;
pub use chat_service::*;
pub use mfa_service::*;
pub use user_service::*;
pub use wallet_service::*;
