pub mod admin;
pub mod auth;
pub mod catalog;
pub mod chat;
pub mod contact;
pub mod mfa;
pub mod user;
pub mod wallet;

pub use admin::admin_config;
pub use auth::auth_config;
pub use catalog::catalog_config;
pub use chat::chat_config;
pub use contact::contact_config;
pub use mfa::mfa_config;
pub use user::user_config;
pub use wallet::wallet_config;
