pub mod admin;
pub mod catalog;
pub mod chat;
pub mod common;
pub mod contact;
pub mod mfa;
pub mod pagination;
pub mod user;
pub mod wallet;

pub use admin::*;
pub use catalog::*;
pub use chat::*;
pub use common::*;
pub use contact::*;
pub use mfa::*;
pub use pagination::*;
pub use user::*;
pub use wallet::*;
