pub mod code_generator;
pub mod jwt;
pub mod password;
pub mod sse;
pub mod totp;
pub mod validation;
pub mod whatsapp;

pub use code_generator::*;
pub use jwt::*;
pub use password::*;
pub use validation::*;
pub use whatsapp::*;
