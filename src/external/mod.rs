pub mod ai_gateway;
pub mod object_storage;

pub use ai_gateway::*;
pub use object_storage::*;
