use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OrderLinkQuery {
    #[schema(example = "YouTube Growth")]
    pub service: String,
    #[schema(example = "Starter")]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLinkResponse {
    pub url: String,
    pub message: String,
}
