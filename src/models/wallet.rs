use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{
    Currency, PaymentMethod, TransactionStatus, TransactionType, transaction_entity,
    user_wallet_entity,
};

/// 付款截图（base64）
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DepositProof {
    #[schema(example = "receipt.png")]
    pub file_name: String,
    #[schema(example = "image/png")]
    pub content_type: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitDepositRequest {
    /// 主单位金额，最多两位小数
    #[schema(example = 25.5)]
    pub amount: f64,
    pub currency: Currency,
    pub payment_method: Option<PaymentMethod>,
    pub proof: Option<DepositProof>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount_usd: i64,
    pub amount_pkr: i64,
    pub currency: Currency,
    pub payment_method: Option<PaymentMethod>,
    pub status: TransactionStatus,
    pub screenshot_url: Option<String>,
    pub description: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<transaction_entity::Model> for TransactionResponse {
    fn from(m: transaction_entity::Model) -> Self {
        Self {
            id: m.id,
            tx_type: m.tx_type,
            amount_usd: m.amount_usd,
            amount_pkr: m.amount_pkr,
            currency: m.currency,
            payment_method: m.payment_method,
            status: m.status,
            screenshot_url: m.screenshot_url,
            description: m.description,
            reviewed_at: m.reviewed_at,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// 美分
    pub balance_usd: i64,
    /// 派沙
    pub balance_pkr: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<user_wallet_entity::Model> for WalletResponse {
    fn from(m: user_wallet_entity::Model) -> Self {
        Self {
            balance_usd: m.balance_usd,
            balance_pkr: m.balance_pkr,
            updated_at: m.updated_at,
        }
    }
}

impl WalletResponse {
    pub fn empty() -> Self {
        Self {
            balance_usd: 0,
            balance_pkr: 0,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepositSubmittedResponse {
    pub transaction: TransactionResponse,
    /// 预填消息的 WhatsApp 链接，用于人工确认付款
    pub whatsapp_link: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(rename = "type")]
    pub tx_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentMethodInfo {
    pub id: PaymentMethod,
    pub name: String,
    pub currencies: Vec<Currency>,
}
