use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{TransactionResponse, WalletResponse};
use crate::entities::{EnrollmentStatus, TransactionStatus};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct AdminDepositQuery {
    /// 默认 pending
    pub status: Option<TransactionStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminDepositResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub user_id: i64,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    /// 短时有效的截图签名链接
    pub screenshot_signed_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReviewDepositRequest {
    pub approve: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReviewDepositResponse {
    pub transaction: TransactionResponse,
    /// 仅在批准时返回入账后的余额
    pub wallet: Option<WalletResponse>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdminStatsResponse {
    pub pending_deposits: i64,
    pub pending_enrollments: i64,
    pub total_users: i64,
    pub total_received_usd: i64,
    pub total_received_pkr: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct AdminEnrollmentQuery {
    pub status: Option<EnrollmentStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateEnrollmentRequest {
    pub status: EnrollmentStatus,
}
