use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{FactorStatus, FactorType, mfa_factor_entity};
use crate::utils::AssuranceLevel;

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct EnrollRequest {
    #[schema(example = "My phone")]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TotpEnrollment {
    /// 供前端渲染二维码的 otpauth URI
    pub qr_code: String,
    pub secret: String,
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnrollResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub factor_type: FactorType,
    pub totp: TotpEnrollment,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ChallengeRequest {
    pub factor_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct VerifyRequest {
    pub factor_id: Uuid,
    pub challenge_id: Uuid,
    #[schema(example = "123456")]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VerifyResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub aal: AssuranceLevel,
    /// 首次验证时返回一次，不做持久化
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FactorResponse {
    pub id: Uuid,
    pub friendly_name: Option<String>,
    pub factor_type: FactorType,
    pub status: FactorStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<mfa_factor_entity::Model> for FactorResponse {
    fn from(m: mfa_factor_entity::Model) -> Self {
        Self {
            id: m.id,
            friendly_name: m.friendly_name,
            factor_type: m.factor_type,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FactorListResponse {
    pub all: Vec<FactorResponse>,
    /// 仅已验证的 TOTP 因子
    pub totp: Vec<FactorResponse>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AalResponse {
    pub current_level: AssuranceLevel,
    pub next_level: AssuranceLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LockoutStatusResponse {
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    pub remaining_attempts: i32,
    /// 客户端倒计时起点
    pub retry_after_seconds: i64,
}
