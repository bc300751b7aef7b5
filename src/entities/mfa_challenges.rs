use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 单个挑战允许的错误次数，用完需重新申请
pub const MAX_CHALLENGE_ATTEMPTS: i32 = 5;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "mfa_challenges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub factor_id: Uuid,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
}

impl Model {
    /// 未过期、未使用且还有剩余次数
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.verified_at.is_none() && now < self.expires_at && !self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.failed_attempts >= MAX_CHALLENGE_ATTEMPTS
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
