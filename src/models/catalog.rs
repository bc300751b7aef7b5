use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{TransactionResponse, WalletResponse};
use crate::entities::{
    Currency, EnrollmentStatus, SubscriptionStatus, course_enrollment_entity, course_entity,
    premium_plan_entity, user_subscription_entity,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanResponse {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_usd: i64,
    pub price_pkr: i64,
    pub duration_days: i32,
}

impl From<premium_plan_entity::Model> for PlanResponse {
    fn from(m: premium_plan_entity::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            price_usd: m.price_usd,
            price_pkr: m.price_pkr,
            duration_days: m.duration_days,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub price_usd: i64,
    pub price_pkr: i64,
}

impl From<course_entity::Model> for CourseResponse {
    fn from(m: course_entity::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            description: m.description,
            price_usd: m.price_usd,
            price_pkr: m.price_pkr,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub plan_id: i64,
    pub plan_name: Option<String>,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SubscriptionResponse {
    pub fn new(m: user_subscription_entity::Model, plan_name: Option<String>) -> Self {
        Self {
            id: m.id,
            plan_id: m.plan_id,
            plan_name,
            status: m.status,
            starts_at: m.starts_at,
            expires_at: m.expires_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PurchasePlanRequest {
    /// 从哪个币种余额扣款
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchasePlanResponse {
    pub subscription: SubscriptionResponse,
    pub transaction: TransactionResponse,
    pub wallet: WalletResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub course_title: Option<String>,
    pub status: EnrollmentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EnrollmentResponse {
    pub fn new(m: course_enrollment_entity::Model, course_title: Option<String>) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            course_id: m.course_id,
            course_title,
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}
