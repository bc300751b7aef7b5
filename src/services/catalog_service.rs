use crate::entities::{
    Currency, EnrollmentStatus, SubscriptionStatus, TransactionStatus, TransactionType,
    course_enrollment_entity as enrollments, course_entity as courses,
    premium_plan_entity as plans, transaction_entity as transactions,
    user_subscription_entity as subscriptions, user_wallet_entity as wallets,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct CatalogService {
    pool: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    pub async fn list_plans(&self) -> AppResult<Vec<PlanResponse>> {
        let list = plans::Entity::find()
            .filter(plans::Column::IsActive.eq(true))
            .order_by_asc(plans::Column::PriceUsd)
            .all(self.pool.as_ref())
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    pub async fn list_courses(&self) -> AppResult<Vec<CourseResponse>> {
        let list = courses::Entity::find()
            .filter(courses::Column::IsActive.eq(true))
            .order_by_asc(courses::Column::Id)
            .all(self.pool.as_ref())
            .await?;
        Ok(list.into_iter().map(Into::into).collect())
    }

    /// 当前有效订阅（取到期最晚的一条）
    pub async fn my_subscription(&self, user_id: i64) -> AppResult<Option<SubscriptionResponse>> {
        let sub = subscriptions::Entity::find()
            .filter(subscriptions::Column::UserId.eq(user_id))
            .filter(subscriptions::Column::Status.eq(SubscriptionStatus::Active))
            .filter(subscriptions::Column::ExpiresAt.gt(Utc::now()))
            .order_by_desc(subscriptions::Column::ExpiresAt)
            .one(self.pool.as_ref())
            .await?;

        let Some(sub) = sub else {
            return Ok(None);
        };
        let plan_name = plans::Entity::find_by_id(sub.plan_id)
            .one(self.pool.as_ref())
            .await?
            .map(|p| p.name);
        Ok(Some(SubscriptionResponse::new(sub, plan_name)))
    }

    /// 用钱包余额购买会员
    ///
    /// 扣款以 `balance >= price` 为条件，余额不会变为负数；续费时新周期接在现有订阅之后。
    pub async fn purchase_plan(
        &self,
        user_id: i64,
        plan_id: i64,
        currency: Currency,
    ) -> AppResult<PurchasePlanResponse> {
        let plan = plans::Entity::find_by_id(plan_id)
            .filter(plans::Column::IsActive.eq(true))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))?;

        let (price, balance_col) = match currency {
            Currency::Usd => (plan.price_usd, wallets::Column::BalanceUsd),
            Currency::Pkr => (plan.price_pkr, wallets::Column::BalancePkr),
        };
        if price <= 0 {
            return Err(AppError::ValidationError(format!(
                "Plan is not available in {currency}"
            )));
        }

        let now = Utc::now();
        let txn = self.pool.begin().await?;

        let debited = wallets::Entity::update_many()
            .col_expr(balance_col, Expr::col(balance_col).sub(price))
            .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
            .filter(wallets::Column::UserId.eq(user_id))
            .filter(balance_col.gte(price))
            .exec(&txn)
            .await?;
        if debited.rows_affected == 0 {
            return Err(AppError::ValidationError("Insufficient balance".to_string()));
        }

        let (amount_usd, amount_pkr) = match currency {
            Currency::Usd => (price, 0),
            Currency::Pkr => (0, price),
        };
        let tx = transactions::ActiveModel {
            user_id: Set(user_id),
            tx_type: Set(TransactionType::Purchase),
            amount_usd: Set(amount_usd),
            amount_pkr: Set(amount_pkr),
            currency: Set(currency),
            payment_method: Set(None),
            status: Set(TransactionStatus::Completed),
            screenshot_url: Set(None),
            description: Set(Some(format!("Premium plan: {}", plan.name))),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let current = subscriptions::Entity::find()
            .filter(subscriptions::Column::UserId.eq(user_id))
            .filter(subscriptions::Column::Status.eq(SubscriptionStatus::Active))
            .filter(subscriptions::Column::ExpiresAt.gt(now))
            .order_by_desc(subscriptions::Column::ExpiresAt)
            .one(&txn)
            .await?;
        let starts_at = current.map(|s| s.expires_at).unwrap_or(now);

        let sub = subscriptions::ActiveModel {
            user_id: Set(user_id),
            plan_id: Set(plan.id),
            status: Set(SubscriptionStatus::Active),
            starts_at: Set(starts_at),
            expires_at: Set(starts_at + Duration::days(plan.duration_days as i64)),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let wallet = wallets::Entity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::InternalError("Wallet disappeared during purchase".to_string()))?;

        txn.commit().await?;

        log::info!("User {} purchased plan {} for {} {}", user_id, plan.id, price, currency);

        Ok(PurchasePlanResponse {
            subscription: SubscriptionResponse::new(sub, Some(plan.name)),
            transaction: tx.into(),
            wallet: wallet.into(),
        })
    }

    /// 申请课程，等待管理员确认
    pub async fn enroll_course(&self, user_id: i64, course_id: i64) -> AppResult<EnrollmentResponse> {
        let course = courses::Entity::find_by_id(course_id)
            .filter(courses::Column::IsActive.eq(true))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Course not found".to_string()))?;

        let existing = enrollments::Entity::find()
            .filter(enrollments::Column::UserId.eq(user_id))
            .filter(enrollments::Column::CourseId.eq(course_id))
            .one(self.pool.as_ref())
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(
                "You have already enrolled in this course".to_string(),
            ));
        }

        let now = Utc::now();
        let enrollment = enrollments::ActiveModel {
            user_id: Set(user_id),
            course_id: Set(course_id),
            status: Set(EnrollmentStatus::Pending),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(self.pool.as_ref())
        .await?;

        Ok(EnrollmentResponse::new(enrollment, Some(course.title)))
    }

    pub async fn my_enrollments(&self, user_id: i64) -> AppResult<Vec<EnrollmentResponse>> {
        let rows = enrollments::Entity::find()
            .filter(enrollments::Column::UserId.eq(user_id))
            .order_by_desc(enrollments::Column::CreatedAt)
            .all(self.pool.as_ref())
            .await?;
        let titles: HashMap<i64, String> = courses::Entity::find()
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c.title))
            .collect();

        Ok(rows
            .into_iter()
            .map(|e| {
                let title = titles.get(&e.course_id).cloned();
                EnrollmentResponse::new(e, title)
            })
            .collect())
    }

    /// 将已到期的订阅标记为 expired
    pub async fn expire_subscriptions(&self) -> AppResult<u64> {
        let now = Utc::now();
        let result = subscriptions::Entity::update_many()
            .col_expr(
                subscriptions::Column::Status,
                Expr::value(SubscriptionStatus::Expired),
            )
            .col_expr(subscriptions::Column::UpdatedAt, Expr::value(now))
            .filter(subscriptions::Column::Status.eq(SubscriptionStatus::Active))
            .filter(subscriptions::Column::ExpiresAt.lte(now))
            .exec(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn plan() -> plans::Model {
        plans::Model {
            id: 1,
            name: "Monthly".to_string(),
            description: None,
            price_usd: 999,
            price_pkr: 280000,
            duration_days: 30,
            is_active: true,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_purchase_with_insufficient_balance_fails() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![plan()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let svc = CatalogService::new(Arc::new(db));

        let err = svc.purchase_plan(7, 1, Currency::Usd).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m == "Insufficient balance"));
    }

    #[tokio::test]
    async fn test_purchase_extends_from_current_subscription() {
        let now = Utc::now();
        let current_end = now + Duration::days(10);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![plan()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![transactions::Model {
                id: 3,
                user_id: 7,
                tx_type: TransactionType::Purchase,
                amount_usd: 999,
                amount_pkr: 0,
                currency: Currency::Usd,
                payment_method: None,
                status: TransactionStatus::Completed,
                screenshot_url: None,
                description: Some("Premium plan: Monthly".to_string()),
                reviewed_by: None,
                reviewed_at: None,
                created_at: Some(now),
                updated_at: Some(now),
            }]])
            .append_query_results([vec![subscriptions::Model {
                id: 1,
                user_id: 7,
                plan_id: 1,
                status: SubscriptionStatus::Active,
                starts_at: now - Duration::days(20),
                expires_at: current_end,
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([vec![subscriptions::Model {
                id: 2,
                user_id: 7,
                plan_id: 1,
                status: SubscriptionStatus::Active,
                starts_at: current_end,
                expires_at: current_end + Duration::days(30),
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([vec![wallets::Model {
                user_id: 7,
                balance_usd: 1,
                balance_pkr: 0,
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let svc = CatalogService::new(Arc::new(db));

        let resp = svc.purchase_plan(7, 1, Currency::Usd).await.unwrap();
        assert_eq!(resp.subscription.starts_at, current_end);
        assert_eq!(resp.wallet.balance_usd, 1);
        assert_eq!(resp.transaction.tx_type, TransactionType::Purchase);
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_is_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![courses::Model {
                id: 2,
                title: "YouTube Mastery".to_string(),
                description: None,
                price_usd: 4900,
                price_pkr: 1_350_000,
                is_active: true,
                created_at: None,
            }]])
            .append_query_results([vec![enrollments::Model {
                id: 1,
                user_id: 7,
                course_id: 2,
                status: EnrollmentStatus::Pending,
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let svc = CatalogService::new(Arc::new(db));

        let err = svc.enroll_course(7, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
