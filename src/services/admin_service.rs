use crate::entities::{
    AppRole, Currency, EnrollmentStatus, TransactionStatus, TransactionType,
    admin_wallet_entity as admin_wallet, course_enrollment_entity as enrollments,
    course_entity as courses, profile_entity as profiles, transaction_entity as transactions,
    user_entity as users, user_wallet_entity as wallets,
};
use crate::error::{AppError, AppResult};
use crate::external::ObjectStorageService;
use crate::models::*;
use crate::services::user_service::has_role;
use crate::services::wallet_service::ensure_wallet;
use crate::utils::AssuranceLevel;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AdminService {
    pool: Arc<DatabaseConnection>,
    storage: ObjectStorageService,
    // 正在审核中的充值记录
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

/// 审核结束（含出错）时释放占用
struct ReviewGuard {
    in_flight: Arc<Mutex<HashSet<i64>>>,
    transaction_id: i64,
}

impl Drop for ReviewGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.transaction_id);
        }
    }
}

impl AdminService {
    pub fn new(pool: Arc<DatabaseConnection>, storage: ObjectStorageService) -> Self {
        Self {
            pool,
            storage,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// 管理接口要求 admin 角色且已完成 MFA（aal2）
    pub async fn ensure_admin(&self, user_id: i64, aal: AssuranceLevel) -> AppResult<()> {
        if !has_role(self.pool.as_ref(), user_id, AppRole::Admin).await? {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        if aal < AssuranceLevel::Aal2 {
            return Err(AppError::Forbidden(
                "Two-factor verification required".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn list_deposits(
        &self,
        query: &AdminDepositQuery,
    ) -> AppResult<PaginatedResponse<AdminDepositResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);
        let status = query.status.unwrap_or(TransactionStatus::Pending);

        let base = transactions::Entity::find()
            .filter(transactions::Column::TxType.eq(TransactionType::Deposit))
            .filter(transactions::Column::Status.eq(status));

        let total = base.clone().count(self.pool.as_ref()).await? as i64;
        let rows = base
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_desc(transactions::Column::Id)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?;

        let user_ids: Vec<i64> = rows
            .iter()
            .map(|t| t.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let emails: HashMap<i64, String> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            users::Entity::find()
                .filter(users::Column::Id.is_in(user_ids.clone()))
                .all(self.pool.as_ref())
                .await?
                .into_iter()
                .map(|u| (u.id, u.email))
                .collect()
        };
        let names: HashMap<i64, Option<String>> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            profiles::Entity::find()
                .filter(profiles::Column::UserId.is_in(user_ids))
                .all(self.pool.as_ref())
                .await?
                .into_iter()
                .map(|p| (p.user_id, p.full_name))
                .collect()
        };

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let signed = self.signed_screenshot_url(row.screenshot_url.as_deref()).await;
            let user_id = row.user_id;
            items.push(AdminDepositResponse {
                transaction: row.into(),
                user_id,
                user_email: emails.get(&user_id).cloned(),
                user_name: names.get(&user_id).cloned().flatten(),
                screenshot_signed_url: signed,
            });
        }

        Ok(PaginatedResponse::new(items, &params, total))
    }

    // 签名失败不影响列表，仅记录日志
    async fn signed_screenshot_url(&self, public_url: Option<&str>) -> Option<String> {
        let key = self.storage.key_from_public_url(public_url?)?;
        match self.storage.create_signed_url(&key).await {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!("Failed to sign screenshot {key}: {e}");
                None
            }
        }
    }

    fn begin_review(&self, transaction_id: i64) -> AppResult<ReviewGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| AppError::InternalError("Review lock poisoned".to_string()))?;
        if !set.insert(transaction_id) {
            return Err(AppError::Conflict(
                "This deposit is already being reviewed".to_string(),
            ));
        }
        Ok(ReviewGuard {
            in_flight: self.in_flight.clone(),
            transaction_id,
        })
    }

    /// 审核充值：pending → completed（入账）或 cancelled
    ///
    /// 状态更新以 `status = 'pending'` 为条件，与入账在同一事务内，
    /// 因此每条记录最多入账一次。
    pub async fn approve_deposit(
        &self,
        admin_id: i64,
        transaction_id: i64,
        approve: bool,
    ) -> AppResult<ReviewDepositResponse> {
        let _guard = self.begin_review(transaction_id)?;

        let txn = self.pool.begin().await?;
        let now = Utc::now();
        let new_status = if approve {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Cancelled
        };

        let result = transactions::Entity::update_many()
            .col_expr(transactions::Column::Status, Expr::value(new_status))
            .col_expr(transactions::Column::ReviewedBy, Expr::value(admin_id))
            .col_expr(transactions::Column::ReviewedAt, Expr::value(now))
            .col_expr(transactions::Column::UpdatedAt, Expr::value(now))
            .filter(transactions::Column::Id.eq(transaction_id))
            .filter(transactions::Column::TxType.eq(TransactionType::Deposit))
            .filter(transactions::Column::Status.eq(TransactionStatus::Pending))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            let existing = transactions::Entity::find_by_id(transaction_id)
                .one(&txn)
                .await?;
            return Err(match existing {
                Some(t) if t.tx_type == TransactionType::Deposit => AppError::Conflict(format!(
                    "Deposit has already been reviewed (status: {})",
                    t.status
                )),
                _ => AppError::NotFound("Deposit not found".to_string()),
            });
        }

        let tx = transactions::Entity::find_by_id(transaction_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Deposit not found".to_string()))?;

        let wallet = if approve {
            Some(self.credit_wallet(&txn, &tx).await?)
        } else {
            None
        };

        txn.commit().await?;

        log::info!(
            "Deposit {} {} by admin {}",
            transaction_id,
            if approve { "approved" } else { "rejected" },
            admin_id
        );

        Ok(ReviewDepositResponse {
            transaction: tx.into(),
            wallet: wallet.map(WalletResponse::from),
        })
    }

    async fn credit_wallet(
        &self,
        txn: &DatabaseTransaction,
        tx: &transactions::Model,
    ) -> AppResult<wallets::Model> {
        let now = Utc::now();
        let amount = tx.amount();
        ensure_wallet(txn, tx.user_id).await?;

        let (wallet_col, admin_col) = match tx.currency {
            Currency::Usd => (wallets::Column::BalanceUsd, admin_wallet::Column::TotalReceivedUsd),
            Currency::Pkr => (wallets::Column::BalancePkr, admin_wallet::Column::TotalReceivedPkr),
        };

        wallets::Entity::update_many()
            .col_expr(wallet_col, Expr::col(wallet_col).add(amount))
            .col_expr(wallets::Column::UpdatedAt, Expr::value(now))
            .filter(wallets::Column::UserId.eq(tx.user_id))
            .exec(txn)
            .await?;

        let wallet = wallets::Entity::find_by_id(tx.user_id)
            .one(txn)
            .await?
            .ok_or_else(|| AppError::InternalError("Wallet disappeared during credit".to_string()))?;

        if admin_wallet::Entity::find_by_id(admin_wallet::SINGLETON_ID)
            .one(txn)
            .await?
            .is_none()
        {
            admin_wallet::ActiveModel {
                id: Set(admin_wallet::SINGLETON_ID),
                total_received_usd: Set(0),
                total_received_pkr: Set(0),
                updated_at: Set(Some(now)),
            }
            .insert(txn)
            .await?;
        }

        admin_wallet::Entity::update_many()
            .col_expr(admin_col, Expr::col(admin_col).add(amount))
            .col_expr(admin_wallet::Column::UpdatedAt, Expr::value(now))
            .filter(admin_wallet::Column::Id.eq(admin_wallet::SINGLETON_ID))
            .exec(txn)
            .await?;

        Ok(wallet)
    }

    pub async fn stats(&self) -> AppResult<AdminStatsResponse> {
        let pending_deposits = transactions::Entity::find()
            .filter(transactions::Column::TxType.eq(TransactionType::Deposit))
            .filter(transactions::Column::Status.eq(TransactionStatus::Pending))
            .count(self.pool.as_ref())
            .await? as i64;
        let pending_enrollments = enrollments::Entity::find()
            .filter(enrollments::Column::Status.eq(EnrollmentStatus::Pending))
            .count(self.pool.as_ref())
            .await? as i64;
        let total_users = users::Entity::find().count(self.pool.as_ref()).await? as i64;
        let totals = admin_wallet::Entity::find_by_id(admin_wallet::SINGLETON_ID)
            .one(self.pool.as_ref())
            .await?;

        Ok(AdminStatsResponse {
            pending_deposits,
            pending_enrollments,
            total_users,
            total_received_usd: totals.as_ref().map(|t| t.total_received_usd).unwrap_or(0),
            total_received_pkr: totals.as_ref().map(|t| t.total_received_pkr).unwrap_or(0),
            updated_at: totals.and_then(|t| t.updated_at),
        })
    }

    pub async fn list_enrollments(
        &self,
        query: &AdminEnrollmentQuery,
    ) -> AppResult<PaginatedResponse<EnrollmentResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut base = enrollments::Entity::find();
        if let Some(status) = query.status {
            base = base.filter(enrollments::Column::Status.eq(status));
        }

        let total = base.clone().count(self.pool.as_ref()).await? as i64;
        let rows = base
            .order_by_desc(enrollments::Column::CreatedAt)
            .limit(params.get_limit())
            .offset(params.get_offset())
            .all(self.pool.as_ref())
            .await?;

        let titles: HashMap<i64, String> = courses::Entity::find()
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(|c| (c.id, c.title))
            .collect();

        let items = rows
            .into_iter()
            .map(|e| {
                let title = titles.get(&e.course_id).cloned();
                EnrollmentResponse::new(e, title)
            })
            .collect();

        Ok(PaginatedResponse::new(items, &params, total))
    }

    pub async fn update_enrollment(
        &self,
        enrollment_id: i64,
        status: EnrollmentStatus,
    ) -> AppResult<EnrollmentResponse> {
        if status == EnrollmentStatus::Pending {
            return Err(AppError::ValidationError(
                "Enrollment can only be set to active or rejected".to_string(),
            ));
        }

        let existing = enrollments::Entity::find_by_id(enrollment_id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Enrollment not found".to_string()))?;

        let mut model = existing.into_active_model();
        model.status = Set(status);
        model.updated_at = Set(Some(Utc::now()));
        let updated = model.update(self.pool.as_ref()).await?;

        let title = courses::Entity::find_by_id(updated.course_id)
            .one(self.pool.as_ref())
            .await?
            .map(|c| c.title);

        Ok(EnrollmentResponse::new(updated, title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::entities::PaymentMethod;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn storage() -> ObjectStorageService {
        ObjectStorageService::new(StorageConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            service_key: "k".to_string(),
            bucket: "payment-proofs".to_string(),
            signed_url_expires_in: 600,
        })
    }

    fn deposit(id: i64, status: TransactionStatus) -> transactions::Model {
        transactions::Model {
            id,
            user_id: 7,
            tx_type: TransactionType::Deposit,
            amount_usd: 2500,
            amount_pkr: 0,
            currency: Currency::Usd,
            payment_method: Some(PaymentMethod::Binance),
            status,
            screenshot_url: None,
            description: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn wallet(balance_usd: i64) -> wallets::Model {
        wallets::Model {
            user_id: 7,
            balance_usd,
            balance_pkr: 0,
            created_at: None,
            updated_at: None,
        }
    }

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    #[tokio::test]
    async fn test_approve_credits_wallet_once() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // 条件更新 pending → completed
            .append_exec_results([exec(1)])
            .append_query_results([vec![deposit(1, TransactionStatus::Completed)]])
            // ensure_wallet
            .append_query_results([vec![wallet(1000)]])
            .append_exec_results([exec(1)])
            .append_query_results([vec![wallet(3500)]])
            .append_query_results([vec![admin_wallet::Model {
                id: 1,
                total_received_usd: 0,
                total_received_pkr: 0,
                updated_at: None,
            }]])
            .append_exec_results([exec(1)])
            .into_connection();
        let svc = AdminService::new(Arc::new(db), storage());

        let resp = svc.approve_deposit(99, 1, true).await.unwrap();
        assert_eq!(resp.transaction.status, TransactionStatus::Completed);
        assert_eq!(resp.wallet.unwrap().balance_usd, 3500);
        assert!(svc.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_already_reviewed_deposit_is_conflict() {
        // 条件更新未命中；若继续入账会因缺少 mock 结果而报数据库错误
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .append_query_results([vec![deposit(1, TransactionStatus::Completed)]])
            .into_connection();
        let svc = AdminService::new(Arc::new(db), storage());

        let err = svc.approve_deposit(99, 1, true).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(svc.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_deposit_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(0)])
            .append_query_results([Vec::<transactions::Model>::new()])
            .into_connection();
        let svc = AdminService::new(Arc::new(db), storage());

        let err = svc.approve_deposit(99, 404, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_review_of_same_row_is_rejected() {
        let svc = AdminService::new(
            Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection()),
            storage(),
        );
        let _first = svc.begin_review(5).unwrap();

        let err = svc.approve_deposit(99, 5, true).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        // 第一个审核仍持有占用
        assert!(svc.in_flight.lock().unwrap().contains(&5));
    }

    #[tokio::test]
    async fn test_reject_does_not_touch_wallet() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .append_query_results([vec![deposit(2, TransactionStatus::Cancelled)]])
            .into_connection();
        let svc = AdminService::new(Arc::new(db), storage());

        let resp = svc.approve_deposit(99, 2, false).await.unwrap();
        assert_eq!(resp.transaction.status, TransactionStatus::Cancelled);
        assert!(resp.wallet.is_none());
    }

    #[tokio::test]
    async fn test_ensure_admin_requires_role_and_aal2() {
        let role = user_roles_model(AppRole::Admin);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![role.clone()]])
            .append_query_results([vec![role]])
            .append_query_results([Vec::<crate::entities::user_roles::Model>::new()])
            .into_connection();
        let svc = AdminService::new(Arc::new(db), storage());

        assert!(svc.ensure_admin(1, AssuranceLevel::Aal2).await.is_ok());
        assert!(matches!(
            svc.ensure_admin(1, AssuranceLevel::Aal1).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.ensure_admin(2, AssuranceLevel::Aal2).await,
            Err(AppError::Forbidden(_))
        ));
    }

    fn user_roles_model(role: AppRole) -> crate::entities::user_roles::Model {
        crate::entities::user_roles::Model {
            id: 1,
            user_id: 1,
            role,
            created_at: None,
        }
    }
}
