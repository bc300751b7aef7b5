use crate::config::MfaConfig;
use crate::entities::{
    AppRole, FactorStatus, FactorType, admin_security_entity as admin_security,
    mfa_challenge_entity as challenges, mfa_factor_entity as factors,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::user_service::has_role;
use crate::utils::totp;
use crate::utils::*;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

/// 根据计数与锁定时间计算当前锁定状态
///
/// 锁定已过期视为计数清零。
pub fn lockout_status(
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> LockoutStatusResponse {
    match locked_until {
        Some(until) if until > now => LockoutStatusResponse {
            is_locked: true,
            locked_until: Some(until),
            failed_attempts,
            remaining_attempts: 0,
            retry_after_seconds: (until - now).num_seconds().max(0),
        },
        Some(_) => LockoutStatusResponse {
            is_locked: false,
            locked_until: None,
            failed_attempts: 0,
            remaining_attempts: max_attempts,
            retry_after_seconds: 0,
        },
        None => LockoutStatusResponse {
            is_locked: false,
            locked_until: None,
            failed_attempts,
            remaining_attempts: (max_attempts - failed_attempts).max(0),
            retry_after_seconds: 0,
        },
    }
}

/// 记录一次失败后的 (计数, 锁定截止时间)
pub fn next_failure_state(
    failed_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_attempts: i32,
    lockout_minutes: i64,
) -> (i32, Option<DateTime<Utc>>) {
    let base = match locked_until {
        Some(until) if until <= now => 0,
        _ => failed_attempts,
    };
    let attempts = base + 1;
    if attempts >= max_attempts {
        (attempts, Some(now + Duration::minutes(lockout_minutes)))
    } else {
        (attempts, None)
    }
}

#[derive(Clone)]
pub struct MfaService {
    pool: Arc<DatabaseConnection>,
    jwt_service: JwtService,
    cfg: MfaConfig,
}

impl MfaService {
    pub fn new(pool: Arc<DatabaseConnection>, jwt_service: JwtService, cfg: MfaConfig) -> Self {
        Self {
            pool,
            jwt_service,
            cfg,
        }
    }

    /// 创建未验证的 TOTP 因子；重新绑定时清理旧的未验证因子
    pub async fn enroll(
        &self,
        user_id: i64,
        email: &str,
        request: EnrollRequest,
    ) -> AppResult<EnrollResponse> {
        let verified = factors::Entity::find()
            .filter(factors::Column::UserId.eq(user_id))
            .filter(factors::Column::FactorType.eq(FactorType::Totp))
            .filter(factors::Column::Status.eq(FactorStatus::Verified))
            .one(self.pool.as_ref())
            .await?;
        if verified.is_some() {
            return Err(AppError::Conflict(
                "A verified authenticator is already enrolled".to_string(),
            ));
        }

        factors::Entity::delete_many()
            .filter(factors::Column::UserId.eq(user_id))
            .filter(factors::Column::Status.eq(FactorStatus::Unverified))
            .exec(self.pool.as_ref())
            .await?;

        let secret = totp::generate_secret();
        let now = Utc::now();
        let factor = factors::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            factor_type: Set(FactorType::Totp),
            friendly_name: Set(request.friendly_name.filter(|n| !n.trim().is_empty())),
            secret: Set(secret.clone()),
            status: Set(FactorStatus::Unverified),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
        }
        .insert(self.pool.as_ref())
        .await?;

        let uri = totp::otpauth_uri(&self.cfg.issuer, email, &secret);

        Ok(EnrollResponse {
            id: factor.id,
            factor_type: factor.factor_type,
            totp: TotpEnrollment {
                qr_code: uri.clone(),
                secret,
                uri,
            },
        })
    }

    pub async fn challenge(&self, user_id: i64, factor_id: Uuid) -> AppResult<ChallengeResponse> {
        self.find_factor(user_id, factor_id).await?;

        let now = Utc::now();
        let challenge = challenges::ActiveModel {
            id: Set(Uuid::new_v4()),
            factor_id: Set(factor_id),
            created_at: Set(Some(now)),
            expires_at: Set(now + Duration::seconds(self.cfg.challenge_ttl_secs)),
            verified_at: Set(None),
            failed_attempts: Set(0),
        }
        .insert(self.pool.as_ref())
        .await?;

        Ok(ChallengeResponse {
            id: challenge.id,
            expires_at: challenge.expires_at,
        })
    }

    /// 校验验证码；成功后签发 aal2 令牌
    pub async fn verify(
        &self,
        user_id: i64,
        email: &str,
        request: VerifyRequest,
    ) -> AppResult<VerifyResponse> {
        let code = sanitize_otp_code(&request.code);
        if code.len() != totp::TOTP_DIGITS as usize {
            return Err(AppError::ValidationError(
                "Verification code must be 6 digits".to_string(),
            ));
        }

        let is_admin = has_role(self.pool.as_ref(), user_id, AppRole::Admin).await?;
        if is_admin {
            let status = self.check_admin_lockout(user_id).await?;
            if status.is_locked {
                return Err(locked_error(&status));
            }
        }

        let factor = self.find_factor(user_id, request.factor_id).await?;
        let now = Utc::now();
        let challenge = challenges::Entity::find_by_id(request.challenge_id)
            .filter(challenges::Column::FactorId.eq(factor.id))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Challenge not found".to_string()))?;
        if challenge.is_exhausted() {
            return Err(challenge_exhausted_error());
        }
        if !challenge.is_usable(now) {
            return Err(AppError::ValidationError(
                "Challenge has expired, please request a new one".to_string(),
            ));
        }

        if !totp::verify_code(&factor.secret, &code, now.timestamp().max(0) as u64) {
            let challenge_left = self.record_challenge_failure(&challenge).await?;
            if is_admin {
                let status = self.record_failed_2fa_attempt(user_id).await?;
                if status.is_locked {
                    return Err(locked_error(&status));
                }
                return Err(AppError::AuthError(format!(
                    "Invalid verification code. {} attempts remaining",
                    status.remaining_attempts
                )));
            }
            if challenge_left == 0 {
                return Err(challenge_exhausted_error());
            }
            return Err(AppError::AuthError("Invalid verification code".to_string()));
        }

        let first_verification = factor.status == FactorStatus::Unverified;

        let txn = self.pool.begin().await?;
        let used = challenges::Entity::update_many()
            .col_expr(challenges::Column::VerifiedAt, Expr::value(now))
            .filter(challenges::Column::Id.eq(challenge.id))
            .filter(challenges::Column::VerifiedAt.is_null())
            .filter(challenges::Column::FailedAttempts.lt(challenges::MAX_CHALLENGE_ATTEMPTS))
            .exec(&txn)
            .await?;
        if used.rows_affected == 0 {
            return Err(AppError::Conflict("Challenge has already been used".to_string()));
        }
        if first_verification {
            let mut model = factor.into_active_model();
            model.status = Set(FactorStatus::Verified);
            model.updated_at = Set(Some(now));
            model.update(&txn).await?;
        }
        txn.commit().await?;

        if is_admin {
            self.mark_admin_mfa_enrolled(user_id).await?;
        }

        let aal = AssuranceLevel::Aal2;
        let access_token = self.jwt_service.generate_access_token(user_id, email, aal)?;
        let refresh_token = self.jwt_service.generate_refresh_token(user_id, email, aal)?;

        Ok(VerifyResponse {
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
            aal,
            backup_codes: first_verification.then(|| generate_backup_codes(BACKUP_CODE_COUNT)),
        })
    }

    pub async fn list_factors(&self, user_id: i64) -> AppResult<FactorListResponse> {
        let all: Vec<FactorResponse> = factors::Entity::find()
            .filter(factors::Column::UserId.eq(user_id))
            .order_by_asc(factors::Column::CreatedAt)
            .all(self.pool.as_ref())
            .await?
            .into_iter()
            .map(FactorResponse::from)
            .collect();
        let totp = all
            .iter()
            .filter(|f| f.factor_type == FactorType::Totp && f.status == FactorStatus::Verified)
            .cloned()
            .collect();

        Ok(FactorListResponse { all, totp })
    }

    pub async fn assurance_level(
        &self,
        user_id: i64,
        current: AssuranceLevel,
    ) -> AppResult<AalResponse> {
        let has_verified = factors::Entity::find()
            .filter(factors::Column::UserId.eq(user_id))
            .filter(factors::Column::Status.eq(FactorStatus::Verified))
            .one(self.pool.as_ref())
            .await?
            .is_some();

        Ok(AalResponse {
            current_level: current,
            next_level: if has_verified {
                AssuranceLevel::Aal2
            } else {
                AssuranceLevel::Aal1
            },
        })
    }

    /// 解绑因子；已验证的因子只能在 aal2 会话中解绑
    pub async fn unenroll(
        &self,
        user_id: i64,
        aal: AssuranceLevel,
        factor_id: Uuid,
    ) -> AppResult<()> {
        let factor = self.find_factor(user_id, factor_id).await?;
        if factor.status == FactorStatus::Verified && aal < AssuranceLevel::Aal2 {
            return Err(AppError::Forbidden(
                "Verify with your authenticator before removing it".to_string(),
            ));
        }

        factors::Entity::delete_by_id(factor.id)
            .exec(self.pool.as_ref())
            .await?;

        let remaining_verified = factors::Entity::find()
            .filter(factors::Column::UserId.eq(user_id))
            .filter(factors::Column::Status.eq(FactorStatus::Verified))
            .one(self.pool.as_ref())
            .await?;
        if remaining_verified.is_none() {
            admin_security::Entity::update_many()
                .col_expr(admin_security::Column::MfaEnrolled, Expr::value(false))
                .col_expr(admin_security::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(admin_security::Column::UserId.eq(user_id))
                .exec(self.pool.as_ref())
                .await?;
        }

        log::info!("MFA factor {factor_id} removed for user {user_id}");
        Ok(())
    }

    pub async fn check_admin_lockout(&self, user_id: i64) -> AppResult<LockoutStatusResponse> {
        let row = admin_security::Entity::find_by_id(user_id)
            .one(self.pool.as_ref())
            .await?;
        let now = Utc::now();
        Ok(match row {
            Some(r) => lockout_status(
                r.failed_attempts,
                r.locked_until,
                now,
                self.cfg.max_failed_attempts,
            ),
            None => lockout_status(0, None, now, self.cfg.max_failed_attempts),
        })
    }

    /// 失败计数 +1，达到上限后锁定
    pub async fn record_failed_2fa_attempt(&self, user_id: i64) -> AppResult<LockoutStatusResponse> {
        let now = Utc::now();
        let txn = self.pool.begin().await?;

        ensure_security_row(&txn, user_id).await?;
        let row = admin_security::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::InternalError("Security row missing".to_string()))?;

        let (attempts, locked_until) = next_failure_state(
            row.failed_attempts,
            row.locked_until,
            now,
            self.cfg.max_failed_attempts,
            self.cfg.lockout_minutes,
        );

        let mut model = row.into_active_model();
        model.failed_attempts = Set(attempts);
        model.locked_until = Set(locked_until);
        model.last_failed_at = Set(Some(now));
        model.updated_at = Set(Some(now));
        model.update(&txn).await?;
        txn.commit().await?;

        if locked_until.is_some() {
            log::warn!("Admin {user_id} locked out after {attempts} failed 2FA attempts");
        }

        Ok(lockout_status(
            attempts,
            locked_until,
            now,
            self.cfg.max_failed_attempts,
        ))
    }

    /// 标记管理员已绑定 MFA，并清零失败计数
    pub async fn mark_admin_mfa_enrolled(&self, user_id: i64) -> AppResult<()> {
        ensure_security_row(self.pool.as_ref(), user_id).await?;
        admin_security::Entity::update_many()
            .col_expr(admin_security::Column::MfaEnrolled, Expr::value(true))
            .col_expr(admin_security::Column::FailedAttempts, Expr::value(0))
            .col_expr(
                admin_security::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(admin_security::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(admin_security::Column::UserId.eq(user_id))
            .exec(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// 清理已使用或过期超过一天的挑战
    pub async fn purge_stale_challenges(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::days(1);
        let result = challenges::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(challenges::Column::VerifiedAt.is_not_null())
                    .add(challenges::Column::ExpiresAt.lt(cutoff)),
            )
            .exec(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected)
    }

    /// 挑战错误次数 +1，返回剩余次数
    async fn record_challenge_failure(&self, challenge: &challenges::Model) -> AppResult<i32> {
        challenges::Entity::update_many()
            .col_expr(
                challenges::Column::FailedAttempts,
                Expr::col(challenges::Column::FailedAttempts).add(1),
            )
            .filter(challenges::Column::Id.eq(challenge.id))
            .exec(self.pool.as_ref())
            .await?;
        Ok((challenges::MAX_CHALLENGE_ATTEMPTS - challenge.failed_attempts - 1).max(0))
    }

    async fn find_factor(&self, user_id: i64, factor_id: Uuid) -> AppResult<factors::Model> {
        factors::Entity::find_by_id(factor_id)
            .filter(factors::Column::UserId.eq(user_id))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("Factor not found".to_string()))
    }
}

async fn ensure_security_row<C: ConnectionTrait>(db: &C, user_id: i64) -> Result<(), DbErr> {
    if admin_security::Entity::find_by_id(user_id).one(db).await?.is_none() {
        admin_security::ActiveModel {
            user_id: Set(user_id),
            mfa_enrolled: Set(false),
            failed_attempts: Set(0),
            locked_until: Set(None),
            last_failed_at: Set(None),
            updated_at: Set(Some(Utc::now())),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

fn locked_error(status: &LockoutStatusResponse) -> AppError {
    AppError::TooManyRequests(format!(
        "Too many failed attempts. Try again in {} seconds",
        status.retry_after_seconds
    ))
}

fn challenge_exhausted_error() -> AppError {
    AppError::ValidationError("Too many attempts, please request a new code".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fifth_failure_locks_for_fifteen_minutes() {
        let mut attempts = 0;
        let mut locked = None;
        for i in 0..4 {
            (attempts, locked) = next_failure_state(attempts, locked, at(i), 5, 15);
            assert!(locked.is_none());
        }
        assert_eq!(attempts, 4);
        assert_eq!(lockout_status(attempts, locked, at(4), 5).remaining_attempts, 1);

        (attempts, locked) = next_failure_state(attempts, locked, at(10), 5, 15);
        assert_eq!(attempts, 5);
        assert_eq!(locked, Some(at(10) + Duration::minutes(15)));
    }

    #[test]
    fn test_retry_after_counts_down_to_zero() {
        let until = Some(at(900));
        let s = lockout_status(5, until, at(0), 5);
        assert!(s.is_locked);
        assert_eq!(s.retry_after_seconds, 900);
        assert_eq!(lockout_status(5, until, at(300), 5).retry_after_seconds, 600);
        assert_eq!(lockout_status(5, until, at(899), 5).retry_after_seconds, 1);

        let expired = lockout_status(5, until, at(900), 5);
        assert!(!expired.is_locked);
        assert_eq!(expired.retry_after_seconds, 0);
        assert_eq!(expired.remaining_attempts, 5);
    }

    #[test]
    fn test_failure_after_expired_lock_starts_fresh() {
        let (attempts, locked) = next_failure_state(5, Some(at(0)), at(60), 5, 15);
        assert_eq!(attempts, 1);
        assert!(locked.is_none());
    }

    fn service(db: DatabaseConnection) -> MfaService {
        MfaService::new(Arc::new(db), JwtService::new("s", 60, 120), MfaConfig::default())
    }

    #[tokio::test]
    async fn test_verify_rejects_short_code_before_database() {
        let svc = service(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let err = svc
            .verify(
                1,
                "a@example.com",
                VerifyRequest {
                    factor_id: Uuid::new_v4(),
                    challenge_id: Uuid::new_v4(),
                    code: "12-34a".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_locked_admin_cannot_verify() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![crate::entities::user_roles::Model {
                id: 1,
                user_id: 1,
                role: AppRole::Admin,
                created_at: None,
            }]])
            .append_query_results([vec![admin_security::Model {
                user_id: 1,
                mfa_enrolled: true,
                failed_attempts: 5,
                locked_until: Some(Utc::now() + Duration::minutes(10)),
                last_failed_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .verify(
                1,
                "admin@example.com",
                VerifyRequest {
                    factor_id: Uuid::new_v4(),
                    challenge_id: Uuid::new_v4(),
                    code: "123456".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn test_enroll_returns_otpauth_uri() {
        let id = Uuid::new_v4();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<factors::Model>::new()])
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![factors::Model {
                id,
                user_id: 1,
                factor_type: FactorType::Totp,
                friendly_name: None,
                secret: "JBSWY3DPEHPK3PXP".to_string(),
                status: FactorStatus::Unverified,
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let svc = service(db);

        let resp = svc
            .enroll(1, "a@example.com", EnrollRequest::default())
            .await
            .unwrap();
        assert_eq!(resp.id, id);
        assert!(resp.totp.uri.starts_with("otpauth://totp/Storefront%3Aa%40example.com?"));
        assert!(resp.totp.uri.contains(&format!("secret={}", resp.totp.secret)));
        assert_eq!(resp.totp.qr_code, resp.totp.uri);
    }

    fn verified_factor(id: Uuid) -> factors::Model {
        factors::Model {
            id,
            user_id: 1,
            factor_type: FactorType::Totp,
            friendly_name: None,
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            status: FactorStatus::Verified,
            created_at: None,
            updated_at: None,
        }
    }

    fn open_challenge(id: Uuid, factor_id: Uuid, failed_attempts: i32) -> challenges::Model {
        let now = Utc::now();
        challenges::Model {
            id,
            factor_id,
            created_at: Some(now),
            expires_at: now + Duration::minutes(5),
            verified_at: None,
            failed_attempts,
        }
    }

    fn wrong_code_for_now() -> String {
        let now = Utc::now().timestamp() as u64;
        let mut n = 0u32;
        loop {
            let code = format!("{n:06}");
            if !totp::verify_code("JBSWY3DPEHPK3PXP", &code, now) {
                return code;
            }
            n += 1;
        }
    }

    #[tokio::test]
    async fn test_last_wrong_code_exhausts_challenge() {
        let (factor_id, challenge_id) = (Uuid::new_v4(), Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<crate::entities::user_roles::Model>::new()])
            .append_query_results([vec![verified_factor(factor_id)]])
            .append_query_results([vec![open_challenge(
                challenge_id,
                factor_id,
                challenges::MAX_CHALLENGE_ATTEMPTS - 1,
            )]])
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = service(db);

        let err = svc
            .verify(
                1,
                "user@example.com",
                VerifyRequest {
                    factor_id,
                    challenge_id,
                    code: wrong_code_for_now(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("request a new code")));
    }

    #[tokio::test]
    async fn test_earlier_wrong_code_keeps_challenge_open() {
        let (factor_id, challenge_id) = (Uuid::new_v4(), Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<crate::entities::user_roles::Model>::new()])
            .append_query_results([vec![verified_factor(factor_id)]])
            .append_query_results([vec![open_challenge(challenge_id, factor_id, 0)]])
            .append_exec_results([sea_orm::MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let svc = service(db);

        let err = svc
            .verify(
                1,
                "user@example.com",
                VerifyRequest {
                    factor_id,
                    challenge_id,
                    code: wrong_code_for_now(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_exhausted_challenge_rejects_even_before_checking_code() {
        let (factor_id, challenge_id) = (Uuid::new_v4(), Uuid::new_v4());
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<crate::entities::user_roles::Model>::new()])
            .append_query_results([vec![verified_factor(factor_id)]])
            .append_query_results([vec![open_challenge(
                challenge_id,
                factor_id,
                challenges::MAX_CHALLENGE_ATTEMPTS,
            )]])
            .into_connection();
        let svc = service(db);

        let err = svc
            .verify(
                1,
                "user@example.com",
                VerifyRequest {
                    factor_id,
                    challenge_id,
                    code: "123456".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("request a new code")));
    }
}
