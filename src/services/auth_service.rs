use crate::entities::{
    AppRole, FactorStatus, mfa_factor_entity as factors, profile_entity as profiles,
    user_entity as users, user_role_entity as user_roles, user_wallet_entity as wallets,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::user_service::{has_role, roles_of};
use crate::utils::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthService {
    pool: Arc<DatabaseConnection>,
    jwt_service: JwtService,
    admin_emails: Vec<String>,
}

impl AuthService {
    pub fn new(pool: Arc<DatabaseConnection>, jwt_service: JwtService) -> Self {
        Self {
            pool,
            jwt_service,
            admin_emails: Vec::new(),
        }
    }

    /// 配置中的管理员邮箱（比较时忽略大小写）
    pub fn with_admin_emails(mut self, emails: &[String]) -> Self {
        self.admin_emails = emails
            .iter()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    fn is_bootstrap_admin(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }

    /// 启动时给已注册的配置邮箱补上 admin 角色，返回新授予的数量
    pub async fn bootstrap_admins(&self) -> AppResult<usize> {
        let mut granted = 0;
        for email in &self.admin_emails {
            let Some(user) = users::Entity::find()
                .filter(users::Column::Email.eq(email.clone()))
                .one(self.pool.as_ref())
                .await?
            else {
                log::info!("Admin bootstrap: {email} has not registered yet");
                continue;
            };
            if has_role(self.pool.as_ref(), user.id, AppRole::Admin).await? {
                continue;
            }

            user_roles::ActiveModel {
                user_id: Set(user.id),
                role: Set(AppRole::Admin),
                created_at: Set(Some(Utc::now())),
                ..Default::default()
            }
            .insert(self.pool.as_ref())
            .await?;
            log::warn!("Admin role granted from config: user_id={}", user.id);
            granted += 1;
        }
        Ok(granted)
    }

    /// 注册：同时创建资料、普通用户角色和空钱包
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_password(&request.password, &email)?;

        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.clone()))
            .one(self.pool.as_ref())
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();
        let is_admin = self.is_bootstrap_admin(&email);

        let txn = self.pool.begin().await?;

        let user = users::ActiveModel {
            email: Set(email),
            password_hash: Set(password_hash),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let profile = profiles::ActiveModel {
            user_id: Set(user.id),
            full_name: Set(request.full_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())),
            phone: Set(request.phone),
            avatar_url: Set(None),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        user_roles::ActiveModel {
            user_id: Set(user.id),
            role: Set(AppRole::User),
            created_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut roles = vec![AppRole::User];
        if is_admin {
            user_roles::ActiveModel {
                user_id: Set(user.id),
                role: Set(AppRole::Admin),
                created_at: Set(Some(now)),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            roles.push(AppRole::Admin);
        }

        wallets::ActiveModel {
            user_id: Set(user.id),
            balance_usd: Set(0),
            balance_pkr: Set(0),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        if is_admin {
            log::warn!("Admin role granted from config: user_id={}", user.id);
        }
        log::info!("User registered: id={}", user.id);

        let user_response = UserResponse::from_parts(user, Some(profile), roles);
        self.build_auth_response(user_response, AssuranceLevel::Aal1, false)
    }

    /// 密码登录只签发 aal1；已绑定 TOTP 的用户需要继续 MFA 验证
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = request.email.trim().to_lowercase();

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::AuthError("Invalid email or password".to_string()));
        }

        let mfa_required = self.has_verified_factor(user.id).await?;

        let profile = profiles::Entity::find_by_id(user.id).one(self.pool.as_ref()).await?;
        let roles = roles_of(self.pool.as_ref(), user.id).await?;
        let user_response = UserResponse::from_parts(user, profile, roles);

        self.build_auth_response(user_response, AssuranceLevel::Aal1, mfa_required)
    }

    /// 刷新令牌沿用原有的 aal；已无验证过的因子时降为 aal1
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid refresh token".to_string()))?;

        let user = users::Entity::find_by_id(user_id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;
        let profile = profiles::Entity::find_by_id(user.id).one(self.pool.as_ref()).await?;
        let roles = roles_of(self.pool.as_ref(), user.id).await?;
        let user_response = UserResponse::from_parts(user, profile, roles);

        let aal = if claims.aal >= AssuranceLevel::Aal2
            && !self.has_verified_factor(user_response.id).await?
        {
            log::info!("User {} has no verified factor left, refreshing at aal1", user_response.id);
            AssuranceLevel::Aal1
        } else {
            claims.aal
        };

        self.build_auth_response(user_response, aal, false)
    }

    async fn has_verified_factor(&self, user_id: i64) -> AppResult<bool> {
        Ok(factors::Entity::find()
            .filter(factors::Column::UserId.eq(user_id))
            .filter(factors::Column::Status.eq(FactorStatus::Verified))
            .one(self.pool.as_ref())
            .await?
            .is_some())
    }

    fn build_auth_response(
        &self,
        user: UserResponse,
        aal: AssuranceLevel,
        mfa_required: bool,
    ) -> AppResult<AuthResponse> {
        let access_token = self
            .jwt_service
            .generate_access_token(user.id, &user.email, aal)?;
        let refresh_token = self
            .jwt_service
            .generate_refresh_token(user.id, &user.email, aal)?;

        Ok(AuthResponse {
            user,
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
            aal,
            mfa_required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn jwt() -> JwtService {
        JwtService::new("test-secret", 3600, 7200)
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![users::Model {
                id: 1,
                email: "taken@example.com".to_string(),
                password_hash: "x".to_string(),
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let service = AuthService::new(Arc::new(db), jwt());

        let err = service
            .register(RegisterRequest {
                email: "Taken@Example.com".to_string(),
                password: "Password123".to_string(),
                full_name: None,
                phone: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_login_with_wrong_password_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![users::Model {
                id: 1,
                email: "a@example.com".to_string(),
                password_hash: hash_password("Password123").unwrap(),
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let service = AuthService::new(Arc::new(db), jwt());

        let err = service
            .login(LoginRequest {
                email: "a@example.com".to_string(),
                password: "Wrong12345".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_refresh_keeps_assurance_level() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![users::Model {
                id: 9,
                email: "admin@example.com".to_string(),
                password_hash: "x".to_string(),
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([Vec::<profiles::Model>::new()])
            .append_query_results([vec![user_roles::Model {
                id: 1,
                user_id: 9,
                role: AppRole::Admin,
                created_at: None,
            }]])
            .append_query_results([vec![verified_factor(9)]])
            .into_connection();
        let jwt = jwt();
        let token = jwt
            .generate_refresh_token(9, "admin@example.com", AssuranceLevel::Aal2)
            .unwrap();
        let service = AuthService::new(Arc::new(db), jwt.clone());

        let resp = service.refresh_token(&token).await.unwrap();
        assert_eq!(resp.aal, AssuranceLevel::Aal2);
        assert!(resp.user.is_admin());
        let claims = jwt.verify_access_token(&resp.access_token).unwrap();
        assert_eq!(claims.aal, AssuranceLevel::Aal2);
    }

    #[tokio::test]
    async fn test_refresh_downgrades_to_aal1_without_verified_factor() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![users::Model {
                id: 9,
                email: "admin@example.com".to_string(),
                password_hash: "x".to_string(),
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([Vec::<profiles::Model>::new()])
            .append_query_results([Vec::<user_roles::Model>::new()])
            .append_query_results([Vec::<factors::Model>::new()])
            .into_connection();
        let jwt = jwt();
        let token = jwt
            .generate_refresh_token(9, "admin@example.com", AssuranceLevel::Aal2)
            .unwrap();
        let service = AuthService::new(Arc::new(db), jwt.clone());

        let resp = service.refresh_token(&token).await.unwrap();
        assert_eq!(resp.aal, AssuranceLevel::Aal1);
        let claims = jwt.verify_refresh_token(&resp.refresh_token).unwrap();
        assert_eq!(claims.aal, AssuranceLevel::Aal1);
    }

    fn verified_factor(user_id: i64) -> factors::Model {
        factors::Model {
            id: uuid::Uuid::new_v4(),
            user_id,
            factor_type: crate::entities::FactorType::Totp,
            friendly_name: None,
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            status: FactorStatus::Verified,
            created_at: None,
            updated_at: None,
        }
    }

    fn user(id: i64, email: &str) -> users::Model {
        users::Model {
            id,
            email: email.to_string(),
            password_hash: "x".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn role(user_id: i64, role: AppRole) -> user_roles::Model {
        user_roles::Model {
            id: user_id * 10,
            user_id,
            role,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_register_grants_admin_to_configured_email() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .append_query_results([vec![user(3, "owner@example.com")]])
            .append_query_results([vec![profiles::Model {
                user_id: 3,
                full_name: None,
                phone: None,
                avatar_url: None,
                created_at: None,
                updated_at: None,
            }]])
            .append_query_results([vec![role(3, AppRole::User)]])
            .append_query_results([vec![role(3, AppRole::Admin)]])
            .append_query_results([vec![wallets::Model {
                user_id: 3,
                balance_usd: 0,
                balance_pkr: 0,
                created_at: None,
                updated_at: None,
            }]])
            .into_connection();
        let service = AuthService::new(Arc::new(db), jwt())
            .with_admin_emails(&[" Owner@Example.com ".to_string()]);

        let response = service
            .register(RegisterRequest {
                email: "owner@example.com".to_string(),
                password: "Password123".to_string(),
                full_name: None,
                phone: None,
            })
            .await
            .unwrap();
        assert!(response.user.is_admin());
        assert_eq!(response.aal, AssuranceLevel::Aal1);
    }

    #[test]
    fn test_unlisted_email_is_not_bootstrap_admin() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let service = AuthService::new(Arc::new(db), jwt())
            .with_admin_emails(&["owner@example.com".to_string(), "  ".to_string()]);

        assert!(service.is_bootstrap_admin("owner@example.com"));
        assert!(!service.is_bootstrap_admin("someone@example.com"));
        assert!(!service.is_bootstrap_admin(""));
    }

    #[tokio::test]
    async fn test_bootstrap_admins_grants_registered_users_once() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // owner：已注册，尚无 admin 角色
            .append_query_results([vec![user(3, "owner@example.com")]])
            .append_query_results([Vec::<user_roles::Model>::new()])
            .append_query_results([vec![role(3, AppRole::Admin)]])
            // ops：已是管理员
            .append_query_results([vec![user(4, "ops@example.com")]])
            .append_query_results([vec![role(4, AppRole::Admin)]])
            // later：尚未注册
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();
        let service = AuthService::new(Arc::new(db), jwt()).with_admin_emails(&[
            "owner@example.com".to_string(),
            "ops@example.com".to_string(),
            "later@example.com".to_string(),
        ]);

        assert_eq!(service.bootstrap_admins().await.unwrap(), 1);
    }
}
