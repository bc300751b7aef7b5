use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{AppRole, profile_entity, user_entity};
use crate::utils::AssuranceLevel;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
    #[schema(example = "Ali Khan")]
    pub full_name: Option<String>,
    #[schema(example = "+923001234567")]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Password123")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[schema(example = "Ali Khan")]
    pub full_name: Option<String>,
    #[schema(example = "+923001234567")]
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<AppRole>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UserResponse {
    pub fn from_parts(
        user: user_entity::Model,
        profile: Option<profile_entity::Model>,
        roles: Vec<AppRole>,
    ) -> Self {
        let (full_name, phone, avatar_url) = match profile {
            Some(p) => (p.full_name, p.phone, p.avatar_url),
            None => (None, None, None),
        };
        Self {
            id: user.id,
            email: user.email,
            full_name,
            phone,
            avatar_url,
            roles,
            created_at: user.created_at,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&AppRole::Admin)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub aal: AssuranceLevel,
    /// 已绑定 TOTP，需要继续完成二次验证以获得 aal2
    pub mfa_required: bool,
}
