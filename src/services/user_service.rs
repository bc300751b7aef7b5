use crate::entities::{
    AppRole, profile_entity as profiles, user_entity as users, user_role_entity as user_roles,
};
use crate::error::{AppError, AppResult};
use crate::models::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};
use std::sync::Arc;

/// 查询用户角色（事务内外均可用）
pub async fn roles_of<C: ConnectionTrait>(db: &C, user_id: i64) -> Result<Vec<AppRole>, DbErr> {
    Ok(user_roles::Entity::find()
        .filter(user_roles::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|r| r.role)
        .collect())
}

pub async fn has_role<C: ConnectionTrait>(db: &C, user_id: i64, role: AppRole) -> Result<bool, DbErr> {
    Ok(user_roles::Entity::find()
        .filter(user_roles::Column::UserId.eq(user_id))
        .filter(user_roles::Column::Role.eq(role))
        .one(db)
        .await?
        .is_some())
}

#[derive(Clone)]
pub struct UserService {
    pool: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(pool: Arc<DatabaseConnection>) -> Self {
        Self { pool }
    }

    /// 用户资料（含角色）
    pub async fn get_user_profile(&self, user_id: i64) -> AppResult<UserResponse> {
        let user = users::Entity::find_by_id(user_id)
            .one(self.pool.as_ref())
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        let profile = profiles::Entity::find_by_id(user_id).one(self.pool.as_ref()).await?;
        let roles = roles_of(self.pool.as_ref(), user_id).await?;

        Ok(UserResponse::from_parts(user, profile, roles))
    }

    pub async fn update_user_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> AppResult<UserResponse> {
        if request.full_name.is_none() && request.phone.is_none() && request.avatar_url.is_none() {
            return Err(AppError::ValidationError("No fields to update".to_string()));
        }
        if let Some(name) = &request.full_name
            && (name.trim().is_empty() || name.chars().count() > 100)
        {
            return Err(AppError::ValidationError(
                "Full name must be between 1 and 100 characters".to_string(),
            ));
        }
        if let Some(phone) = &request.phone
            && (phone.len() > 20 || !phone.chars().all(|c| c.is_ascii_digit() || "+- ".contains(c)))
        {
            return Err(AppError::ValidationError("Invalid phone number".to_string()));
        }

        let now = Utc::now();
        match profiles::Entity::find_by_id(user_id).one(self.pool.as_ref()).await? {
            Some(existing) => {
                let mut model = existing.into_active_model();
                if let Some(name) = request.full_name {
                    model.full_name = Set(Some(name.trim().to_string()));
                }
                if let Some(phone) = request.phone {
                    model.phone = Set(Some(phone));
                }
                if let Some(url) = request.avatar_url {
                    model.avatar_url = Set(Some(url));
                }
                model.updated_at = Set(Some(now));
                model.update(self.pool.as_ref()).await?;
            }
            None => {
                profiles::ActiveModel {
                    user_id: Set(user_id),
                    full_name: Set(request.full_name.map(|n| n.trim().to_string())),
                    phone: Set(request.phone),
                    avatar_url: Set(request.avatar_url),
                    created_at: Set(Some(now)),
                    updated_at: Set(Some(now)),
                }
                .insert(self.pool.as_ref())
                .await?;
            }
        }

        self.get_user_profile(user_id).await
    }
}
