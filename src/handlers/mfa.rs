use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use uuid::Uuid;

use crate::middlewares::current_user;
use crate::models::*;
use crate::services::MfaService;

#[utoipa::path(
    post,
    path = "/mfa/enroll",
    tag = "mfa",
    request_body = EnrollRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建未验证的 TOTP 因子", body = EnrollResponse),
        (status = 409, description = "已绑定验证器")
    )
)]
pub async fn enroll(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
    request: Option<web::Json<EnrollRequest>>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    let request = request.map(|r| r.into_inner()).unwrap_or_default();

    match mfa_service.enroll(user.id, &user.email, request).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/mfa/challenge",
    tag = "mfa",
    request_body = ChallengeRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "创建验证挑战", body = ChallengeResponse),
        (status = 404, description = "因子不存在")
    )
)]
pub async fn challenge(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
    request: web::Json<ChallengeRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match mfa_service.challenge(user.id, request.factor_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/mfa/verify",
    tag = "mfa",
    request_body = VerifyRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "验证成功，签发 aal2 令牌", body = VerifyResponse),
        (status = 400, description = "验证码错误或挑战已过期"),
        (status = 429, description = "失败次数过多，已锁定")
    )
)]
pub async fn verify(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
    request: web::Json<VerifyRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match mfa_service
        .verify(user.id, &user.email, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/mfa/factors",
    tag = "mfa",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "已绑定的因子", body = FactorListResponse)
    )
)]
pub async fn list_factors(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match mfa_service.list_factors(user.id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/mfa/factors/{id}",
    tag = "mfa",
    params(
        ("id" = Uuid, Path, description = "因子ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "解绑成功"),
        (status = 403, description = "需要先完成二次验证"),
        (status = 404, description = "因子不存在")
    )
)]
pub async fn unenroll(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;
    let factor_id = path.into_inner();

    match mfa_service.unenroll(user.id, user.aal, factor_id).await {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            serde_json::json!({ "id": factor_id }),
            "Factor removed",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/mfa/aal",
    tag = "mfa",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "当前与可达的认证等级", body = AalResponse)
    )
)]
pub async fn assurance_level(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match mfa_service.assurance_level(user.id, user.aal).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 没有安全记录的用户视为未锁定
#[utoipa::path(
    get,
    path = "/mfa/lockout",
    tag = "mfa",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "二次验证锁定状态", body = LockoutStatusResponse)
    )
)]
pub async fn lockout_status(
    mfa_service: web::Data<MfaService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match mfa_service.check_admin_lockout(user.id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn mfa_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/mfa")
            .route("/enroll", web::post().to(enroll))
            .route("/challenge", web::post().to(challenge))
            .route("/verify", web::post().to(verify))
            .route("/factors", web::get().to(list_factors))
            .route("/factors/{id}", web::delete().to(unenroll))
            .route("/aal", web::get().to(assurance_level))
            .route("/lockout", web::get().to(lockout_status)),
    );
}
