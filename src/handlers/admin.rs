use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

use crate::error::AppResult;
use crate::middlewares::{AuthUser, current_user};
use crate::models::*;
use crate::services::AdminService;

async fn require_admin(admin_service: &AdminService, req: &HttpRequest) -> AppResult<AuthUser> {
    let user = current_user(req)?;
    admin_service.ensure_admin(user.id, user.aal).await?;
    Ok(user)
}

#[utoipa::path(
    get,
    path = "/admin/deposits",
    tag = "admin",
    params(
        ("status" = Option<String>, Query, description = "默认 pending"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "充值申请列表（含截图签名链接）"),
        (status = 403, description = "需要管理员且已完成二次验证")
    )
)]
pub async fn list_deposits(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
    query: web::Query<AdminDepositQuery>,
) -> Result<HttpResponse> {
    require_admin(&admin_service, &req).await?;

    match admin_service.list_deposits(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/admin/deposits/{id}/review",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "交易ID")
    ),
    request_body = ReviewDepositRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "审核完成", body = ReviewDepositResponse),
        (status = 404, description = "充值记录不存在"),
        (status = 409, description = "已审核或正在审核中")
    )
)]
pub async fn review_deposit(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<ReviewDepositRequest>,
) -> Result<HttpResponse> {
    let admin = require_admin(&admin_service, &req).await?;

    match admin_service
        .approve_deposit(admin.id, path.into_inner(), request.approve)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/stats",
    tag = "admin",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "后台统计", body = AdminStatsResponse)
    )
)]
pub async fn stats(admin_service: web::Data<AdminService>, req: HttpRequest) -> Result<HttpResponse> {
    require_admin(&admin_service, &req).await?;

    match admin_service.stats().await {
        Ok(stats) => Ok(HttpResponse::Ok().json(ApiResponse::success(stats))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/enrollments",
    tag = "admin",
    params(
        ("status" = Option<String>, Query, description = "pending / active / rejected"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "课程报名列表")
    )
)]
pub async fn list_enrollments(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
    query: web::Query<AdminEnrollmentQuery>,
) -> Result<HttpResponse> {
    require_admin(&admin_service, &req).await?;

    match admin_service.list_enrollments(&query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/admin/enrollments/{id}",
    tag = "admin",
    params(
        ("id" = i64, Path, description = "报名ID")
    ),
    request_body = UpdateEnrollmentRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "更新成功", body = EnrollmentResponse),
        (status = 404, description = "报名不存在")
    )
)]
pub async fn update_enrollment(
    admin_service: web::Data<AdminService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<UpdateEnrollmentRequest>,
) -> Result<HttpResponse> {
    require_admin(&admin_service, &req).await?;

    match admin_service
        .update_enrollment(path.into_inner(), request.status)
        .await
    {
        Ok(enrollment) => Ok(HttpResponse::Ok().json(ApiResponse::success(enrollment))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/deposits", web::get().to(list_deposits))
            .route("/deposits/{id}/review", web::post().to(review_deposit))
            .route("/stats", web::get().to(stats))
            .route("/enrollments", web::get().to(list_enrollments))
            .route("/enrollments/{id}", web::put().to(update_enrollment)),
    );
}
