use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

use crate::middlewares::current_user;
use crate::models::*;
use crate::services::CatalogService;

#[utoipa::path(
    get,
    path = "/catalog/plans",
    tag = "catalog",
    responses(
        (status = 200, description = "会员套餐", body = [PlanResponse])
    )
)]
pub async fn list_plans(catalog_service: web::Data<CatalogService>) -> Result<HttpResponse> {
    match catalog_service.list_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(ApiResponse::success(plans))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/courses",
    tag = "catalog",
    responses(
        (status = 200, description = "课程列表", body = [CourseResponse])
    )
)]
pub async fn list_courses(catalog_service: web::Data<CatalogService>) -> Result<HttpResponse> {
    match catalog_service.list_courses().await {
        Ok(courses) => Ok(HttpResponse::Ok().json(ApiResponse::success(courses))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/catalog/plans/{id}/purchase",
    tag = "catalog",
    params(
        ("id" = i64, Path, description = "套餐ID")
    ),
    request_body = PurchasePlanRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "购买成功", body = PurchasePlanResponse),
        (status = 400, description = "余额不足或套餐未定价"),
        (status = 404, description = "套餐不存在")
    )
)]
pub async fn purchase_plan(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
    request: web::Json<PurchasePlanRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match catalog_service
        .purchase_plan(user.id, path.into_inner(), request.currency)
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/subscription",
    tag = "catalog",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "当前有效订阅，没有时为 null", body = SubscriptionResponse)
    )
)]
pub async fn my_subscription(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match catalog_service.my_subscription(user.id).await {
        Ok(subscription) => Ok(HttpResponse::Ok().json(ApiResponse::success(subscription))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/catalog/courses/{id}/enroll",
    tag = "catalog",
    params(
        ("id" = i64, Path, description = "课程ID")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "报名成功，等待审核", body = EnrollmentResponse),
        (status = 404, description = "课程不存在"),
        (status = 409, description = "已报名")
    )
)]
pub async fn enroll_course(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match catalog_service
        .enroll_course(user.id, path.into_inner())
        .await
    {
        Ok(enrollment) => Ok(HttpResponse::Ok().json(ApiResponse::success(enrollment))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/catalog/enrollments",
    tag = "catalog",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "我的课程报名", body = [EnrollmentResponse])
    )
)]
pub async fn my_enrollments(
    catalog_service: web::Data<CatalogService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match catalog_service.my_enrollments(user.id).await {
        Ok(enrollments) => Ok(HttpResponse::Ok().json(ApiResponse::success(enrollments))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn catalog_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/catalog")
            .route("/plans", web::get().to(list_plans))
            .route("/plans/{id}/purchase", web::post().to(purchase_plan))
            .route("/courses", web::get().to(list_courses))
            .route("/courses/{id}/enroll", web::post().to(enroll_course))
            .route("/subscription", web::get().to(my_subscription))
            .route("/enrollments", web::get().to(my_enrollments)),
    );
}
