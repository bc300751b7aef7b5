use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, error::JsonPayloadError, web};

use crate::error::AppError;
use crate::middlewares::current_user;
use crate::models::*;
use crate::services::WalletService;
use crate::utils::MAX_PROOF_BYTES;

/// 截图以 base64 放在 JSON 里：编码后约为原始大小的 4/3，另留 1 MiB 给其他字段
const MAX_DEPOSIT_BODY_BYTES: usize = MAX_PROOF_BYTES / 3 * 4 + 1024 * 1024;

fn deposit_json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_DEPOSIT_BODY_BYTES)
        .error_handler(|err, _req| {
            let app_err = match err {
                JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                    AppError::ValidationError("File size must be less than 5MB".to_string())
                }
                other => AppError::ValidationError(format!("Invalid request body: {other}")),
            };
            app_err.into()
        })
}

#[utoipa::path(
    get,
    path = "/wallet",
    tag = "wallet",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "钱包余额（最小单位）", body = WalletResponse),
        (status = 401, description = "未授权")
    )
)]
pub async fn get_wallet(
    wallet_service: web::Data<WalletService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match wallet_service.get_wallet(user.id).await {
        Ok(wallet) => Ok(HttpResponse::Ok().json(ApiResponse::success(wallet))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/wallet/deposits",
    tag = "wallet",
    request_body = SubmitDepositRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "充值申请已提交，等待审核", body = DepositSubmittedResponse),
        (status = 400, description = "金额、支付方式或截图无效"),
        (status = 502, description = "截图上传失败")
    )
)]
pub async fn submit_deposit(
    wallet_service: web::Data<WalletService>,
    req: HttpRequest,
    request: web::Json<SubmitDepositRequest>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match wallet_service
        .submit_deposit(user.id, request.into_inner())
        .await
    {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            response,
            "Deposit request submitted. It will be credited after review.",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/wallet/transactions",
    tag = "wallet",
    params(
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页数量"),
        ("type" = Option<String>, Query, description = "deposit / purchase / refund / withdrawal"),
        ("status" = Option<String>, Query, description = "pending / completed / failed / cancelled")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "交易记录"),
        (status = 401, description = "未授权")
    )
)]
pub async fn list_transactions(
    wallet_service: web::Data<WalletService>,
    req: HttpRequest,
    query: web::Query<TransactionQuery>,
) -> Result<HttpResponse> {
    let user = current_user(&req)?;

    match wallet_service.list_transactions(user.id, &query).await {
        Ok(page) => Ok(HttpResponse::Ok().json(ApiResponse::success(page))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/wallet/payment-methods",
    tag = "wallet",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "可用支付方式", body = [PaymentMethodInfo])
    )
)]
pub async fn payment_methods(wallet_service: web::Data<WalletService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::success(wallet_service.payment_methods())))
}

pub fn wallet_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/wallet")
            .app_data(deposit_json_config())
            .route("", web::get().to(get_wallet))
            .route("/deposits", web::post().to(submit_deposit))
            .route("/transactions", web::get().to(list_transactions))
            .route("/payment-methods", web::get().to(payment_methods)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContactConfig, StorageConfig};
    use crate::external::ObjectStorageService;
    use actix_web::{App, http::StatusCode, test};
    use base64::Engine as _;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn wallet_service() -> WalletService {
        WalletService::new(
            Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection()),
            ObjectStorageService::new(StorageConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                service_key: "k".to_string(),
                bucket: "payment-proofs".to_string(),
                signed_url_expires_in: 600,
            }),
            ContactConfig::default(),
        )
    }

    fn deposit_body(proof_bytes: usize) -> serde_json::Value {
        serde_json::json!({
            "amount": 2500.0,
            "currency": "PKR",
            "payment_method": "jazzcash",
            "proof": {
                "file_name": "receipt.png",
                "content_type": "image/png",
                "data_base64": base64::engine::general_purpose::STANDARD
                    .encode(vec![7u8; proof_bytes]),
            }
        })
    }

    // 请求里没有登录用户：能走到 401 说明请求体已被完整解析
    #[actix_web::test]
    async fn test_proof_under_limit_reaches_handler() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(wallet_service()))
                .configure(wallet_config),
        )
        .await;

        for size in [1024, 3 * 1024 * 1024, MAX_PROOF_BYTES] {
            let req = test::TestRequest::post()
                .uri("/wallet/deposits")
                .set_json(deposit_body(size))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "proof of {size} bytes");
        }
    }

    #[actix_web::test]
    async fn test_oversized_body_is_a_validation_error() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(wallet_service()))
                .configure(wallet_config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/wallet/deposits")
            .set_json(deposit_body(7 * 1024 * 1024))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "File size must be less than 5MB");
    }
}
