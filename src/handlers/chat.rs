use actix_web::{HttpResponse, ResponseError, Result, http::header, web};

use crate::error::AppError;
use crate::models::*;
use crate::services::ChatService;

/// 聊天接口不走统一的 `{success, data}` 包装，错误体为 `{"error": "..."}`
fn chat_error(e: AppError) -> HttpResponse {
    let status = e.status_code();
    if status.is_server_error() {
        log::error!("Chat request failed: {e}");
    } else {
        log::warn!("Chat request rejected: {e}");
    }
    HttpResponse::build(status).json(ChatErrorResponse {
        error: user_message(&e),
    })
}

fn user_message(e: &AppError) -> String {
    match e {
        AppError::ValidationError(msg)
        | AppError::TooManyRequests(msg)
        | AppError::PaymentRequired(msg)
        | AppError::ExternalApiError(msg) => msg.clone(),
        _ => "Something went wrong".to_string(),
    }
}

#[utoipa::path(
    post,
    path = "/chat/stream",
    tag = "chat",
    request_body = ChatRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "text/event-stream，data: {\"content\": ...}，以 data: [DONE] 结束"),
        (status = 402, description = "额度不足", body = ChatErrorResponse),
        (status = 429, description = "请求过于频繁", body = ChatErrorResponse)
    )
)]
pub async fn stream_chat(
    chat_service: web::Data<ChatService>,
    request: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    match chat_service.stream_chat(request.into_inner()).await {
        Ok(events) => Ok(HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .streaming(events)),
        Err(e) => Ok(chat_error(e)),
    }
}

#[utoipa::path(
    post,
    path = "/chat/image",
    tag = "chat",
    request_body = ImageRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "生成的图片（data URL 或链接）", body = ImageResponse),
        (status = 400, description = "提示词为空或过长", body = ChatErrorResponse),
        (status = 402, description = "额度不足", body = ChatErrorResponse),
        (status = 429, description = "请求过于频繁", body = ChatErrorResponse)
    )
)]
pub async fn generate_image(
    chat_service: web::Data<ChatService>,
    request: web::Json<ImageRequest>,
) -> Result<HttpResponse> {
    match chat_service.generate_image(request.into_inner()).await {
        Ok(image) => Ok(HttpResponse::Ok().json(image)),
        Err(e) => Ok(chat_error(e)),
    }
}

pub fn chat_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/chat")
            .route("/stream", web::post().to(stream_chat))
            .route("/image", web::post().to(generate_image)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_chat_error_keeps_status_and_hides_internals() {
        let resp = chat_error(AppError::TooManyRequests("Rate limits exceeded".to_string()));
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let msg = user_message(&AppError::InternalError("db password leaked".to_string()));
        assert_eq!(msg, "Something went wrong");
        assert_eq!(
            user_message(&AppError::PaymentRequired("Payment required".to_string())),
            "Payment required"
        );
    }
}
