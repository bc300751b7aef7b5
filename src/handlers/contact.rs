use actix_web::{HttpResponse, Result, web};

use crate::config::ContactConfig;
use crate::error::AppError;
use crate::models::*;
use crate::utils::{order_message, whatsapp_link};

#[utoipa::path(
    get,
    path = "/contact/order-link",
    tag = "contact",
    params(
        ("service" = String, Query, description = "服务名称"),
        ("plan" = Option<String>, Query, description = "套餐名称")
    ),
    responses(
        (status = 200, description = "预填消息的 WhatsApp 链接", body = OrderLinkResponse),
        (status = 400, description = "缺少服务名称")
    )
)]
pub async fn order_link(
    contact: web::Data<ContactConfig>,
    query: web::Query<OrderLinkQuery>,
) -> Result<HttpResponse> {
    if query.service.trim().is_empty() {
        return Err(AppError::ValidationError("Service is required".to_string()).into());
    }

    let message = order_message(&query.service, query.plan.as_deref());
    let url = whatsapp_link(&contact.whatsapp_number, &message);

    Ok(HttpResponse::Ok().json(ApiResponse::success(OrderLinkResponse { url, message })))
}

pub fn contact_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/contact").route("/order-link", web::get().to(order_link)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};

    #[actix_web::test]
    async fn test_order_link_builds_prefilled_message() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ContactConfig {
                    whatsapp_number: "+92 300 1234567".to_string(),
                }))
                .configure(contact_config),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/contact/order-link?service=YouTube%20Growth&plan=Starter")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(
            body["data"]["message"],
            "Hi! I want to order YouTube Growth (Starter)."
        );
        let url = body["data"]["url"].as_str().unwrap_or_default();
        assert!(url.starts_with("https://wa.me/923001234567?text="));
        assert!(!url.contains('+'));
    }

    #[actix_web::test]
    async fn test_blank_service_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ContactConfig::default()))
                .configure(contact_config),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/contact/order-link?service=%20")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
