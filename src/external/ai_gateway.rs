use crate::config::AiGatewayConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, ImageResponse};
use actix_web::web::Bytes;
use futures_util::Stream;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

/// OpenAI 兼容的 chat-completions 网关
#[derive(Clone)]
pub struct AiGatewayService {
    http: Client,
    cfg: AiGatewayConfig,
}

impl AiGatewayService {
    pub fn new(cfg: AiGatewayConfig) -> Self {
        let http = Client::builder()
            .user_agent("storefront-backend/ai-gateway")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, cfg }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    fn with_system_prompt(&self, messages: &[ChatMessage]) -> Vec<Value> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = self.cfg.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            out.push(json!({ "role": "system", "content": prompt }));
        }
        out.extend(messages.iter().map(|m| json!({ "role": m.role, "content": m.content })));
        out
    }

    /// 发起流式补全，返回上游原始 SSE 字节流
    pub async fn stream_chat(
        &self,
        messages: &[ChatMessage],
    ) -> AppResult<impl Stream<Item = reqwest::Result<Bytes>> + Send + use<>> {
        let body = json!({
            "model": self.cfg.chat_model,
            "messages": self.with_system_prompt(messages),
            "stream": true,
        });

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_gateway_status(status, &text));
        }

        Ok(resp.bytes_stream())
    }

    pub async fn generate_image(&self, prompt: &str) -> AppResult<ImageResponse> {
        let body = json!({
            "model": self.cfg.image_model,
            "messages": [{ "role": "user", "content": prompt }],
            "modalities": ["image", "text"],
        });

        let resp = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_gateway_status(status, &text));
        }

        let value: Value = resp.json().await?;
        parse_image_response(&value)
    }
}

pub fn map_gateway_status(status: StatusCode, body: &str) -> AppError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::TooManyRequests("Rate limits exceeded".to_string()),
        StatusCode::PAYMENT_REQUIRED => AppError::PaymentRequired("Payment required".to_string()),
        _ => {
            log::error!(
                "AI gateway error: HTTP {} body={}",
                status.as_u16(),
                body.chars().take(512).collect::<String>()
            );
            AppError::ExternalApiError("AI gateway error".to_string())
        }
    }
}

/// 图片位于 choices[0].message.images[0].image_url.url
pub fn parse_image_response(value: &Value) -> AppResult<ImageResponse> {
    let image_url = value
        .pointer("/choices/0/message/images/0/image_url/url")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ExternalApiError("No image generated".to_string()))?;
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(ImageResponse {
        image_url: image_url.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_gateway_status() {
        assert!(matches!(
            map_gateway_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AppError::TooManyRequests(m) if m == "Rate limits exceeded"
        ));
        assert!(matches!(
            map_gateway_status(StatusCode::PAYMENT_REQUIRED, ""),
            AppError::PaymentRequired(m) if m == "Payment required"
        ));
        assert!(matches!(
            map_gateway_status(StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            AppError::ExternalApiError(_)
        ));
    }

    #[test]
    fn test_parse_image_response() {
        let value = json!({
            "choices": [{
                "message": {
                    "content": "Here you go",
                    "images": [{ "image_url": { "url": "data:image/png;base64,AAAA" } }]
                }
            }]
        });
        let image = parse_image_response(&value).unwrap();
        assert_eq!(image.image_url, "data:image/png;base64,AAAA");
        assert_eq!(image.text, "Here you go");

        let missing = json!({ "choices": [{ "message": { "content": "no image" } }] });
        assert!(parse_image_response(&missing).is_err());
    }

    #[test]
    fn test_system_prompt_is_prepended() {
        let svc = AiGatewayService::new(AiGatewayConfig {
            base_url: "https://gw.test/v1/".to_string(),
            api_key: "k".to_string(),
            chat_model: "m".to_string(),
            image_model: "i".to_string(),
            system_prompt: Some("Be helpful".to_string()),
        });
        let msgs = svc.with_system_prompt(&[ChatMessage {
            role: crate::models::ChatRole::User,
            content: "hi".to_string(),
        }]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["role"], "user");
        assert_eq!(svc.completions_url(), "https://gw.test/v1/chat/completions");
    }
}
