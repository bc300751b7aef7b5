use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;

/// 托管对象存储 REST 接口（付款截图桶）
#[derive(Clone)]
pub struct ObjectStorageService {
    http: Client,
    cfg: StorageConfig,
}

impl ObjectStorageService {
    pub fn new(cfg: StorageConfig) -> Self {
        let http = Client::builder()
            .user_agent("storefront-backend/storage")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, cfg }
    }

    fn base(&self) -> &str {
        self.cfg.base_url.trim_end_matches('/')
    }

    /// 上传对象，不覆盖已存在的同名对象，返回对象键
    pub async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> AppResult<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base(), self.cfg.bucket, key);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.service_key)
            .header("apikey", &self.cfg.service_key)
            .header("content-type", content_type)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log::error!(
                "Storage upload failed: HTTP {} [bucket={}, key={}] body={}",
                status.as_u16(),
                self.cfg.bucket,
                key,
                body.chars().take(512).collect::<String>()
            );
            return Err(AppError::ExternalApiError(format!(
                "Failed to upload payment proof (HTTP {})",
                status.as_u16()
            )));
        }

        log::info!("Uploaded object {}/{}", self.cfg.bucket, key);
        Ok(key.to_string())
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base(),
            self.cfg.bucket,
            key
        )
    }

    /// 从公开链接还原对象键；不属于本桶的链接返回 None
    pub fn key_from_public_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/storage/v1/object/public/{}/", self.base(), self.cfg.bucket);
        url.strip_prefix(&prefix)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    pub async fn create_signed_url(&self, key: &str) -> AppResult<String> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base(),
            self.cfg.bucket,
            key
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.service_key)
            .header("apikey", &self.cfg.service_key)
            .json(&serde_json::json!({ "expiresIn": self.cfg.signed_url_expires_in }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Failed to sign object URL (HTTP {})",
                status.as_u16()
            )));
        }

        let body: SignedUrlResponse = resp.json().await?;
        Ok(self.absolute_signed_url(&body.signed_url))
    }

    // 接口返回的是相对路径，例如 /object/sign/bucket/key?token=...
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1{}", self.base(), signed)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ObjectStorageService {
        ObjectStorageService::new(StorageConfig {
            base_url: "https://proj.storage.test/".to_string(),
            service_key: "key".to_string(),
            bucket: "payment-proofs".to_string(),
            signed_url_expires_in: 600,
        })
    }

    #[test]
    fn test_public_url_and_key_round_trip() {
        let svc = service();
        let url = svc.public_url("7/1700000000000.png");
        assert_eq!(
            url,
            "https://proj.storage.test/storage/v1/object/public/payment-proofs/7/1700000000000.png"
        );
        assert_eq!(svc.key_from_public_url(&url).as_deref(), Some("7/1700000000000.png"));
        assert_eq!(svc.key_from_public_url("https://elsewhere.test/x.png"), None);
    }

    #[test]
    fn test_absolute_signed_url() {
        let svc = service();
        assert_eq!(
            svc.absolute_signed_url("/object/sign/payment-proofs/7/a.png?token=t"),
            "https://proj.storage.test/storage/v1/object/sign/payment-proofs/7/a.png?token=t"
        );
        assert_eq!(
            svc.absolute_signed_url("https://cdn.test/a.png"),
            "https://cdn.test/a.png"
        );
    }
}
