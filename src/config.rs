use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub ai_gateway: AiGatewayConfig,
    #[serde(default)]
    pub mfa: MfaConfig,
    #[serde(default)]
    pub contact: ContactConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 为空时放行所有来源
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expires_in: i64,  // seconds
    pub refresh_token_expires_in: i64, // seconds
}

/// 托管对象存储（付款截图）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub base_url: String,
    pub service_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_signed_url_expires_in")]
    pub signed_url_expires_in: u64, // seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaConfig {
    pub issuer: String,
    pub max_failed_attempts: i32,
    pub lockout_minutes: i64,
    pub challenge_ttl_secs: i64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            issuer: "Storefront".to_string(),
            max_failed_attempts: 5,
            lockout_minutes: 15,
            challenge_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContactConfig {
    /// 国际格式，不带 + 号，例如 923001234567
    #[serde(default)]
    pub whatsapp_number: String,
}

/// 首个管理员只能靠配置授予：列出的邮箱注册时或服务启动时获得 admin 角色
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub bootstrap_emails: Vec<String>,
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn default_bucket() -> String {
    "payment-proofs".to_string()
}

fn default_signed_url_expires_in() -> u64 {
    600
}

fn default_chat_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "google/gemini-2.5-flash-image-preview".to_string()
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 配置文件不存在时完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => Self::parse(&config_str)?,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::from_env_defaults()?,
            Err(e) => {
                return Err(format!("Failed to read config file {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(config_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        toml::from_str(config_str).map_err(|e| format!("Failed to parse config file: {e}").into())
    }

    fn from_env_defaults() -> Result<Self, Box<dyn std::error::Error>> {
        fn get_env(name: &str) -> Option<String> {
            env::var(name).ok()
        }
        fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        let database_url = get_env("DATABASE_URL")
            .ok_or("DATABASE_URL is not set and no config.toml was found")?;

        let mfa_defaults = MfaConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: get_env_parse("SERVER_PORT", 8080u16),
                allowed_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET").unwrap_or_else(|| "change-me-in-production".to_string()),
                access_token_expires_in: get_env_parse("JWT_ACCESS_EXPIRES_IN", 3600i64),
                refresh_token_expires_in: get_env_parse("JWT_REFRESH_EXPIRES_IN", 2_592_000i64),
            },
            storage: StorageConfig {
                base_url: get_env("STORAGE_BASE_URL").unwrap_or_default(),
                service_key: get_env("STORAGE_SERVICE_KEY").unwrap_or_default(),
                bucket: get_env("STORAGE_BUCKET").unwrap_or_else(default_bucket),
                signed_url_expires_in: get_env_parse(
                    "STORAGE_SIGNED_URL_EXPIRES_IN",
                    default_signed_url_expires_in(),
                ),
            },
            ai_gateway: AiGatewayConfig {
                base_url: get_env("AI_GATEWAY_BASE_URL").unwrap_or_default(),
                api_key: get_env("AI_GATEWAY_API_KEY").unwrap_or_default(),
                chat_model: get_env("AI_GATEWAY_CHAT_MODEL").unwrap_or_else(default_chat_model),
                image_model: get_env("AI_GATEWAY_IMAGE_MODEL")
                    .unwrap_or_else(default_image_model),
                system_prompt: get_env("AI_GATEWAY_SYSTEM_PROMPT"),
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER").unwrap_or(mfa_defaults.issuer),
                max_failed_attempts: get_env_parse(
                    "MFA_MAX_FAILED_ATTEMPTS",
                    mfa_defaults.max_failed_attempts,
                ),
                lockout_minutes: get_env_parse("MFA_LOCKOUT_MINUTES", mfa_defaults.lockout_minutes),
                challenge_ttl_secs: get_env_parse(
                    "MFA_CHALLENGE_TTL_SECS",
                    mfa_defaults.challenge_ttl_secs,
                ),
            },
            contact: ContactConfig {
                whatsapp_number: get_env("CONTACT_WHATSAPP_NUMBER").unwrap_or_default(),
            },
            admin: AdminConfig {
                bootstrap_emails: get_env("ADMIN_BOOTSTRAP_EMAILS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            },
        })
    }

    // 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            self.server.port = p;
        }
        if let Ok(v) = env::var("CORS_ALLOWED_ORIGINS") {
            self.server.allowed_origins = split_list(&v);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = env::var("JWT_ACCESS_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            self.jwt.access_token_expires_in = n;
        }
        if let Ok(v) = env::var("JWT_REFRESH_EXPIRES_IN")
            && let Ok(n) = v.parse()
        {
            self.jwt.refresh_token_expires_in = n;
        }
        if let Ok(v) = env::var("STORAGE_BASE_URL") {
            self.storage.base_url = v;
        }
        if let Ok(v) = env::var("STORAGE_SERVICE_KEY") {
            self.storage.service_key = v;
        }
        if let Ok(v) = env::var("STORAGE_BUCKET") {
            self.storage.bucket = v;
        }
        if let Ok(v) = env::var("AI_GATEWAY_BASE_URL") {
            self.ai_gateway.base_url = v;
        }
        if let Ok(v) = env::var("AI_GATEWAY_API_KEY") {
            self.ai_gateway.api_key = v;
        }
        if let Ok(v) = env::var("AI_GATEWAY_SYSTEM_PROMPT") {
            self.ai_gateway.system_prompt = Some(v);
        }
        if let Ok(v) = env::var("MFA_ISSUER") {
            self.mfa.issuer = v;
        }
        if let Ok(v) = env::var("CONTACT_WHATSAPP_NUMBER") {
            self.contact.whatsapp_number = v;
        }
        if let Ok(v) = env::var("ADMIN_BOOTSTRAP_EMAILS") {
            self.admin.bootstrap_emails = split_list(&v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "postgres://localhost/storefront"
max_connections = 5

[jwt]
secret = "secret"
access_token_expires_in = 3600
refresh_token_expires_in = 86400

[storage]
base_url = "https://project.supabase.co"
service_key = "service"

[ai_gateway]
base_url = "https://ai.gateway.example/v1"
api_key = "key"
"#;

    #[test]
    fn test_parse_applies_section_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.storage.bucket, "payment-proofs");
        assert_eq!(config.storage.signed_url_expires_in, 600);
        assert_eq!(config.ai_gateway.chat_model, "google/gemini-2.5-flash");
        assert_eq!(config.mfa.max_failed_attempts, 5);
        assert_eq!(config.mfa.lockout_minutes, 15);
        assert!(config.contact.whatsapp_number.is_empty());
        assert!(config.admin.bootstrap_emails.is_empty());
    }

    #[test]
    fn test_parse_admin_bootstrap_emails() {
        let config = Config::parse(&format!(
            "{SAMPLE}\n[admin]\nbootstrap_emails = [\"owner@example.com\"]\n"
        ))
        .unwrap();
        assert_eq!(config.admin.bootstrap_emails, vec!["owner@example.com"]);
        assert_eq!(split_list(" a@x.com, ,b@x.com "), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_parse_rejects_missing_sections() {
        assert!(Config::parse("[server]\nhost = \"x\"\nport = 1\n").is_err());
    }
}
