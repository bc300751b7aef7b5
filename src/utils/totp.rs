//! RFC 6238 TOTP (HMAC-SHA1, 30 秒步长, 6 位)

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

pub const TOTP_DIGITS: u32 = 6;
pub const TOTP_STEP_SECS: u64 = 30;
/// 允许前后各一个时间步的时钟偏差
pub const TOTP_SKEW_STEPS: i64 = 1;

const SECRET_BYTES: usize = 20;

/// 生成 160 位随机密钥，返回 base32（无填充）
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD.decode(normalized.as_bytes()).ok()
}

/// HOTP (RFC 4226) 动态截断
pub fn hotp(key: &[u8], counter: u64) -> u32 {
    // HMAC 接受任意长度的密钥
    let Ok(mut mac) = HmacSha1::new_from_slice(key) else {
        return u32::MAX;
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    binary % 10u32.pow(TOTP_DIGITS)
}

pub fn totp_at(key: &[u8], unix_secs: u64) -> String {
    let code = hotp(key, unix_secs / TOTP_STEP_SECS);
    format!("{:0width$}", code, width = TOTP_DIGITS as usize)
}

/// 校验验证码，允许 ±TOTP_SKEW_STEPS 个时间步
pub fn verify_code(secret: &str, code: &str, unix_secs: u64) -> bool {
    if code.len() != TOTP_DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Some(key) = decode_secret(secret) else {
        return false;
    };

    let current = (unix_secs / TOTP_STEP_SECS) as i64;
    (-TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS).any(|delta| {
        let counter = current + delta;
        counter >= 0 && {
            let expected = format!(
                "{:0width$}",
                hotp(&key, counter as u64),
                width = TOTP_DIGITS as usize
            );
            constant_time_eq(expected.as_bytes(), code.as_bytes())
        }
    })
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 认证器 App 扫码用的 otpauth URI
pub fn otpauth_uri(issuer: &str, account: &str, secret: &str) -> String {
    let label = encode_component(&format!("{issuer}:{account}"));
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("secret", secret)
        .append_pair("issuer", issuer)
        .append_pair("algorithm", "SHA1")
        .append_pair("digits", &TOTP_DIGITS.to_string())
        .append_pair("period", &TOTP_STEP_SECS.to_string())
        .finish();
    format!("otpauth://totp/{label}?{query}")
}

// form_urlencoded 会把空格编码为 '+'，路径部分需要 %20
fn encode_component(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 附录 B，SHA1 密钥 "12345678901234567890"，取低 6 位
    const RFC_KEY: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_vectors() {
        assert_eq!(totp_at(RFC_KEY, 59), "287082");
        assert_eq!(totp_at(RFC_KEY, 1_111_111_109), "081804");
        assert_eq!(totp_at(RFC_KEY, 1_111_111_111), "050471");
        assert_eq!(totp_at(RFC_KEY, 1_234_567_890), "005924");
        assert_eq!(totp_at(RFC_KEY, 2_000_000_000), "279037");
    }

    #[test]
    fn test_verify_code_allows_one_step_skew() {
        let secret = BASE32_NOPAD.encode(RFC_KEY);
        // 59 秒时的验证码在相邻时间步仍然有效
        assert!(verify_code(&secret, "287082", 59));
        assert!(verify_code(&secret, "287082", 59 + 30));
        assert!(!verify_code(&secret, "287082", 59 + 90));
    }

    #[test]
    fn test_verify_code_rejects_malformed_input() {
        let secret = BASE32_NOPAD.encode(RFC_KEY);
        assert!(!verify_code(&secret, "28708", 59));
        assert!(!verify_code(&secret, "28708a", 59));
        assert!(!verify_code("not base32!", "287082", 59));
    }

    #[test]
    fn test_generated_secret_decodes_to_20_bytes() {
        let secret = generate_secret();
        assert_eq!(decode_secret(&secret).unwrap().len(), SECRET_BYTES);
        assert_eq!(decode_secret(&secret.to_lowercase()).unwrap().len(), SECRET_BYTES);
    }

    #[test]
    fn test_otpauth_uri_encodes_label() {
        let uri = otpauth_uri("Digital Store", "a@example.com", "ABC");
        assert!(uri.starts_with("otpauth://totp/Digital%20Store%3Aa%40example.com?"));
        assert!(uri.contains("secret=ABC"));
        assert!(uri.contains("issuer=Digital+Store"));
        assert!(uri.contains("digits=6"));
    }
}
