use crate::entities::{Currency, PaymentMethod};
use crate::error::{AppError, AppResult};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;

/// 付款截图大小上限（解码后）
pub const MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

// 防止换算为最小单位时溢出
const MAX_AMOUNT_MAJOR: f64 = 1_000_000_000.0;

pub fn validate_email(email: &str) -> AppResult<()> {
    let email_regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
        .map_err(|e| AppError::InternalError(format!("Invalid email pattern: {e}")))?;

    if email.len() > 254 || !email_regex.is_match(email) {
        return Err(AppError::ValidationError("Invalid email address".to_string()));
    }

    Ok(())
}

/// 主单位金额（最多两位小数）转为最小单位（美分 / 派沙）
pub fn amount_to_minor_units(amount: f64) -> AppResult<i64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::ValidationError(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if amount > MAX_AMOUNT_MAJOR {
        return Err(AppError::ValidationError("Amount is too large".to_string()));
    }

    let scaled = amount * 100.0;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 {
        return Err(AppError::ValidationError(
            "Amount can have at most two decimal places".to_string(),
        ));
    }

    Ok(rounded as i64)
}

pub fn require_payment_method(method: Option<PaymentMethod>) -> AppResult<PaymentMethod> {
    method.ok_or_else(|| AppError::ValidationError("Please select a payment method".to_string()))
}

pub const PAYMENT_METHODS: [PaymentMethod; 5] = [
    PaymentMethod::JazzCash,
    PaymentMethod::EasyPaisa,
    PaymentMethod::BankTransfer,
    PaymentMethod::Binance,
    PaymentMethod::Payoneer,
];

/// 各支付方式可收的币种
pub fn supported_currencies(method: PaymentMethod) -> &'static [Currency] {
    match method {
        PaymentMethod::JazzCash | PaymentMethod::EasyPaisa => &[Currency::Pkr],
        PaymentMethod::BankTransfer => &[Currency::Pkr, Currency::Usd],
        PaymentMethod::Binance | PaymentMethod::Payoneer => &[Currency::Usd],
    }
}

pub fn require_method_currency(method: PaymentMethod, currency: Currency) -> AppResult<()> {
    if supported_currencies(method).contains(&currency) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "{method} does not accept {currency} payments"
        )))
    }
}

/// 校验并解码付款截图，返回原始字节
pub fn decode_proof(content_type: &str, data_base64: &str) -> AppResult<Vec<u8>> {
    if !content_type.starts_with("image/") {
        return Err(AppError::ValidationError(
            "Payment proof must be an image".to_string(),
        ));
    }

    // 先按编码长度估算，避免解码超大内容
    let trimmed = data_base64.trim();
    if trimmed.len() / 4 * 3 > MAX_PROOF_BYTES + 3 {
        return Err(proof_too_large());
    }

    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|_| AppError::ValidationError("Payment proof is not valid base64".to_string()))?;

    if bytes.is_empty() {
        return Err(AppError::ValidationError("Payment proof is empty".to_string()));
    }
    if bytes.len() > MAX_PROOF_BYTES {
        return Err(proof_too_large());
    }

    Ok(bytes)
}

fn proof_too_large() -> AppError {
    AppError::ValidationError("File size must be less than 5MB".to_string())
}

/// 对象键的扩展名：优先取文件名，否则按 MIME 子类型推断
pub fn proof_file_extension(file_name: &str, content_type: &str) -> String {
    let from_name = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    from_name.unwrap_or_else(|| {
        match content_type.trim_start_matches("image/") {
            "jpeg" => "jpg".to_string(),
            "svg+xml" => "svg".to_string(),
            sub if !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()) => {
                sub.to_ascii_lowercase()
            }
            _ => "bin".to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_to_minor_units() {
        assert_eq!(amount_to_minor_units(10.0).unwrap(), 1000);
        assert_eq!(amount_to_minor_units(0.01).unwrap(), 1);
        assert_eq!(amount_to_minor_units(19.99).unwrap(), 1999);
        assert_eq!(amount_to_minor_units(2500.5).unwrap(), 250050);
    }

    #[test]
    fn test_amount_rejects_non_positive_and_invalid() {
        assert!(amount_to_minor_units(0.0).is_err());
        assert!(amount_to_minor_units(-5.0).is_err());
        assert!(amount_to_minor_units(f64::NAN).is_err());
        assert!(amount_to_minor_units(f64::INFINITY).is_err());
        assert!(amount_to_minor_units(1.005).is_err());
    }

    #[test]
    fn test_require_payment_method() {
        assert!(require_payment_method(None).is_err());
        assert_eq!(
            require_payment_method(Some(PaymentMethod::JazzCash)).unwrap(),
            PaymentMethod::JazzCash
        );
    }

    #[test]
    fn test_method_currency_pairs() {
        assert!(require_method_currency(PaymentMethod::JazzCash, Currency::Pkr).is_ok());
        assert!(require_method_currency(PaymentMethod::BankTransfer, Currency::Usd).is_ok());
        assert!(require_method_currency(PaymentMethod::EasyPaisa, Currency::Usd).is_err());
        let err = require_method_currency(PaymentMethod::Binance, Currency::Pkr).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(m) if m.contains("PKR")));
    }

    #[test]
    fn test_decode_proof_checks_type_and_size() {
        let small = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_proof("image/png", &small).unwrap(), vec![1, 2, 3]);
        assert!(decode_proof("application/pdf", &small).is_err());
        assert!(decode_proof("image/png", "!!!").is_err());

        let big = STANDARD.encode(vec![0u8; MAX_PROOF_BYTES + 1]);
        assert!(decode_proof("image/png", &big).is_err());

        let exact = STANDARD.encode(vec![0u8; MAX_PROOF_BYTES]);
        assert_eq!(decode_proof("image/jpeg", &exact).unwrap().len(), MAX_PROOF_BYTES);
    }

    #[test]
    fn test_proof_file_extension() {
        assert_eq!(proof_file_extension("receipt.PNG", "image/png"), "png");
        assert_eq!(proof_file_extension("receipt", "image/jpeg"), "jpg");
        assert_eq!(proof_file_extension("weird.name.", "image/webp"), "webp");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user@example").is_err());
        assert!(validate_email("no spaces@example.com").is_err());
    }
}
