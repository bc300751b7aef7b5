use crate::error::{AppError, AppResult};
use bcrypt::{DEFAULT_COST, hash, verify};

const MIN_PASSWORD_CHARS: usize = 8;
/// bcrypt 只使用前 72 字节，超出部分会被忽略
const MAX_PASSWORD_BYTES: usize = 72;

/// 注册时的密码规则
///
/// 至少 8 个字符，同时包含字母和数字，不超过 bcrypt 的 72 字节上限，
/// 且不能包含邮箱用户名（3 个字符以上时）。
pub fn validate_password(password: &str, email: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::ValidationError(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    if password.trim() != password {
        return Err(AppError::ValidationError(
            "Password must not start or end with whitespace".to_string(),
        ));
    }

    let has_letter = password.chars().any(char::is_alphabetic);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(AppError::ValidationError(
            "Password must contain at least one letter and one digit".to_string(),
        ));
    }

    let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
    if local_part.chars().count() >= 3 && password.to_lowercase().contains(&local_part) {
        return Err(AppError::ValidationError(
            "Password must not contain your email name".to_string(),
        ));
    }

    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    verify(password, hash)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "ayesha@example.com";

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Password123", EMAIL).is_ok());
        assert!(validate_password("lowercase99", EMAIL).is_ok());
        assert!(validate_password("Password", EMAIL).is_err()); // 缺少数字
        assert!(validate_password("12345678", EMAIL).is_err()); // 缺少字母
        assert!(validate_password("Pass123", EMAIL).is_err()); // 太短
        assert!(validate_password(" Password123", EMAIL).is_err());
    }

    #[test]
    fn test_length_counts_characters_and_caps_bytes() {
        // 8 个字符，但超过 8 字节
        assert!(validate_password("密码密码密码a1", EMAIL).is_ok());
        assert!(validate_password(&format!("a1{}", "x".repeat(70)), EMAIL).is_ok());
        assert!(validate_password(&format!("a1{}", "x".repeat(71)), EMAIL).is_err());
    }

    #[test]
    fn test_password_must_not_contain_email_name() {
        assert!(validate_password("Ayesha2024!", EMAIL).is_err());
        assert!(validate_password("Ab12345678", "ab@example.com").is_ok());
    }

    #[test]
    fn test_hash_and_verify_password() {
        let password = "Password123";
        let hashed = hash_password(password).unwrap();

        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("WrongPassword", &hashed).unwrap());
    }
}
