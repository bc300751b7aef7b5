use rand::Rng;

const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const BACKUP_CODE_COUNT: usize = 10;

/// 生成一次性备用码，格式 XXXX-XXXX（大写字母与数字）
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut chars: Vec<char> = (0..8)
                .map(|_| BACKUP_CODE_ALPHABET[rng.gen_range(0..BACKUP_CODE_ALPHABET.len())] as char)
                .collect();
            chars.insert(4, '-');
            chars.into_iter().collect()
        })
        .collect()
}

/// 清洗用户输入的验证码：只保留数字，最多 6 位
pub fn sanitize_otp_code(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).take(6).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_backup_codes_format() {
        let codes = generate_backup_codes(BACKUP_CODE_COUNT);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            assert!(
                code.chars()
                    .filter(|c| *c != '-')
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[test]
    fn test_sanitize_otp_code() {
        assert_eq!(sanitize_otp_code("123 456"), "123456");
        assert_eq!(sanitize_otp_code("12a3-4b56789"), "123456");
        assert_eq!(sanitize_otp_code("12"), "12");
        assert_eq!(sanitize_otp_code("abc"), "");
    }
}
