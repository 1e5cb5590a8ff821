use rand::RngCore;
use subtle::ConstantTimeEq;

/// 32 random bytes, hex encoded (64 characters). Used for session ids and
/// CSRF tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compares two strings in constant time to prevent timing attacks
pub fn constant_time_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Checks a submitted CSRF token against the expected one.
pub fn verify_csrf(expected: &str, submitted: Option<&str>) -> bool {
    match submitted {
        Some(token) if !expected.is_empty() => constant_time_equal(expected, token),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal("abc", "abc"));
        assert!(!constant_time_equal("abc", "abd"));
        assert!(!constant_time_equal("short", "much_longer_string"));
    }

    #[test]
    fn test_verify_csrf() {
        let token = generate_token();
        assert!(verify_csrf(&token, Some(&token)));
        assert!(!verify_csrf(&token, Some("forged")));
        assert!(!verify_csrf(&token, None));
        assert!(!verify_csrf("", Some("")));
    }
}
