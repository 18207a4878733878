//! Bearer-token authentication for the update endpoint.
//!
//! The caller presents `Authorization: Bearer <token>`.  The token is
//! compared against the configured secret with [`subtle`] so that the
//! time taken does not depend on where the first mismatching byte is.

use std::sync::LazyLock;

use regex::Regex;
use subtle::ConstantTimeEq;

static BEARER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bearer\s+([A-Za-z0-9]+)$").expect("bearer pattern compiles"));

/// Checks `Authorization` header values against the shared secret.
pub struct TokenAuthenticator {
    secret: Vec<u8>,
}

impl TokenAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Returns `true` only for a well-formed bearer header carrying the
    /// configured secret.  Anything else, including a missing header, is
    /// simply unauthorized.
    pub fn authorize(&self, header: Option<&str>) -> bool {
        match header.and_then(bearer_token) {
            Some(token) => constant_time_eq(token.as_bytes(), &self.secret),
            None => false,
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    BEARER
        .captures(header.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// Lengths are not secret; only the content comparison must not short-circuit.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3tT0kenValue0001";

    #[test]
    fn accepts_matching_token() {
        let auth = TokenAuthenticator::new(SECRET);
        assert!(auth.authorize(Some(&format!("Bearer {SECRET}"))));
    }

    #[test]
    fn rejects_missing_header() {
        let auth = TokenAuthenticator::new(SECRET);
        assert!(!auth.authorize(None));
        assert!(!auth.authorize(Some("")));
    }

    #[test]
    fn rejects_equal_length_mismatch_at_any_position() {
        let auth = TokenAuthenticator::new(SECRET);
        for i in 0..SECRET.len() {
            let mut forged = SECRET.as_bytes().to_vec();
            forged[i] = if forged[i] == b'x' { b'y' } else { b'x' };
            let forged = String::from_utf8(forged).unwrap();
            assert_eq!(forged.len(), SECRET.len());
            assert!(!auth.authorize(Some(&format!("Bearer {forged}"))));
        }
    }

    #[test]
    fn rejects_prefix_and_extension_of_secret() {
        let auth = TokenAuthenticator::new(SECRET);
        assert!(!auth.authorize(Some(&format!("Bearer {}", &SECRET[..10]))));
        assert!(!auth.authorize(Some(&format!("Bearer {SECRET}0"))));
    }

    #[test]
    fn rejects_malformed_headers() {
        let auth = TokenAuthenticator::new(SECRET);
        assert!(!auth.authorize(Some(SECRET)));
        assert!(!auth.authorize(Some(&format!("bearer {SECRET}"))));
        assert!(!auth.authorize(Some(&format!("Basic {SECRET}"))));
        assert!(!auth.authorize(Some(&format!("Bearer {SECRET}-extra"))));
        assert!(!auth.authorize(Some("Bearer ")));
    }

    #[test]
    fn extracts_alphanumeric_token() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("  Bearer   abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Bearer abc_123"), None);
    }
}
