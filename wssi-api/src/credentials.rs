//! API keys, session tokens and password hashing

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use wssi_common::Tier;

/// Rounds of SHA-256 applied to salted passwords
const PASSWORD_ROUNDS: u32 = 10_000;

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// New subscriber key: `wssi-<tier>-<token>`
pub fn generate_api_key(tier: Tier) -> String {
    format!("wssi-{}-{}", tier.as_str(), random_token(32))
}

/// New admin key: `wssi-admin-<token>`
pub fn generate_admin_key() -> String {
    format!("wssi-admin-{}", random_token(32))
}

/// Opaque access/refresh token handed to the web client
pub fn generate_session_token() -> String {
    random_token(32)
}

/// SHA-256 hex digest; the only form in which keys and tokens are stored
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// First characters of a hash, for logs
pub fn hash_prefix(hash: &str) -> &str {
    hash.char_indices().nth(12).map_or(hash, |(end, _)| &hash[..end])
}

pub fn generate_salt() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Iterated, salted SHA-256 of `password`, hex encoded
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..PASSWORD_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }
    hex::encode(digest)
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let computed = hash_password(password, salt);
    computed.as_bytes().ct_eq(expected_hash.as_bytes()).into()
}

/// At least 8 characters, one letter and one digit
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters");
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain a letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit");
    }
    Ok(())
}

/// Lowercased, trimmed address if it looks deliverable
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.contains('@') {
        return None;
    }
    let (host, tld) = domain.rsplit_once('.')?;
    if host.is_empty() || tld.len() < 2 {
        return None;
    }
    Some(email)
}

/// Constant-time comparison of a presented secret against the configured one
pub fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_format() {
        let key = generate_api_key(Tier::Basic);
        assert!(key.starts_with("wssi-basic-"));
        // 32 bytes base64url without padding
        assert_eq!(key.len(), "wssi-basic-".len() + 43);
        assert_ne!(key, generate_api_key(Tier::Basic));
        assert!(generate_admin_key().starts_with("wssi-admin-"));
    }

    #[test]
    fn test_hash_key_is_sha256_hex() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_prefix(&hash_key("abc")), "ba7816bf8f01");
    }

    #[test]
    fn test_password_round_trip() {
        let salt = generate_salt();
        assert_eq!(salt.len(), 32);
        let hash = hash_password("ValidPass123", &salt);
        assert!(verify_password("ValidPass123", &salt, &hash));
        assert!(!verify_password("ValidPass124", &salt, &hash));
        assert_ne!(hash, hash_password("ValidPass123", &generate_salt()));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("ValidPass123").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("allletters").is_err());
        assert!(validate_password("1234567890").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" User@Example.COM ").as_deref(), Some("user@example.com"));
        assert!(normalize_email("no-at-sign").is_none());
        assert!(normalize_email("a@b").is_none());
        assert!(normalize_email("a@@b.com").is_none());
        assert!(normalize_email("@example.com").is_none());
        assert!(normalize_email("a b@example.com").is_none());
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secret", "secret2"));
        assert!(!token_matches("", "secret"));
    }

    #[test]
    fn test_hash_prefix_respects_char_boundaries() {
        let hash = hash_key("wssi-pro-abc");
        assert_eq!(hash_prefix(&hash), &hash[..12]);
        assert_eq!(hash_prefix("short"), "short");
        assert_eq!(hash_prefix("ééééééééééééé"), "éééééééééééé");
        assert_eq!(hash_prefix("cus_✓✓✓✓✓✓✓✓✓✓✓"), "cus_✓✓✓✓✓✓✓✓");
    }
}
