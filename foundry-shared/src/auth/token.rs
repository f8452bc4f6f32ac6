/// Opaque random tokens
///
/// Refresh tokens (sessions) and verification links (password reset, email
/// verification) are random strings handed to the client once. Only their
/// SHA-256 hash is stored, so a database leak does not leak usable tokens.
///
/// # Format
///
/// `{prefix}{40 base62 chars}`; `fds_` for sessions and `fdv_` for
/// verification links.
///
/// ```
/// use foundry_shared::auth::token::{generate_token, hash_token, SESSION_PREFIX};
///
/// let (token, hash) = generate_token(SESSION_PREFIX);
/// assert!(token.starts_with("fds_"));
/// assert_eq!(hash, hash_token(&token));
/// assert_eq!(hash.len(), 64);
/// ```

use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix of session refresh tokens
pub const SESSION_PREFIX: &str = "fds_";

/// Prefix of verification tokens
pub const VERIFICATION_PREFIX: &str = "fdv_";

/// Length of the random part (characters)
const TOKEN_RANDOM_LENGTH: usize = 40;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a token with the given prefix, returning `(plaintext, sha256_hex)`
pub fn generate_token(prefix: &str) -> (String, String) {
    let mut rng = rand::thread_rng();

    let random: String = (0..TOKEN_RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();

    let token = format!("{}{}", prefix, random);
    let hash = hash_token(&token);

    (token, hash)
}

/// SHA-256 hex digest of a token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cheap structural check before any database lookup
pub fn validate_token_format(token: &str, prefix: &str) -> bool {
    match token.strip_prefix(prefix) {
        Some(random) => {
            random.len() == TOKEN_RANDOM_LENGTH && random.bytes().all(|b| b.is_ascii_alphanumeric())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let (token, hash) = generate_token(VERIFICATION_PREFIX);

        assert!(token.starts_with(VERIFICATION_PREFIX));
        assert_eq!(token.len(), VERIFICATION_PREFIX.len() + TOKEN_RANDOM_LENGTH);
        assert_eq!(hash, hash_token(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        let (a, _) = generate_token(SESSION_PREFIX);
        let (b, _) = generate_token(SESSION_PREFIX);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let hash = hash_token("fds_example");
        assert_eq!(hash, hash_token("fds_example"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_validate_token_format() {
        let (token, _) = generate_token(SESSION_PREFIX);
        assert!(validate_token_format(&token, SESSION_PREFIX));

        // Wrong prefix
        assert!(!validate_token_format(&token, VERIFICATION_PREFIX));
        // Truncated
        assert!(!validate_token_format(&token[..20], SESSION_PREFIX));
        // Non-alphanumeric
        let tampered = format!("{}{}", SESSION_PREFIX, "!".repeat(TOKEN_RANDOM_LENGTH));
        assert!(!validate_token_format(&tampered, SESSION_PREFIX));
    }
}
