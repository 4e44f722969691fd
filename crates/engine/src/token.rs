//! Capability token generation and verification.

use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A freshly issued capability token.
///
/// The plaintext is surfaced to the caller exactly once, at creation; only
/// the hash is ever persisted or logged.
pub struct IssuedToken {
    pub plaintext: String,
    pub hash: String,
}

/// Generates and verifies edit/delete capability tokens.
pub struct TokenService {
    /// Hash of a random secret nobody holds. Mutations on a nonexistent
    /// paste verify the presented token against this, so absence and
    /// wrong-token are indistinguishable in timing and error shape.
    dummy_hash: String,
}

impl TokenService {
    /// Create a new token service.
    pub fn new() -> Self {
        Self {
            dummy_hash: hash_token(&random_secret()),
        }
    }

    /// Issue a new token: 256 bits of randomness as the plaintext, SHA-256
    /// hex as the stored hash.
    pub fn generate(&self) -> IssuedToken {
        let plaintext = random_secret();
        let hash = hash_token(&plaintext);
        IssuedToken { plaintext, hash }
    }

    /// Verify a plaintext token against a stored hash in constant time.
    ///
    /// Malformed stored hashes verify false rather than erroring.
    pub fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        let computed = Sha256::digest(plaintext.as_bytes());
        let Ok(stored) = hex::decode(stored_hash) else {
            return false;
        };
        if stored.len() != computed.len() {
            return false;
        }
        computed.as_slice().ct_eq(&stored).into()
    }

    /// Burn a verification against the dummy hash. Always false; exists so
    /// the missing-record path does the same work as the wrong-token path.
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        self.verify(plaintext, &self.dummy_hash)
    }
}

impl Default for TokenService {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a random token secret using a cryptographically secure RNG.
fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token for storage.
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_verifies() {
        let tokens = TokenService::new();
        let issued = tokens.generate();

        assert!(tokens.verify(&issued.plaintext, &issued.hash));
        assert!(!tokens.verify("not-the-token", &issued.hash));
    }

    #[test]
    fn test_tokens_are_unique_and_high_entropy() {
        let tokens = TokenService::new();
        let a = tokens.generate();
        let b = tokens.generate();

        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
        // 32 bytes of base64url without padding.
        assert_eq!(a.plaintext.len(), 43);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_malformed_stored_hash_verifies_false() {
        let tokens = TokenService::new();
        assert!(!tokens.verify("whatever", "not-hex"));
        assert!(!tokens.verify("whatever", "abcd"));
        assert!(!tokens.verify("whatever", ""));
    }

    #[test]
    fn test_dummy_verification_never_succeeds() {
        let tokens = TokenService::new();
        let issued = tokens.generate();
        assert!(!tokens.verify_dummy(&issued.plaintext));
        assert!(!tokens.verify_dummy(""));
    }

    #[test]
    fn test_plaintext_never_equals_hash() {
        let tokens = TokenService::new();
        let issued = tokens.generate();
        assert_ne!(issued.plaintext, issued.hash);
    }
}
