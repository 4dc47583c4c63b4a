//! Authenticated encryption for session tokens.
//!
//! Tokens are `base64url(nonce || ciphertext)` where the ciphertext is
//! AES-256-GCM over the JSON payload. The key is the SHA-256 digest of the
//! configured secret, so any secret length works.

use crate::error::{DbError, DbResult};
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Clone)]
pub struct SessionCipher {
    cipher: Aes256Gcm,
}

impl SessionCipher {
    pub fn new(secret: &[u8]) -> Self {
        let key: [u8; 32] = Sha256::digest(secret).into();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Encrypt `value` into an opaque URL-safe token.
    pub fn seal<T: Serialize>(&self, value: &T) -> DbResult<String> {
        let plaintext = serde_json::to_vec(value)
            .map_err(|e| DbError::unknown(format!("Failed to encode session: {}", e)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| DbError::unknown("Failed to encrypt session"))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Decrypt and decode a token produced by `seal`.
    ///
    /// Fails on malformed base64, truncated input, a wrong key or any
    /// tampering with the ciphertext.
    pub fn open<T: DeserializeOwned>(&self, token: &str) -> DbResult<T> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| DbError::invalid_input("Malformed session token"))?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(DbError::invalid_input("Malformed session token"));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DbError::invalid_input("Session token failed authentication"))?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| DbError::invalid_input(format!("Invalid session payload: {}", e)))
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
