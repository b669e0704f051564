use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use crate::error::{AppError, Result};

const NONCE_LEN: usize = 12;

/// Symmetric cipher for bank account numbers at rest.
///
/// Ciphertext layout is `base64(nonce || sealed)` with a random 12-byte
/// nonce per encryption, so identical account numbers never produce
/// identical ciphertext.
#[derive(Clone)]
pub struct AccountCipher {
    cipher: ChaCha20Poly1305,
}

impl AccountCipher {
    /// Build from a base64-encoded 32-byte key (as supplied via config).
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Crypto(format!("cipher key is not valid base64: {}", e)))?;
        if key_bytes.len() != 32 {
            return Err(AppError::Crypto(format!(
                "cipher key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Crypto("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let raw = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Crypto(format!("ciphertext is not valid base64: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(AppError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| AppError::Crypto("decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::Crypto("decrypted payload is not UTF-8".to_string()))
    }

    /// Generate a fresh base64 key, for provisioning and tests.
    pub fn generate_key() -> String {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = AccountCipher::from_base64_key(&AccountCipher::generate_key()).unwrap();
        let encrypted = cipher.encrypt("000123456789").unwrap();
        assert_ne!(encrypted, "000123456789");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "000123456789");
    }

    #[test]
    fn nonce_makes_ciphertext_unique() {
        let cipher = AccountCipher::from_base64_key(&AccountCipher::generate_key()).unwrap();
        let a = cipher.encrypt("000123456789").unwrap();
        let b = cipher.encrypt("000123456789").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_wrong_key() {
        let cipher = AccountCipher::from_base64_key(&AccountCipher::generate_key()).unwrap();
        let other = AccountCipher::from_base64_key(&AccountCipher::generate_key()).unwrap();
        let encrypted = cipher.encrypt("000123456789").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        let short = BASE64.encode([0u8; 16]);
        assert!(AccountCipher::from_base64_key(&short).is_err());
    }
}
