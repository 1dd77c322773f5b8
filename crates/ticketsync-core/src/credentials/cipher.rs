//! AES-256-GCM protection for stored mailbox secrets.
//!
//! Secrets are stored as two base64 strings: the ciphertext (with the GCM
//! tag appended) and the 96-bit nonce used as IV.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Nonce size for AES-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256.
const KEY_SIZE: usize = 32;

/// Encrypts and decrypts mailbox secrets with a configured key.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Creates a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is not valid base64 or not 32 bytes.
    pub fn from_base64_key(key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| Error::Config(format!("encryption key is not valid base64: {e}")))?;
        if bytes.len() != KEY_SIZE {
            return Err(Error::Config(format!(
                "encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|e| Error::Config(format!("invalid encryption key: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// Returns `(ciphertext, iv)`, both base64.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cipher`] if encryption fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<(String, String)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Cipher(format!("encryption failed: {e}")))?;

        Ok((BASE64.encode(ciphertext), BASE64.encode(nonce_bytes)))
    }

    /// Decrypts a base64 ciphertext with its base64 IV.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cipher`] on malformed input, a wrong key, tampered
    /// data or a plaintext that is not UTF-8.
    pub fn decrypt(&self, ciphertext: &str, iv: &str) -> Result<String> {
        let ciphertext = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| Error::Cipher(format!("ciphertext is not valid base64: {e}")))?;
        let nonce_bytes = BASE64
            .decode(iv.trim())
            .map_err(|e| Error::Cipher(format!("IV is not valid base64: {e}")))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(Error::Cipher(format!(
                "IV must be {NONCE_SIZE} bytes, got {}",
                nonce_bytes.len()
            )));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| Error::Cipher("decryption failed (wrong key or corrupted data)".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::Cipher(format!("decrypted secret is not UTF-8: {e}")))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn key(byte: u8) -> String {
        BASE64.encode([byte; KEY_SIZE])
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = SecretCipher::from_base64_key(&key(7)).unwrap();
        let (ct, iv) = cipher.encrypt("app-password").unwrap();
        assert_ne!(ct, "app-password");
        assert_eq!(cipher.decrypt(&ct, &iv).unwrap(), "app-password");
    }

    #[test]
    fn test_nonce_is_fresh() {
        let cipher = SecretCipher::from_base64_key(&key(7)).unwrap();
        let (_, iv1) = cipher.encrypt("x").unwrap();
        let (_, iv2) = cipher.encrypt("x").unwrap();
        assert_ne!(iv1, iv2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ct, iv) = SecretCipher::from_base64_key(&key(1))
            .unwrap()
            .encrypt("secret")
            .unwrap();
        let other = SecretCipher::from_base64_key(&key(2)).unwrap();
        assert!(matches!(other.decrypt(&ct, &iv), Err(Error::Cipher(_))));
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(matches!(
            SecretCipher::from_base64_key("not base64!"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SecretCipher::from_base64_key(&BASE64.encode([0u8; 16])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_bad_iv_rejected() {
        let cipher = SecretCipher::from_base64_key(&key(3)).unwrap();
        let (ct, _) = cipher.encrypt("secret").unwrap();
        assert!(cipher.decrypt(&ct, &BASE64.encode([0u8; 4])).is_err());
        assert!(cipher.decrypt("%%%", "%%%").is_err());
    }
}
