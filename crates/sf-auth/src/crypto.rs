//! Password-at-rest encryption.
//!
//! Account passwords are stored as compact AES-256-GCM blobs bound to
//! the owning account's username via AAD, so a blob copied onto another
//! account record fails to decrypt.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::errors::{AuthError, Result};

const BLOB_VERSION: &str = "v1";

/// AES-256 key, zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

fn aad(username: &str) -> String {
    format!("sf-auth|{BLOB_VERSION}|{username}")
}

/// Encrypt a password into a `v1.<nonce>.<ciphertext>` blob.
pub fn encrypt_password(key: &EncryptionKey, password: &str, username: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(username);
    let ciphertext = cipher
        .encrypt(
            nonce,
            aes_gcm::aead::Payload {
                msg: password.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| AuthError::Crypto(format!("encryption failed: {e}")))?;

    Ok(format!(
        "{BLOB_VERSION}.{}.{}",
        URL_SAFE_NO_PAD.encode(nonce_bytes),
        URL_SAFE_NO_PAD.encode(ciphertext)
    ))
}

/// Decrypt a stored password blob.
pub fn decrypt_password(key: &EncryptionKey, blob: &str, username: &str) -> Result<String> {
    let mut parts = blob.splitn(3, '.');
    let (version, nonce_part, ct_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(v), Some(n), Some(c)) => (v, n, c),
        _ => return Err(AuthError::Crypto("malformed password blob".into())),
    };
    if version != BLOB_VERSION {
        return Err(AuthError::Crypto(format!(
            "unknown password blob version: {version}"
        )));
    }

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(nonce_part)
        .map_err(|e| AuthError::Crypto(format!("invalid nonce: {e}")))?;
    if nonce_bytes.len() != 12 {
        return Err(AuthError::Crypto("invalid nonce length".into()));
    }
    let ciphertext = URL_SAFE_NO_PAD
        .decode(ct_part)
        .map_err(|e| AuthError::Crypto(format!("invalid ciphertext: {e}")))?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let aad = aad(username);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            aes_gcm::aead::Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| AuthError::Crypto("password blob failed to decrypt".into()))?;

    String::from_utf8(plaintext).map_err(|_| AuthError::Crypto("password is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = EncryptionKey::generate();
        let blob = encrypt_password(&key, "hunter2", "worker@example.com").unwrap();
        let back = decrypt_password(&key, &blob, "worker@example.com").unwrap();
        assert_eq!(back, "hunter2");
    }

    #[test]
    fn wrong_key_fails() {
        let blob =
            encrypt_password(&EncryptionKey::generate(), "hunter2", "worker@example.com").unwrap();
        let result = decrypt_password(&EncryptionKey::generate(), &blob, "worker@example.com");
        assert!(matches!(result, Err(AuthError::Crypto(_))));
    }

    #[test]
    fn blob_is_bound_to_username() {
        let key = EncryptionKey::generate();
        let blob = encrypt_password(&key, "hunter2", "a@example.com").unwrap();
        let result = decrypt_password(&key, &blob, "b@example.com");
        assert!(matches!(result, Err(AuthError::Crypto(_))));
    }

    #[test]
    fn malformed_blob_fails() {
        let key = EncryptionKey::generate();
        assert!(decrypt_password(&key, "not-a-blob", "a@example.com").is_err());
        assert!(decrypt_password(&key, "v2.a.b", "a@example.com").is_err());
    }
}
