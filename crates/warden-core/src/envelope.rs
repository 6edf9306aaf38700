//! Password-based envelope encryption
//!
//! AES-256-GCM. IV: 12 bytes (random per call). Tag: 16 bytes, stored
//! separately. Salt: 16 bytes, feeds the Argon2id derivation. The AEAD key is
//! SHA-256 of the Argon2 output, decoupling the cipher key length from the
//! KDF output length. All binary fields are base64 on disk.
//!
//! A fresh random IV is generated on every `encrypt` call; reusing an IV
//! under the same key breaks GCM entirely.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::kdf;

pub const ENVELOPE_ALGORITHM: &str = "aes-256-gcm";
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Self-describing encrypted container for one secret value. Immutable once
/// written; updates replace the persisted file, never mutate in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub salt: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

/// Hash the Argon2 output down to the fixed AEAD key size.
fn aead_key(root_key: &[u8]) -> Zeroizing<[u8; 32]> {
    let digest = Sha256::digest(root_key);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest);
    key
}

/// Encrypt `secret` under `password` with a fresh salt and a fresh IV.
pub fn encrypt(secret: &[u8], password: &str) -> Result<EncryptedEnvelope> {
    let salt = kdf::generate_salt();
    let root_key = kdf::derive_key(password, &salt)?;
    let key = aead_key(root_key.as_ref());

    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|_| VaultError::Crypto("aead key setup".into()))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), secret)
        .map_err(|_| VaultError::Crypto("aead encrypt".into()))?;
    // aes-gcm appends the tag; split it into its own field
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedEnvelope {
        ciphertext: B64.encode(&sealed),
        iv: B64.encode(iv),
        auth_tag: B64.encode(&tag),
        salt: B64.encode(salt),
        algorithm: ENVELOPE_ALGORITHM.to_string(),
        created_at: Utc::now(),
    })
}

/// Decrypt an envelope. The only exposed failure mode is
/// [`VaultError::Decryption`] — wrong password, corrupted data, and malformed
/// fields all collapse into it so callers cannot branch on cipher internals.
pub fn decrypt(envelope: &EncryptedEnvelope, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(VaultError::Decryption);
    }
    let ciphertext = decode_field(&envelope.ciphertext)?;
    let iv = decode_field(&envelope.iv)?;
    let tag = decode_field(&envelope.auth_tag)?;
    let salt = decode_field(&envelope.salt)?;
    if iv.len() != IV_LEN || tag.len() != TAG_LEN || salt.len() != kdf::SALT_LEN {
        return Err(VaultError::Decryption);
    }

    let root_key = kdf::derive_key(password, &salt)?;
    let key = aead_key(root_key.as_ref());
    let cipher = Aes256Gcm::new_from_slice(key.as_ref()).map_err(|_| VaultError::Decryption)?;

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
        .map_err(|_| VaultError::Decryption)?;
    Ok(Zeroizing::new(plaintext))
}

/// `encrypt` on a blocking worker thread, keeping async callers responsive
/// while Argon2 runs.
pub async fn encrypt_off_thread(secret: Vec<u8>, password: String) -> Result<EncryptedEnvelope> {
    let secret = Zeroizing::new(secret);
    tokio::task::spawn_blocking(move || encrypt(&secret, &password))
        .await
        .map_err(|e| VaultError::Crypto(format!("blocking task failed: {e}")))?
}

/// `decrypt` on a blocking worker thread.
pub async fn decrypt_off_thread(
    envelope: EncryptedEnvelope,
    password: String,
) -> Result<Zeroizing<Vec<u8>>> {
    tokio::task::spawn_blocking(move || decrypt(&envelope, &password))
        .await
        .map_err(|e| VaultError::Crypto(format!("blocking task failed: {e}")))?
}

fn decode_field(value: &str) -> Result<Vec<u8>> {
    B64.decode(value).map_err(|_| VaultError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let secret = b"root signing key material";
        let envelope = encrypt(secret, "correct horse battery staple").unwrap();
        assert_eq!(envelope.algorithm, ENVELOPE_ALGORITHM);
        let plain = decrypt(&envelope, "correct horse battery staple").unwrap();
        assert_eq!(plain.as_slice(), secret);
    }

    #[test]
    fn wrong_password_is_decryption_error() {
        let envelope = encrypt(b"secret", "pw1").unwrap();
        let err = decrypt(&envelope, "pw2").unwrap_err();
        assert!(matches!(err, VaultError::Decryption));
    }

    #[test]
    fn iv_is_fresh_per_call() {
        let a = encrypt(b"same secret", "pw").unwrap();
        let b = encrypt(b"same secret", "pw").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let mut envelope = encrypt(b"secret", "pw").unwrap();
        let mut raw = B64.decode(&envelope.ciphertext).unwrap();
        raw[0] ^= 0x01;
        envelope.ciphertext = B64.encode(&raw);
        assert!(matches!(
            decrypt(&envelope, "pw").unwrap_err(),
            VaultError::Decryption
        ));
    }

    #[tokio::test]
    async fn off_thread_roundtrip() {
        let envelope = encrypt_off_thread(b"secret".to_vec(), "pw".into())
            .await
            .unwrap();
        let plain = decrypt_off_thread(envelope, "pw".into()).await.unwrap();
        assert_eq!(plain.as_slice(), b"secret");
    }
}
