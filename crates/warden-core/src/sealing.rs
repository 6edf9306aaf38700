//! End-to-end message sealing
//!
//! Public-key authenticated encryption of short payloads addressed to one
//! guardian's X25519 public key. An ephemeral keypair performs the DH, the
//! shared secret is expanded with HKDF-SHA256, and the payload is encrypted
//! with XChaCha20-Poly1305.
//!
//! Wire format:
//!   [ nonce (24 bytes) | ephemeral public key (32 bytes) | ciphertext + tag ]
//!
//! The nonce sits first at a fixed length so `unseal` splits
//! deterministically. Failed authentication is an expected, recoverable event
//! (wrong recipient key), so `unseal` returns `None` rather than an error.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    XChaCha20Poly1305,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};
use crate::identity::PublicKeyBytes;
use crate::kdf;
use crate::models::GuardianRecord;

pub const NONCE_LEN: usize = 24;
pub const EPK_LEN: usize = 32;
const SEAL_INFO: &[u8] = b"warden-seal-v1";

/// Derive the sealing key from the DH output, bound to both public keys so a
/// transplanted ciphertext cannot be re-addressed.
fn sealing_key(
    shared: &[u8],
    ephemeral_pk: &[u8; 32],
    recipient_pk: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_pk);
    salt[32..].copy_from_slice(recipient_pk);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(SEAL_INFO, key.as_mut())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Seal `plaintext` to a recipient public key.
pub fn seal(plaintext: &[u8], recipient: &PublicKeyBytes) -> Result<Vec<u8>> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_pk = X25519Public::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&recipient.as_x25519());
    let key = sealing_key(shared.as_bytes(), &ephemeral_pk, &recipient.0)?;

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_ref())
        .map_err(|_| VaultError::Crypto("sealing key setup".into()))?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| VaultError::Crypto("seal encrypt".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + EPK_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ephemeral_pk);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed message with the recipient's secret key. Returns `None` when
/// authentication fails — never a panic, never wrong plaintext.
pub fn unseal(sealed: &[u8], recipient_secret: &StaticSecret) -> Option<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_LEN + EPK_LEN {
        return None;
    }
    let (nonce_bytes, rest) = sealed.split_at(NONCE_LEN);
    let (epk_bytes, ciphertext) = rest.split_at(EPK_LEN);

    let ephemeral_pk: [u8; 32] = epk_bytes.try_into().ok()?;
    let recipient_pk = X25519Public::from(recipient_secret).to_bytes();
    let shared = recipient_secret.diffie_hellman(&X25519Public::from(ephemeral_pk));
    let key = sealing_key(shared.as_bytes(), &ephemeral_pk, &recipient_pk).ok()?;

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_ref()).ok()?;
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);
    let plaintext = cipher.decrypt(nonce, ciphertext).ok()?;
    Some(Zeroizing::new(plaintext))
}

// ── Node-key fan-out ──────────────────────────────────────────────────────────

/// One derived node signing key, sealed for a specific guardian.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedNodeKey {
    pub node_id: String,
    /// base64 of the sealed wire bytes
    pub payload: String,
}

/// Derive one subkey per guardian from the root signing key and seal each to
/// that guardian's public key.
pub fn seal_node_keys(root_key: &[u8], guardians: &[GuardianRecord]) -> Result<Vec<SealedNodeKey>> {
    use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
    let mut out = Vec::with_capacity(guardians.len());
    for guardian in guardians {
        let node_key = Zeroizing::new(kdf::derive_node_key(root_key, &guardian.node_id)?);
        let recipient = PublicKeyBytes::from_b64(&guardian.public_key)?;
        let sealed = seal(node_key.as_ref(), &recipient)?;
        out.push(SealedNodeKey {
            node_id: guardian.node_id.clone(),
            payload: B64.encode(sealed),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityKeyPair;
    use crate::models::GuardianKind;

    #[test]
    fn seal_unseal_roundtrip() {
        let pair = IdentityKeyPair::generate();
        let sealed = seal(b"node signing key", &pair.public).unwrap();
        let opened = unseal(&sealed, &pair.secret()).unwrap();
        assert_eq!(opened.as_slice(), b"node signing key");
    }

    #[test]
    fn mismatched_key_returns_none() {
        let alice = IdentityKeyPair::generate();
        let mallory = IdentityKeyPair::generate();
        let sealed = seal(b"secret", &alice.public).unwrap();
        assert!(unseal(&sealed, &mallory.secret()).is_none());
    }

    #[test]
    fn truncated_message_returns_none() {
        let pair = IdentityKeyPair::generate();
        let sealed = seal(b"secret", &pair.public).unwrap();
        assert!(unseal(&sealed[..NONCE_LEN + 4], &pair.secret()).is_none());
    }

    #[test]
    fn sealed_payloads_are_nondeterministic() {
        let pair = IdentityKeyPair::generate();
        let a = seal(b"secret", &pair.public).unwrap();
        let b = seal(b"secret", &pair.public).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn node_key_fanout_unseals_to_derived_key() {
        use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
        let root = *identity_root();
        let g1 = guardian_with_keys("node-1");
        let g2 = guardian_with_keys("node-2");
        let guardians = vec![g1.0.clone(), g2.0.clone()];

        let sealed = seal_node_keys(&root, &guardians).unwrap();
        assert_eq!(sealed.len(), 2);

        for (record, pair) in [(g1.0, g1.1), (g2.0, g2.1)] {
            let entry = sealed.iter().find(|s| s.node_id == record.node_id).unwrap();
            let wire = B64.decode(&entry.payload).unwrap();
            let opened = unseal(&wire, &pair.secret()).unwrap();
            let expected = kdf::derive_node_key(&root, &record.node_id).unwrap();
            assert_eq!(opened.as_slice(), &expected);
        }
    }

    fn identity_root() -> Zeroizing<[u8; 32]> {
        crate::identity::generate_signing_key()
    }

    fn guardian_with_keys(node_id: &str) -> (GuardianRecord, IdentityKeyPair) {
        let pair = IdentityKeyPair::generate();
        let record = GuardianRecord {
            node_id: node_id.to_string(),
            name: format!("guardian {node_id}"),
            kind: GuardianKind::Cloud,
            public_key: pair.public_b64(),
            active: true,
        };
        (record, pair)
    }
}
