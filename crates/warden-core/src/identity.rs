//! Identity key material
//!
//! Each guardian owns one X25519 `IdentityKeyPair`, used to receive sealed
//! payloads (node signing keys, recovery material) addressed to it. The root
//! signing key is an independent 32-byte random secret; per-node subkeys are
//! derived from it in `kdf`.
//!
//! All randomness comes from the OS CSPRNG. Hard requirement, not style.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

// ── Public key newtype ────────────────────────────────────────────────────────

/// 32-byte X25519 public key, base64url-encoded on the wire and in records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| VaultError::InvalidKey(format!("bad public key encoding: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn as_x25519(&self) -> X25519Public {
        X25519Public::from(self.0)
    }

    /// Human-readable fingerprint: BLAKE3 of the key, truncated to 20 bytes,
    /// hex in groups of 4 for display.
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// X25519 keypair for sealed-message delivery. Drop clears the secret half.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .field("secret_bytes", &"<redacted>")
            .finish()
    }
}

impl IdentityKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Self {
            public,
            secret_bytes: secret.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::InvalidKey("identity key must be 32 bytes".into()))?;
        let secret = StaticSecret::from(arr);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Ok(Self {
            public,
            secret_bytes: arr,
        })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub fn secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret_bytes)
    }

    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

/// Fresh random root signing secret, independent of any keypair. Input to
/// per-node derivation, never used directly as a cipher key.
pub fn generate_signing_key() -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    OsRng.fill_bytes(key.as_mut());
    key
}
