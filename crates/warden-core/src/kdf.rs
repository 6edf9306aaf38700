//! Key derivation functions
//!
//! `derive_key` — Argon2id, stretches a user password into the 32-byte root
//!   key that protects envelope contents. Deliberately slow and memory-hard;
//!   callers on an async path should run it under `spawn_blocking`.
//!
//! `derive_node_key` — HKDF-SHA256, fans one root signing key out into an
//!   independent-looking subkey per guardian node.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64 MiB
pub const KDF_PARALLELISM: u32 = 4;
pub const DERIVED_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

/// HKDF context label for per-node subkeys. Changing this invalidates every
/// derived node key, so it is versioned.
const NODE_KEY_INFO: &[u8] = b"warden-node-key-v1";

fn argon2_params() -> Result<Params> {
    Params::new(
        KDF_MEMORY_COST,
        KDF_TIME_COST,
        KDF_PARALLELISM,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| VaultError::KeyDerivation(e.to_string()))
}

/// Derive the 32-byte root key from a password + 16-byte salt.
/// Deterministic for a given (password, salt) pair; the salt is stored in the
/// envelope and is not secret.
pub fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let argon = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params()?);
    let mut key = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// Expand a root signing key into a per-node subkey, using the node id as the
/// HKDF salt. Distinct node ids yield unlinkable outputs, so one root key can
/// fan out per-guardian authorisation material without key reuse.
pub fn derive_node_key(root_key: &[u8], node_id: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(node_id.as_bytes()), root_key);
    let mut out = [0u8; 32];
    hk.expand(NODE_KEY_INFO, &mut out)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    Ok(out)
}

/// Fresh random envelope salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = derive_key("hunter2", &salt).unwrap();
        let b = derive_key("hunter2", &salt).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn derive_key_is_salt_sensitive() {
        let a = derive_key("hunter2", &[1u8; SALT_LEN]).unwrap();
        let b = derive_key("hunter2", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn node_keys_differ_per_node() {
        let root = [9u8; 32];
        let a = derive_node_key(&root, "node-a").unwrap();
        let b = derive_node_key(&root, "node-b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn node_key_is_deterministic() {
        let root = [9u8; 32];
        assert_eq!(
            derive_node_key(&root, "node-a").unwrap(),
            derive_node_key(&root, "node-a").unwrap()
        );
    }
}
