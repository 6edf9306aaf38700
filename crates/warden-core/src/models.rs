//! Vault record types
//!
//! Guardian, user, token, and key records — one JSON file each in the vault.
//! Guardian `type` is a closed enum; unknown strings are rejected at
//! deserialisation rather than flowing through as unrecognised values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EncryptedEnvelope;

// ── Guardians ─────────────────────────────────────────────────────────────────

/// Closed set of guardian types. `Owner` is the user's own primary device;
/// `Gridlock` is the network operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianKind {
    Owner,
    Local,
    Social,
    Cloud,
    Gridlock,
    Partner,
}

impl std::fmt::Display for GuardianKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GuardianKind::Owner => "owner",
            GuardianKind::Local => "local",
            GuardianKind::Social => "social",
            GuardianKind::Cloud => "cloud",
            GuardianKind::Gridlock => "gridlock",
            GuardianKind::Partner => "partner",
        };
        f.write_str(name)
    }
}

/// One party holding a share of the user's signing authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianRecord {
    pub node_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: GuardianKind,
    /// base64url X25519 public key for sealed delivery
    pub public_key: String,
    pub active: bool,
}

// ── Users ─────────────────────────────────────────────────────────────────────

/// Local view of one user account. Superseded wholesale on every successful
/// login or recovery — last write wins, no merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    /// node id of the owner guardian
    pub owner_guardian: String,
    /// ordered guardian node ids forming the node pool
    pub node_pool: Vec<String>,
}

// ── Tokens ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Session tokens for one email, replaced on every login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access: AuthToken,
    pub refresh: AuthToken,
}

// ── Keys ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Identity,
    Signing,
    Public,
    Private,
    Seed,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Identity => "identity",
            KeyType::Signing => "signing",
            KeyType::Public => "public",
            KeyType::Private => "private",
            KeyType::Seed => "seed",
        }
    }
}

/// An encrypted envelope plus a checksum over its canonical serialisation,
/// persisted together. The checksum is BLAKE3; verification happens on load
/// and a mismatch aborts the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRecord {
    pub envelope: EncryptedEnvelope,
    pub checksum: String,
}

impl KeyRecord {
    pub fn new(envelope: EncryptedEnvelope) -> Self {
        let checksum = envelope_checksum(&envelope);
        Self { envelope, checksum }
    }

    pub fn verify(&self) -> bool {
        // Constant-time not required: the checksum guards against corruption,
        // not against an adversary with a secret to probe.
        envelope_checksum(&self.envelope) == self.checksum
    }
}

/// BLAKE3 hex digest of the envelope's canonical JSON. Field ordering MUST be
/// stable (serde_json sorts map keys alphabetically with `json!`).
pub fn envelope_checksum(envelope: &EncryptedEnvelope) -> String {
    let canonical = serde_json::json!({
        "algorithm": envelope.algorithm,
        "authTag": envelope.auth_tag,
        "ciphertext": envelope.ciphertext,
        "createdAt": envelope.created_at.to_rfc3339(),
        "iv": envelope.iv,
        "salt": envelope.salt,
    });
    let bytes = serde_json::to_vec(&canonical).expect("static json shape");
    blake3::hash(&bytes).to_hex().to_string()
}
