use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

/// Record kinds stored by the vault, one subdirectory per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Guardian,
    Token,
    Key,
}

impl RecordKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            RecordKind::User => "users",
            RecordKind::Guardian => "guardians",
            RecordKind::Token => "tokens",
            RecordKind::Key => "keys",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordKind::User => "user",
            RecordKind::Guardian => "guardian",
            RecordKind::Token => "token",
            RecordKind::Key => "key",
        };
        f.write_str(name)
    }
}

/// Unified error taxonomy for the vault and its remote collaborator.
///
/// Secrets (passwords, decrypted keys) must never appear in any variant's
/// message. `Decryption` deliberately carries no detail.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{kind} record not found: {key}")]
    NotFound { kind: RecordKind, key: String },

    #[error("integrity check failed for key record {key} (checksum mismatch — possible tampering)")]
    Integrity { key: String },

    #[error("decryption failed (wrong password or corrupted envelope)")]
    Decryption,

    #[error("invalid record key {0:?}: must be non-empty with no path separators")]
    InvalidRecordKey(String),

    #[error("a guardian of type owner already exists ({node_id})")]
    OwnerExists { node_id: String },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("guardian service rejected the request ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("transport failure reaching the guardian service: {0}")]
    Transport(String),

    #[error("guardian service request timed out")]
    Timeout,

    #[error("cannot determine vault data directory")]
    VaultDir,

    #[error("serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("vault i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Transport-class failures the caller may retry. Remote rejections are
    /// deliberate answers and are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::Transport(_) | VaultError::Timeout)
    }
}
