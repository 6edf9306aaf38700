//! File-per-record vault storage
//!
//! Layout under the vault root:
//!   users/<email>.json
//!   guardians/<node_id>.json
//!   tokens/<email>.json
//!   keys/<identifier>.<key_type>.json
//!   staging/            (atomic-write scratch space)
//!
//! Every save is write-to-staging + fsync + rename, so a crash mid-write can
//! never leave a half-written record. Directories are created idempotently
//! with owner-only permissions; record files are 0o600 on unix. Natural keys
//! are validated before they touch a path.
//!
//! Concurrent invocations against the same identifier are unsupported;
//! distinct commands target distinct files.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::EncryptedEnvelope;
use crate::error::{RecordKind, Result, VaultError};
use crate::models::{GuardianKind, GuardianRecord, KeyRecord, KeyType, TokenPair, UserRecord};

pub struct VaultStore {
    root: PathBuf,
    staging_root: PathBuf,
}

impl VaultStore {
    /// Open (and if needed create) a vault rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let staging_root = root.join("staging");

        fs::create_dir_all(&root)?;
        for kind in [
            RecordKind::User,
            RecordKind::Guardian,
            RecordKind::Token,
            RecordKind::Key,
        ] {
            fs::create_dir_all(root.join(kind.dir_name()))?;
        }
        fs::create_dir_all(&staging_root)?;
        restrict_dir_permissions(&root);

        // Clean up orphaned staging files from a previous crash.
        cleanup_staging_dir(&staging_root);

        Ok(Self { root, staging_root })
    }

    /// Open the vault at the platform-default location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::paths::vault_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ── Users ───────────────────────────────────────────────────────────────

    pub fn save_user(&self, user: &UserRecord) -> Result<()> {
        self.write_record(RecordKind::User, &user.email, user)
    }

    pub fn load_user(&self, email: &str) -> Result<UserRecord> {
        self.read_record(RecordKind::User, email)
    }

    // ── Guardians ───────────────────────────────────────────────────────────

    /// Persist a guardian record. A second owner guardian is rejected before
    /// anything is written.
    pub fn save_guardian(&self, guardian: &GuardianRecord) -> Result<()> {
        if guardian.kind == GuardianKind::Owner {
            for existing in self.load_guardians()? {
                if existing.kind == GuardianKind::Owner && existing.node_id != guardian.node_id {
                    return Err(VaultError::OwnerExists {
                        node_id: existing.node_id,
                    });
                }
            }
        }
        self.write_record(RecordKind::Guardian, &guardian.node_id, guardian)
    }

    pub fn load_guardian(&self, node_id: &str) -> Result<GuardianRecord> {
        self.read_record(RecordKind::Guardian, node_id)
    }

    pub fn delete_guardian(&self, node_id: &str) -> Result<()> {
        let path = self.record_path(RecordKind::Guardian, node_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the owner guardian wholesale. Recovery supersedes the old
    /// device, so an existing owner record under a different node id is
    /// removed before the new one is written.
    pub fn replace_owner_guardian(&self, guardian: &GuardianRecord) -> Result<()> {
        for existing in self.load_guardians()? {
            if existing.kind == GuardianKind::Owner && existing.node_id != guardian.node_id {
                debug!(node_id = %existing.node_id, "removing superseded owner guardian");
                self.delete_guardian(&existing.node_id)?;
            }
        }
        self.save_guardian(guardian)
    }

    /// All stored guardian records, for network-status display.
    pub fn load_guardians(&self) -> Result<Vec<GuardianRecord>> {
        let dir = self.root.join(RecordKind::Guardian.dir_name());
        let mut guardians = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let bytes = fs::read(&path)?;
                guardians.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(guardians)
    }

    // ── Tokens ──────────────────────────────────────────────────────────────

    pub fn save_tokens(&self, email: &str, tokens: &TokenPair) -> Result<()> {
        self.write_record(RecordKind::Token, email, tokens)
    }

    pub fn load_tokens(&self, email: &str) -> Result<TokenPair> {
        self.read_record(RecordKind::Token, email)
    }

    /// Remove stored tokens for an email. Absent tokens are fine: logout on a
    /// fresh device is a no-op.
    pub fn delete_tokens(&self, email: &str) -> Result<()> {
        let path = self.record_path(RecordKind::Token, email)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── Keys ────────────────────────────────────────────────────────────────

    /// Persist an encrypted envelope under `(identifier, key_type)` together
    /// with its checksum.
    pub fn save_key(
        &self,
        identifier: &str,
        key_type: KeyType,
        envelope: &EncryptedEnvelope,
    ) -> Result<()> {
        let record = KeyRecord::new(envelope.clone());
        self.write_record(RecordKind::Key, &key_file_stem(identifier, key_type)?, &record)
    }

    /// Load an envelope, verifying its checksum first. A mismatch aborts with
    /// `Integrity` — tampered data is never returned.
    pub fn load_key(&self, identifier: &str, key_type: KeyType) -> Result<EncryptedEnvelope> {
        let stem = key_file_stem(identifier, key_type)?;
        let record: KeyRecord = self.read_record(RecordKind::Key, &stem)?;
        if !record.verify() {
            warn!(key = %stem, "key record failed integrity verification");
            return Err(VaultError::Integrity { key: stem });
        }
        Ok(record.envelope)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn record_path(&self, kind: RecordKind, key: &str) -> Result<PathBuf> {
        validate_record_key(key)?;
        Ok(self
            .root
            .join(kind.dir_name())
            .join(format!("{key}.json")))
    }

    fn write_record<T: Serialize>(&self, kind: RecordKind, key: &str, value: &T) -> Result<()> {
        let path = self.record_path(kind, key)?;
        let json = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&path, &json)?;
        debug!(%kind, key, "vault record written");
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(&self, kind: RecordKind, key: &str) -> Result<T> {
        let path = self.record_path(kind, key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound {
                    kind,
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let staging_name = format!("{}.staging", Uuid::new_v4());
        let staging_path = self.staging_root.join(staging_name);
        {
            let mut file = File::create(&staging_path)?;
            restrict_file_permissions(&file);
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fsync_dir(&self.staging_root)?;
        fs::rename(&staging_path, dest)?;
        if let Some(parent) = dest.parent() {
            fsync_dir(parent)?;
        }
        Ok(())
    }
}

/// Natural keys (emails, node ids) become filenames; anything that could
/// escape the record directory is rejected before filesystem access.
fn validate_record_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.contains('\0');
    if bad {
        return Err(VaultError::InvalidRecordKey(key.to_string()));
    }
    Ok(())
}

fn key_file_stem(identifier: &str, key_type: KeyType) -> Result<String> {
    validate_record_key(identifier)?;
    Ok(format!("{identifier}.{}", key_type.as_str()))
}

fn restrict_dir_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut dirs = vec![path.to_path_buf()];
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    dirs.push(entry.path());
                }
            }
        }
        for dir in dirs {
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                warn!("cannot restrict permissions on {}: {}", dir.display(), e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn restrict_file_permissions(file: &File) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            warn!("cannot restrict record file permissions: {}", e);
        }
    }
    #[cfg(not(unix))]
    let _ = file;
}

/// Remove any leftover `.staging` files from a previous crash.
fn cleanup_staging_dir(staging_root: &Path) {
    if let Ok(entries) = fs::read_dir(staging_root) {
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().ends_with(".staging") {
                warn!(path = %entry.path().display(), "removing orphaned staging file");
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

fn fsync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = OpenOptions::new().read(true).open(path)?;
        dir.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
