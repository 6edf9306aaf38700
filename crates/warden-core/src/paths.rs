use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{Result, VaultError};

pub const APP_QUALIFIER: &str = "io";
pub const APP_ORG: &str = "warden";
pub const APP_NAME: &str = "warden";

/// Vault root directory. `WARDEN_VAULT_DIR` overrides the platform default,
/// which is `<data dir>/vault`.
pub fn vault_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("WARDEN_VAULT_DIR") {
        return Ok(PathBuf::from(override_path));
    }
    let dirs =
        ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME).ok_or(VaultError::VaultDir)?;
    Ok(dirs.data_dir().join("vault"))
}
