//! Ephemeral keychain creation, auto-lock configuration and unlock.

use crate::error::{KeychainError, Result};
use crate::keychain::secret::KeychainPassword;
use crate::keychain::security::SecurityTool;
use std::path::{Path, PathBuf};

/// Inactivity timeout after which the keychain relocks itself.
///
/// Bounds how long the imported key stays usable if cleanup never runs.
pub const DEFAULT_AUTO_LOCK_SECONDS: u32 = 3600;

/// Keychain file name unique to this run.
pub fn generated_keychain_name() -> String {
    format!(
        "kodegen-build-{}.keychain-db",
        chrono::Utc::now().timestamp_millis()
    )
}

/// Keychain file name as `security` stores it on disk.
///
/// `security` maps `X`, `X.keychain` and `X.keychain-db` onto the same
/// `X.keychain-db` file, so names are normalized to that form before any
/// existence check.
pub fn normalize_keychain_name(name: &str) -> String {
    if name.ends_with(".keychain-db") {
        name.to_string()
    } else if name.ends_with(".keychain") {
        format!("{name}-db")
    } else {
        format!("{name}.keychain-db")
    }
}

/// Pre-Sierra `.keychain` file that `security` would open for `path`.
fn legacy_sibling(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".keychain-db")?;
    Some(path.with_file_name(format!("{stem}.keychain")))
}

/// A keychain owned by one signing job.
#[derive(Debug)]
pub struct EphemeralKeychain {
    path: PathBuf,
    password: KeychainPassword,
    auto_lock_seconds: u32,
}

impl EphemeralKeychain {
    /// Describes the keychain; nothing is created until [`provision`].
    ///
    /// [`provision`]: EphemeralKeychain::provision
    pub fn new(path: PathBuf, password: KeychainPassword, auto_lock_seconds: u32) -> Self {
        Self {
            path,
            password,
            auto_lock_seconds,
        }
    }

    /// Keychain file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock password.
    pub fn password(&self) -> &KeychainPassword {
        &self.password
    }

    /// Auto-lock timeout in seconds.
    pub fn auto_lock_seconds(&self) -> u32 {
        self.auto_lock_seconds
    }

    /// The file already on disk that `security` would treat as this keychain.
    pub fn existing_file(&self) -> Option<PathBuf> {
        std::iter::once(self.path.clone())
            .chain(legacy_sibling(&self.path))
            .find(|candidate| candidate.exists())
    }

    /// Creates, configures and unlocks the keychain, in that order.
    pub async fn provision<T: SecurityTool>(&self, tool: &T) -> Result<()> {
        self.create(tool).await?;
        self.configure(tool).await?;
        self.unlock(tool).await
    }

    /// Creates the empty keychain. Refuses to reuse an existing file.
    pub async fn create<T: SecurityTool>(&self, tool: &T) -> Result<()> {
        if let Some(path) = self.existing_file() {
            return Err(KeychainError::KeychainExists { path });
        }
        log::info!("Creating keychain {}", self.path.display());
        tool.create_keychain(&self.path, &self.password).await
    }

    /// Sets the auto-lock timeout.
    pub async fn configure<T: SecurityTool>(&self, tool: &T) -> Result<()> {
        log::debug!(
            "Setting auto-lock of {} to {}s",
            self.path.display(),
            self.auto_lock_seconds
        );
        tool.set_auto_lock(&self.path, self.auto_lock_seconds).await
    }

    /// Unlocks the keychain; import fails against a locked one.
    pub async fn unlock<T: SecurityTool>(&self, tool: &T) -> Result<()> {
        tool.unlock_keychain(&self.path, &self.password).await
    }
}
