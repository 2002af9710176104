//! Scratch directory for material that `security` reads from disk.
//!
//! The decoded .p12 and any extracted PEM live here only for the duration of
//! setup. The directory is removed when [`ScratchDir`] drops.

use crate::error::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Per-run scratch directory.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates a fresh directory under the system temp dir.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("kodegen-keychain-")
            .tempdir()?;
        log::debug!("Scratch directory: {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the decoded certificate to `certificate.p12`.
    pub fn write_certificate(&self, bytes: &[u8]) -> Result<PathBuf> {
        self.write_private("certificate.p12", bytes)
    }

    /// Writes `bytes` to `name` with owner-only permissions.
    pub fn write_private(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(path)
    }
}
