//! Keychain unlock password generation.

use crate::error::{KeychainError, Result};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Raw entropy behind each generated password.
pub const PASSWORD_ENTROPY_BYTES: usize = 24;

/// Unlock password for an ephemeral keychain.
///
/// Wiped from memory on drop. There is no `Display` impl and `Debug` is
/// redacted, so the value only leaves the process through [`expose`] at the
/// `security` command boundary and the state carrier.
///
/// [`expose`]: KeychainPassword::expose
pub struct KeychainPassword {
    inner: Zeroizing<String>,
}

impl KeychainPassword {
    /// Generates a fresh hex-encoded password from the OS entropy source.
    ///
    /// Failure here aborts the run; there is no fallback source.
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; PASSWORD_ENTROPY_BYTES]);
        OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| KeychainError::EntropyUnavailable(e.to_string()))?;

        Ok(Self {
            inner: Zeroizing::new(hex::encode(&bytes[..])),
        })
    }

    /// Wraps a password handed over from the setup phase.
    pub fn from_transferred(value: String) -> Self {
        Self {
            inner: Zeroizing::new(value),
        }
    }

    /// The password text, for `security` arguments and state transfer only.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl std::fmt::Debug for KeychainPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeychainPassword(<hidden>)")
    }
}
