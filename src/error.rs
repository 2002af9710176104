//! Error types for keychain provisioning and teardown.
//!
//! Setup failures are fatal and carry enough context to act on. Teardown never
//! surfaces these as failures; see [`crate::keychain::teardown`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for keychain operations
pub type Result<T> = std::result::Result<T, KeychainError>;

/// Main error type for all keychain operations
#[derive(Error, Debug)]
pub enum KeychainError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The OS entropy source could not produce the keychain password
    #[error("System entropy source unavailable: {0}")]
    EntropyUnavailable(String),

    /// The certificate payload is not valid base64
    #[error("Invalid certificate (not valid base64): {0}")]
    InvalidCertificate(#[from] base64::DecodeError),

    /// A keychain already exists at the target path
    #[error("Keychain already exists: {}", path.display())]
    KeychainExists {
        /// Path of the existing keychain
        path: PathBuf,
    },

    /// An external command failed to run or exited unsuccessfully
    #[error("Command failed: {command} - {reason}")]
    CommandFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },

    /// The certificate could not be imported into the keychain
    #[error("Failed to import certificate: {reason}")]
    ImportFailed {
        /// Reason for the error
        reason: String,
    },

    /// No signing identity matched the configured prefix
    #[error("No identity found with prefix: {prefix}")]
    IdentityNotFound {
        /// Prefix that could not be matched
        prefix: String,
        /// Most recent identity listing, for diagnosis
        listing: String,
    },

    /// State could not be handed across the phase boundary
    #[error("State transfer error: {0}")]
    State(String),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },
}

impl KeychainError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            KeychainError::InvalidCertificate(_) => vec![
                "Encode the .p12 file with `base64 -i certificate.p12` and store the result as APPLE_CERTIFICATE".to_string(),
            ],
            KeychainError::KeychainExists { path } => vec![
                format!("Delete the stale keychain with `security delete-keychain {}`", path.display()),
                "Or omit --keychain-name so a fresh name is generated per run".to_string(),
            ],
            KeychainError::ImportFailed { .. } => vec![
                "Check APPLE_CERTIFICATE_PASSWORD matches the password used to export the .p12".to_string(),
                "Make sure the export includes the private key".to_string(),
            ],
            KeychainError::IdentityNotFound { .. } => vec![
                "Compare --identity-prefix with the identity listing above".to_string(),
                "Try --search-list-mode alongside if the issuer chain only resolves through the login keychain".to_string(),
            ],
            KeychainError::State(_) => vec![
                "Run inside GitHub Actions (GITHUB_STATE set) or pass --state-file".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
