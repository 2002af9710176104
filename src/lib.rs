//! Ephemeral keychain provisioning for CI code signing.
//!
//! This library provides the two phases of a signing job on macOS:
//! - Setup: create a throwaway keychain, import a .p12 certificate into it and
//!   resolve the signing identity `codesign` should use
//! - Cleanup: delete the keychain and restore the user's keychain search list,
//!   using only the state handed over by setup
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod error;
pub mod keychain;

// Re-export commonly used types
pub use error::{CliError, KeychainError, Result};
