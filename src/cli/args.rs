//! Command line argument parsing and validation.
//!
//! Every setup option can also come from the environment, so CI secrets map
//! straight onto the flags.

use crate::error::CliError;
use crate::keychain::import::{IdentityImporter, DEFAULT_PARTITION_LIST, DEFAULT_SIGN_TOOL};
use crate::keychain::provision::DEFAULT_AUTO_LOCK_SECONDS;
use crate::keychain::resolver::DEFAULT_IDENTITY_PREFIX;
use crate::keychain::search_list::SearchListMode;
use crate::keychain::setup::SetupConfig;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Ephemeral keychain for CI code signing
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_keychain",
    version,
    about = "Ephemeral keychain for CI code signing",
    long_about = "Creates a throwaway macOS keychain, imports a .p12 signing certificate into it and
resolves the codesign identity. The cleanup command deletes the keychain and restores the
keychain search list, and always exits 0 so it never masks the build result.

Usage:
  kodegen_keychain setup --state-file /tmp/keychain.json
  kodegen_keychain cleanup --state-file /tmp/keychain.json

Exit code 0 from setup = identity-id output names a usable signing identity."
)]
pub struct Args {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Path to the `security` executable (default: found on PATH)
    #[arg(long, global = true, env = "SECURITY_TOOL", value_name = "PATH")]
    pub security_path: Option<PathBuf>,
}

/// Lifecycle phases
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision the keychain and resolve the signing identity
    Setup(SetupArgs),

    /// Delete the keychain and restore the search list (never fails)
    Cleanup(CleanupArgs),
}

/// Arguments of the setup phase
#[derive(clap::Args, Debug)]
pub struct SetupArgs {
    /// Base64-encoded .p12 certificate with private key
    #[arg(long, env = "APPLE_CERTIFICATE", hide_env_values = true)]
    pub certificate: String,

    /// Password of the .p12 certificate
    #[arg(long, env = "APPLE_CERTIFICATE_PASSWORD", hide_env_values = true)]
    pub certificate_password: String,

    /// Literal prefix of the identity name to select
    #[arg(long, env = "IDENTITY_PREFIX", default_value = DEFAULT_IDENTITY_PREFIX)]
    pub identity_prefix: String,

    /// Fixed keychain file name (default: generated per run)
    #[arg(long, env = "KEYCHAIN_NAME")]
    pub keychain_name: Option<String>,

    /// Directory the keychain is created in (default: ~/Library/Keychains)
    #[arg(long, env = "KEYCHAIN_DIR", value_name = "DIR")]
    pub keychain_dir: Option<PathBuf>,

    /// How the keychain joins the user's search list
    #[arg(long, env = "KEYCHAIN_SEARCH_LIST_MODE", value_enum, default_value_t = SearchListMode::Alongside)]
    pub search_list_mode: SearchListMode,

    /// Inactivity timeout after which the keychain relocks
    #[arg(long, env = "KEYCHAIN_AUTO_LOCK_SECONDS", default_value_t = DEFAULT_AUTO_LOCK_SECONDS)]
    pub auto_lock_seconds: u32,

    /// Tool allowed to use the private key without prompting (repeatable)
    #[arg(long = "sign-tool", value_name = "PATH", default_value = DEFAULT_SIGN_TOOL)]
    pub sign_tools: Vec<PathBuf>,

    /// Key partition list granted after import
    #[arg(long, default_value = DEFAULT_PARTITION_LIST)]
    pub partition_list: String,

    /// JSON state file for cleanup (default: GitHub Actions state)
    #[arg(long, env = "KEYCHAIN_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,
}

/// Arguments of the cleanup phase
#[derive(clap::Args, Debug)]
pub struct CleanupArgs {
    /// JSON state file written by setup (default: GitHub Actions state)
    #[arg(long, env = "KEYCHAIN_STATE_FILE", value_name = "PATH")]
    pub state_file: Option<PathBuf>,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl SetupArgs {
    /// Validate arguments before anything touches the host
    pub fn validate(&self) -> Result<(), CliError> {
        if self.certificate.trim().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "--certificate".to_string(),
            });
        }

        if self.auto_lock_seconds == 0 {
            return Err(CliError::InvalidArguments {
                reason: "--auto-lock-seconds must be greater than 0".to_string(),
            });
        }

        if let Some(name) = &self.keychain_name {
            if name.is_empty() || name.contains('/') {
                return Err(CliError::InvalidArguments {
                    reason: format!("Invalid keychain name: {:?}. Use --keychain-dir for the location", name),
                });
            }
        }

        if let Some(dir) = &self.keychain_dir {
            if !dir.is_absolute() {
                return Err(CliError::InvalidArguments {
                    reason: format!("--keychain-dir must be an absolute path, got {}", dir.display()),
                });
            }
        }

        if self.sign_tools.is_empty() {
            return Err(CliError::MissingArgument {
                argument: "--sign-tool".to_string(),
            });
        }

        Ok(())
    }

    /// Setup configuration for a user whose home directory is `home`
    pub fn to_config(&self, home: &Path) -> SetupConfig {
        let mut config = SetupConfig::for_home(home);
        if let Some(dir) = &self.keychain_dir {
            config.keychain_dir = dir.clone();
        }
        config.keychain_name = self.keychain_name.clone();
        config.identity_prefix = Some(self.identity_prefix.clone());
        config.search_list_mode = self.search_list_mode;
        config.auto_lock_seconds = self.auto_lock_seconds;
        config.importer = IdentityImporter::new(self.sign_tools.clone(), self.partition_list.clone());
        config
    }
}
