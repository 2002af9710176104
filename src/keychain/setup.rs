//! Setup phase: provision the keychain and resolve the signing identity.

use crate::error::{KeychainError, Result};
use crate::keychain::import::{CertificatePayload, IdentityImporter};
use crate::keychain::provision::{
    generated_keychain_name, normalize_keychain_name, EphemeralKeychain, DEFAULT_AUTO_LOCK_SECONDS,
};
use crate::keychain::resolver::{IdentityResolver, ResolvedIdentity};
use crate::keychain::scratch::ScratchDir;
use crate::keychain::search_list::{self, login_keychain_path, SearchListMode, SearchListSnapshot};
use crate::keychain::secret::KeychainPassword;
use crate::keychain::security::SecurityTool;
use crate::keychain::state::{StateCarrier, TransferredState};
use std::path::{Path, PathBuf};

/// Setup phase configuration.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Directory the keychain file is created in.
    pub keychain_dir: PathBuf,
    /// Fixed keychain file name, normalized to `.keychain-db`; generated per
    /// run when `None`.
    pub keychain_name: Option<String>,
    /// Login keychain kept visible in `Alongside` mode.
    pub login_keychain: PathBuf,
    /// Identity name prefix; the default prefix when `None`.
    pub identity_prefix: Option<String>,
    /// How the keychain joins the search list.
    pub search_list_mode: SearchListMode,
    /// Auto-lock timeout in seconds.
    pub auto_lock_seconds: u32,
    /// Tool authorization applied on import.
    pub importer: IdentityImporter,
}

impl SetupConfig {
    /// Defaults for a user whose home directory is `home`.
    pub fn for_home(home: &Path) -> Self {
        Self {
            keychain_dir: home.join("Library/Keychains"),
            keychain_name: None,
            login_keychain: login_keychain_path(home),
            identity_prefix: None,
            search_list_mode: SearchListMode::default(),
            auto_lock_seconds: DEFAULT_AUTO_LOCK_SECONDS,
            importer: IdentityImporter::default(),
        }
    }

    /// Absolute path of the keychain this configuration creates.
    pub fn keychain_path(&self) -> PathBuf {
        let name = self
            .keychain_name
            .as_deref()
            .map(normalize_keychain_name)
            .unwrap_or_else(generated_keychain_name);
        self.keychain_dir.join(name)
    }
}

/// What the setup phase hands to the signing step.
#[derive(Debug, Clone)]
pub struct SetupOutcome {
    /// Keychain holding the identity.
    pub keychain_path: PathBuf,
    /// Resolved identity.
    pub identity: ResolvedIdentity,
}

/// One run of the setup phase with its freshly generated password.
#[derive(Debug)]
pub struct SetupSession {
    config: SetupConfig,
    keychain: EphemeralKeychain,
}

impl SetupSession {
    /// Fixes the keychain path and generates its password.
    pub fn new(config: SetupConfig) -> Result<Self> {
        let password = KeychainPassword::generate()?;
        let keychain = EphemeralKeychain::new(config.keychain_path(), password, config.auto_lock_seconds);
        Ok(Self { config, keychain })
    }

    /// The keychain this session provisions.
    pub fn keychain(&self) -> &EphemeralKeychain {
        &self.keychain
    }

    /// Runs the setup phase to a resolved identity.
    ///
    /// Cleanup state is saved before the first host mutation, so an abort at
    /// any later step still leaves cleanup what it needs.
    pub async fn run<T: SecurityTool, C: StateCarrier + ?Sized>(
        &self,
        tool: &T,
        carrier: &mut C,
        payload: &CertificatePayload,
    ) -> Result<SetupOutcome> {
        let path = self.keychain.path();
        // Checked before state is saved so cleanup never deletes a keychain
        // this run did not create.
        if let Some(existing) = self.keychain.existing_file() {
            return Err(KeychainError::KeychainExists { path: existing });
        }

        let scratch = ScratchDir::new()?;
        let snapshot = SearchListSnapshot::capture(tool).await;

        carrier.save(&TransferredState {
            keychain_path: Some(path.to_path_buf()),
            keychain_password: Some(KeychainPassword::from_transferred(
                self.keychain.password().expose().to_string(),
            )),
            previous_search_list: snapshot.keychains.clone(),
            previous_default_keychain: snapshot.default_keychain.clone(),
            search_list_mode: Some(self.config.search_list_mode),
        })?;

        self.keychain.provision(tool).await?;
        search_list::insert(
            tool,
            path,
            &snapshot,
            &self.config.login_keychain,
            self.config.search_list_mode,
        )
        .await?;

        self.config
            .importer
            .import(tool, &self.keychain, payload, &scratch)
            .await?;

        let identity = IdentityResolver::new(path, self.config.identity_prefix.as_deref())
            .resolve(tool, &scratch)
            .await?;

        log::info!("Certificate imported and keychain configured.");
        Ok(SetupOutcome {
            keychain_path: path.to_path_buf(),
            identity,
        })
    }
}
