//! State handed from the setup phase to the cleanup phase.
//!
//! Cleanup usually runs in a different process, so the state crosses the
//! boundary as a flat string map written by setup and read once by cleanup.
//! Every key is optional: setup may have aborted before writing it, and
//! cleanup skips the matching step instead of failing.

use crate::error::{KeychainError, Result};
use crate::keychain::search_list::{parse_keychain_list, SearchListMode};
use crate::keychain::secret::KeychainPassword;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the ephemeral keychain.
pub const KEY_KEYCHAIN_PATH: &str = "keychainPath";
/// Unlock password of the ephemeral keychain.
pub const KEY_KEYCHAIN_PASSWORD: &str = "keychainPassword";
/// Search list captured before insertion.
pub const KEY_PREVIOUS_KEYCHAINS: &str = "prevKeychains";
/// Default keychain captured before setup.
pub const KEY_PREVIOUS_DEFAULT: &str = "prevDefaultKeychain";
/// Search list mode used by setup.
pub const KEY_SEARCH_LIST_MODE: &str = "searchListMode";

/// Immutable snapshot of what cleanup needs.
#[derive(Debug, Default)]
pub struct TransferredState {
    /// Ephemeral keychain path.
    pub keychain_path: Option<PathBuf>,
    /// Ephemeral keychain password.
    pub keychain_password: Option<KeychainPassword>,
    /// Search list before insertion, in order.
    pub previous_search_list: Option<Vec<PathBuf>>,
    /// Default keychain before setup.
    pub previous_default_keychain: Option<PathBuf>,
    /// Mode the keychain was inserted with.
    pub search_list_mode: Option<SearchListMode>,
}

impl TransferredState {
    /// Key/value pairs for the fields that are present.
    pub fn to_pairs(&self) -> Result<Vec<(&'static str, String)>> {
        let mut pairs = Vec::new();
        if let Some(path) = &self.keychain_path {
            pairs.push((KEY_KEYCHAIN_PATH, path.display().to_string()));
        }
        if let Some(password) = &self.keychain_password {
            pairs.push((KEY_KEYCHAIN_PASSWORD, password.expose().to_string()));
        }
        if let Some(list) = &self.previous_search_list {
            let list: Vec<String> = list.iter().map(|p| p.display().to_string()).collect();
            pairs.push((KEY_PREVIOUS_KEYCHAINS, serde_json::to_string(&list)?));
        }
        if let Some(default) = &self.previous_default_keychain {
            pairs.push((KEY_PREVIOUS_DEFAULT, default.display().to_string()));
        }
        if let Some(mode) = &self.search_list_mode {
            pairs.push((KEY_SEARCH_LIST_MODE, mode.as_str().to_string()));
        }
        Ok(pairs)
    }

    /// Rebuilds state from a key lookup. Empty values count as missing and
    /// malformed values are dropped with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let previous_search_list = get(KEY_PREVIOUS_KEYCHAINS)
            .map(|raw| parse_search_list(&raw))
            .filter(|list| !list.is_empty());

        let search_list_mode = get(KEY_SEARCH_LIST_MODE).and_then(|raw| match raw.parse::<SearchListMode>() {
            Ok(mode) => Some(mode),
            Err(e) => {
                log::warn!("Ignoring transferred state: {}", e);
                None
            }
        });

        Self {
            keychain_path: get(KEY_KEYCHAIN_PATH).map(PathBuf::from),
            keychain_password: get(KEY_KEYCHAIN_PASSWORD).map(KeychainPassword::from_transferred),
            previous_search_list,
            previous_default_keychain: get(KEY_PREVIOUS_DEFAULT).map(PathBuf::from),
            search_list_mode,
        }
    }

    /// Whether no field was transferred at all.
    pub fn is_empty(&self) -> bool {
        self.keychain_path.is_none()
            && self.keychain_password.is_none()
            && self.previous_search_list.is_none()
            && self.previous_default_keychain.is_none()
            && self.search_list_mode.is_none()
    }
}

/// Accepts the JSON array form as well as raw `list-keychains` output.
fn parse_search_list(raw: &str) -> Vec<PathBuf> {
    match serde_json::from_str::<Vec<PathBuf>>(raw) {
        Ok(list) => list,
        Err(_) => parse_keychain_list(raw),
    }
}

/// Channel carrying [`TransferredState`] across the phase boundary.
pub trait StateCarrier {
    /// Persists the full state, replacing anything saved before.
    fn save(&mut self, state: &TransferredState) -> Result<()>;

    /// Reads the state saved by the setup phase.
    fn load(&mut self) -> Result<TransferredState>;
}

/// GitHub Actions `saveState` / `getState` channel.
///
/// Setup appends entries to the file named by `GITHUB_STATE`; the runner
/// exposes them to the post step as `STATE_<key>` environment variables.
#[derive(Debug, Clone, Default)]
pub struct ActionsStateCarrier {
    state_file: Option<PathBuf>,
}

impl ActionsStateCarrier {
    /// Carrier for the current process environment.
    pub fn from_env() -> Self {
        Self {
            state_file: std::env::var_os("GITHUB_STATE")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Carrier appending to an explicit state file.
    pub fn with_state_file(state_file: impl Into<PathBuf>) -> Self {
        Self {
            state_file: Some(state_file.into()),
        }
    }
}

impl StateCarrier for ActionsStateCarrier {
    fn save(&mut self, state: &TransferredState) -> Result<()> {
        let path = self.state_file.as_deref().ok_or_else(|| {
            KeychainError::State("GITHUB_STATE is not set; pass --state-file outside GitHub Actions".into())
        })?;
        append_file_commands(path, &state.to_pairs()?)
    }

    fn load(&mut self) -> Result<TransferredState> {
        Ok(TransferredState::from_lookup(|key| {
            std::env::var(format!("STATE_{key}")).ok()
        }))
    }
}

/// Appends `name<<delimiter` entries, the format the Actions runner reads
/// from `GITHUB_STATE` and `GITHUB_OUTPUT`.
pub fn append_file_commands(path: &Path, pairs: &[(&str, String)]) -> Result<()> {
    let mut text = String::new();
    for (name, value) in pairs {
        let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
        if name.contains(&delimiter) || value.contains(&delimiter) {
            return Err(KeychainError::State(format!(
                "value for {name} contains the file command delimiter"
            )));
        }
        text.push_str(&format!("{name}<<{delimiter}\n{value}\n{delimiter}\n"));
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

/// JSON file channel for pipelines outside GitHub Actions.
///
/// The file is owner-only and removed once cleanup has read it.
#[derive(Debug, Clone)]
pub struct FileStateCarrier {
    path: PathBuf,
}

impl FileStateCarrier {
    /// Carrier backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateCarrier for FileStateCarrier {
    fn save(&mut self, state: &TransferredState) -> Result<()> {
        let map: BTreeMap<&str, String> = state.to_pairs()?.into_iter().collect();
        let json = serde_json::to_string_pretty(&map)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    fn load(&mut self) -> Result<TransferredState> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No state file at {}; nothing to clean up", self.path.display());
                return Ok(TransferredState::default());
            }
            Err(e) => return Err(e.into()),
        };

        let map: BTreeMap<String, String> = serde_json::from_str(&text)?;
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Could not remove state file {}: {}", self.path.display(), e);
        }
        Ok(TransferredState::from_lookup(|key| map.get(key).cloned()))
    }
}
