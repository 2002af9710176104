//! Keychain search list capture, insertion and restoration.
//!
//! The search list and default keychain are per-user, host-global state. Only
//! one signing job may own them at a time; concurrent jobs on the same user
//! would race here.

use crate::error::{KeychainError, Result};
use crate::keychain::security::SecurityTool;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the ephemeral keychain becomes visible to the signing tools.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SearchListMode {
    /// Append to the existing search list, keeping the login keychain.
    ///
    /// Issuer chains that resolve through the login keychain or the system
    /// roots keep validating, so `find-identity -v` sees the identity.
    #[default]
    Alongside,

    /// Make the ephemeral keychain the only listed keychain and the default.
    ///
    /// Maximum isolation, but identities whose intermediates live in the
    /// login keychain fail validation and need trust repair.
    Exclusive,
}

impl SearchListMode {
    /// Stable name used in state transfer and CLI values.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchListMode::Alongside => "alongside",
            SearchListMode::Exclusive => "exclusive",
        }
    }
}

impl FromStr for SearchListMode {
    type Err = KeychainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "alongside" => Ok(SearchListMode::Alongside),
            "exclusive" => Ok(SearchListMode::Exclusive),
            other => Err(KeychainError::State(format!(
                "unknown search list mode: {other}"
            ))),
        }
    }
}

/// Search list and default keychain as they were before setup touched them.
///
/// Either half may be missing if capturing it failed; the matching restore
/// step is then skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchListSnapshot {
    /// Search list in order, `None` if it could not be read.
    pub keychains: Option<Vec<PathBuf>>,
    /// Default keychain, `None` if unset or unreadable.
    pub default_keychain: Option<PathBuf>,
}

impl SearchListSnapshot {
    /// Reads the current search list and default keychain.
    ///
    /// Never fails: an unreadable value is logged and left out of the
    /// snapshot so teardown skips restoring it.
    pub async fn capture<T: SecurityTool>(tool: &T) -> Self {
        let keychains = match tool.search_list().await {
            Ok(list) if list.is_empty() => {
                log::warn!("Keychain search list is empty; it will not be restored");
                None
            }
            Ok(list) => Some(list),
            Err(e) => {
                log::warn!("Could not read keychain search list; it will not be restored: {}", e);
                None
            }
        };

        let default_keychain = match tool.default_keychain().await {
            Ok(default) => default,
            Err(e) => {
                log::warn!("Could not read default keychain: {}", e);
                None
            }
        };

        Self {
            keychains,
            default_keychain,
        }
    }
}

/// Search list to install for `keychain` under `mode`.
///
/// `Alongside` keeps `previous` intact and in order, appending `keychain`. The
/// login keychain is added first when `previous` is unknown or lacks it.
pub fn build_search_list(
    previous: Option<&[PathBuf]>,
    login_keychain: &Path,
    keychain: &Path,
    mode: SearchListMode,
) -> Vec<PathBuf> {
    match mode {
        SearchListMode::Exclusive => vec![keychain.to_path_buf()],
        SearchListMode::Alongside => {
            let mut list: Vec<PathBuf> = previous
                .unwrap_or_default()
                .iter()
                .filter(|entry| entry.as_path() != keychain)
                .cloned()
                .collect();
            if !list.iter().any(|entry| entry == login_keychain) {
                list.insert(0, login_keychain.to_path_buf());
            }
            list.push(keychain.to_path_buf());
            list
        }
    }
}

/// Makes `keychain` visible according to `mode`.
pub async fn insert<T: SecurityTool>(
    tool: &T,
    keychain: &Path,
    snapshot: &SearchListSnapshot,
    login_keychain: &Path,
    mode: SearchListMode,
) -> Result<()> {
    let list = build_search_list(snapshot.keychains.as_deref(), login_keychain, keychain, mode);
    log::info!(
        "Setting keychain search list ({}): {}",
        mode.as_str(),
        list.iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tool.set_search_list(&list).await?;

    if mode == SearchListMode::Exclusive {
        tool.set_default_keychain(keychain).await?;
    }

    Ok(())
}

/// Reinstates a captured search list exactly as captured.
pub async fn restore<T: SecurityTool>(tool: &T, keychains: &[PathBuf]) -> Result<()> {
    tool.set_search_list(keychains).await
}

/// Login keychain under `home`.
pub fn login_keychain_path(home: &Path) -> PathBuf {
    home.join("Library/Keychains/login.keychain-db")
}

/// Parses `security list-keychains` / `default-keychain` output.
///
/// One keychain per line, indented and double-quoted.
pub fn parse_keychain_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .map(|line| line.trim_matches('"'))
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}
