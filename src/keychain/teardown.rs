//! Best-effort teardown of the ephemeral keychain.
//!
//! Every step is attempted regardless of what happened before it, and every
//! failure is recorded in the [`TeardownReport`] instead of being returned.
//! Running teardown twice with the same state is harmless: the second delete
//! just reports a failure.

use crate::keychain::search_list;
use crate::keychain::security::SecurityTool;
use crate::keychain::search_list::SearchListMode;
use crate::keychain::state::TransferredState;
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of one teardown step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed.
    Ok,
    /// The step did not apply; the reason names the missing state.
    Skipped(String),
    /// The step ran and failed.
    Failed(String),
}

/// A named teardown step and its outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeardownStep {
    /// Step name, e.g. `delete keychain`.
    pub name: &'static str,
    /// What happened.
    pub outcome: StepOutcome,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StepOutcome::Ok => write!(f, "{}: ok", self.name),
            StepOutcome::Skipped(reason) => write!(f, "{}: skipped ({})", self.name, reason),
            StepOutcome::Failed(reason) => write!(f, "{}: failed ({})", self.name, reason),
        }
    }
}

/// Outcomes of all teardown steps, in execution order.
#[derive(Clone, Debug, Default)]
pub struct TeardownReport {
    /// Steps in the order they ran.
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    fn record(&mut self, name: &'static str, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Ok => log::info!("✓ {}", name),
            StepOutcome::Skipped(reason) => log::debug!("Skipping {}: {}", name, reason),
            StepOutcome::Failed(reason) => log::warn!("Failed to {}: {}", name, reason),
        }
        self.steps.push(TeardownStep { name, outcome });
    }

    /// Steps that ran and failed.
    pub fn failures(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed(_)))
    }

    /// Outcome of the named step, if it was recorded.
    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|step| step.name == name)
            .map(|step| &step.outcome)
    }

    /// Whether no step failed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Step restoring the captured search list.
pub const STEP_RESTORE_SEARCH_LIST: &str = "restore keychain search list";
/// Step restoring the default keychain.
pub const STEP_RESTORE_DEFAULT: &str = "restore default keychain";
/// Step unlocking the keychain before deletion.
pub const STEP_UNLOCK: &str = "unlock keychain";
/// Step deleting the keychain.
pub const STEP_DELETE: &str = "delete keychain";

/// Undoes the host-visible effects of setup using only `state`.
///
/// `login_keychain` is the fallback default when setup captured none.
pub async fn teardown<T: SecurityTool>(
    tool: &T,
    state: &TransferredState,
    login_keychain: &Path,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    let outcome = match &state.previous_search_list {
        Some(list) => to_outcome(search_list::restore(tool, list).await),
        None => StepOutcome::Skipped("no search list snapshot".into()),
    };
    report.record(STEP_RESTORE_SEARCH_LIST, outcome);

    let outcome = restore_default(tool, state, login_keychain).await;
    report.record(STEP_RESTORE_DEFAULT, outcome);

    let outcome = match (&state.keychain_path, &state.keychain_password) {
        (Some(path), Some(password)) => to_outcome(tool.unlock_keychain(path, password).await),
        (None, _) => StepOutcome::Skipped("no keychain path".into()),
        (Some(_), None) => StepOutcome::Skipped("no keychain password".into()),
    };
    report.record(STEP_UNLOCK, outcome);

    let outcome = match &state.keychain_path {
        Some(path) => to_outcome(tool.delete_keychain(path).await),
        None => StepOutcome::Skipped("no keychain path".into()),
    };
    report.record(STEP_DELETE, outcome);

    report
}

async fn restore_default<T: SecurityTool>(
    tool: &T,
    state: &TransferredState,
    login_keychain: &Path,
) -> StepOutcome {
    if let Some(default) = &state.previous_default_keychain {
        return to_outcome(tool.set_default_keychain(default).await);
    }
    if state.search_list_mode == Some(SearchListMode::Alongside) {
        return StepOutcome::Skipped("default keychain was not changed".into());
    }

    // Older macOS names the login keychain without the -db suffix.
    let candidates: [PathBuf; 2] = [
        login_keychain.to_path_buf(),
        login_keychain.with_extension("keychain"),
    ];
    let mut last_error = String::new();
    for candidate in &candidates {
        match tool.set_default_keychain(candidate).await {
            Ok(()) => return StepOutcome::Ok,
            Err(e) => last_error = e.to_string(),
        }
    }
    StepOutcome::Failed(last_error)
}

fn to_outcome(result: crate::error::Result<()>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Ok,
        Err(e) => StepOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::fake::{FakeSecurity, LOGIN};
    use crate::keychain::provision::EphemeralKeychain;
    use crate::keychain::search_list::{insert, SearchListSnapshot};
    use crate::keychain::secret::KeychainPassword;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    async fn provisioned(tool: &FakeSecurity, dir: &Path, mode: SearchListMode) -> TransferredState {
        let snapshot = SearchListSnapshot::capture(tool).await;
        let kc = EphemeralKeychain::new(
            dir.join("E.keychain-db"),
            KeychainPassword::generate().unwrap(),
            60,
        );
        kc.provision(tool).await.unwrap();
        insert(tool, kc.path(), &snapshot, Path::new(LOGIN), mode).await.unwrap();
        TransferredState {
            keychain_path: Some(kc.path().to_path_buf()),
            keychain_password: Some(KeychainPassword::from_transferred(
                kc.password().expose().to_string(),
            )),
            previous_search_list: snapshot.keychains,
            previous_default_keychain: snapshot.default_keychain,
            search_list_mode: Some(mode),
        }
    }

    #[tokio::test]
    async fn restores_exact_previous_order() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        tool.set_initial_search_list(paths(&["/k/A", LOGIN, "/k/B"]));
        let state = provisioned(&tool, dir.path(), SearchListMode::Alongside).await;
        let ephemeral = state.keychain_path.clone().unwrap();
        let mut inserted = paths(&["/k/A", LOGIN, "/k/B"]);
        inserted.push(ephemeral.clone());
        assert_eq!(tool.current_search_list(), inserted);

        let report = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(tool.current_search_list(), paths(&["/k/A", LOGIN, "/k/B"]));
        assert!(!tool.keychain_exists(&ephemeral));
    }

    #[tokio::test]
    async fn exclusive_mode_restores_default_keychain() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        let state = provisioned(&tool, dir.path(), SearchListMode::Exclusive).await;
        assert_eq!(tool.current_default(), state.keychain_path);

        let report = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert!(report.is_clean());
        assert_eq!(tool.current_default(), Some(PathBuf::from(LOGIN)));
        assert_eq!(tool.current_search_list(), paths(&[LOGIN]));
    }

    #[tokio::test]
    async fn second_teardown_warns_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        let state = provisioned(&tool, dir.path(), SearchListMode::Alongside).await;

        assert!(teardown(&tool, &state, Path::new(LOGIN)).await.is_clean());
        let second = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert!(matches!(second.outcome(STEP_DELETE), Some(StepOutcome::Failed(_))));
        assert!(matches!(second.outcome(STEP_UNLOCK), Some(StepOutcome::Failed(_))));
        assert_eq!(second.outcome(STEP_RESTORE_SEARCH_LIST), Some(&StepOutcome::Ok));
    }

    #[tokio::test]
    async fn empty_state_skips_every_step() {
        let tool = FakeSecurity::new();
        let state = TransferredState::default();

        let report = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert_eq!(report.steps.len(), 4);
        assert!(matches!(report.outcome(STEP_RESTORE_SEARCH_LIST), Some(StepOutcome::Skipped(_))));
        assert!(matches!(report.outcome(STEP_UNLOCK), Some(StepOutcome::Skipped(_))));
        assert!(matches!(report.outcome(STEP_DELETE), Some(StepOutcome::Skipped(_))));
        // Unknown mode: fall back to the login keychain as default.
        assert_eq!(report.outcome(STEP_RESTORE_DEFAULT), Some(&StepOutcome::Ok));
        assert_eq!(tool.current_default(), Some(PathBuf::from(LOGIN)));
    }

    #[tokio::test]
    async fn every_step_failing_still_runs_every_step() {
        let tool = FakeSecurity::new();
        for op in ["set_search_list", "set_default_keychain", "unlock_keychain", "delete_keychain"] {
            tool.fail_on(op);
        }
        let state = TransferredState {
            keychain_path: Some(PathBuf::from("/k/E")),
            keychain_password: Some(KeychainPassword::from_transferred("pw".into())),
            previous_search_list: Some(paths(&[LOGIN])),
            previous_default_keychain: None,
            search_list_mode: None,
        };

        let report = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert_eq!(report.failures().count(), 4);
        let calls = tool.calls();
        assert_eq!(
            calls,
            vec![
                "set_search_list",
                "set_default_keychain",
                "set_default_keychain",
                "unlock_keychain",
                "delete_keychain"
            ]
        );
    }

    #[tokio::test]
    async fn missing_snapshot_skips_restore_but_still_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        let mut state = provisioned(&tool, dir.path(), SearchListMode::Alongside).await;
        state.previous_search_list = None;
        let ephemeral = state.keychain_path.clone().unwrap();

        let report = teardown(&tool, &state, Path::new(LOGIN)).await;

        assert!(matches!(report.outcome(STEP_RESTORE_SEARCH_LIST), Some(StepOutcome::Skipped(_))));
        assert_eq!(report.outcome(STEP_DELETE), Some(&StepOutcome::Ok));
        assert!(!tool.keychain_exists(&ephemeral));
    }
}
