//! Command line interface for the keychain lifecycle.
//!
//! `setup` failures exit 1 with the triggering message. `cleanup` always
//! exits 0: its failures are reported as warnings so they never override the
//! build's own result.

mod args;
mod output;

pub use args::{Args, CleanupArgs, Command, SetupArgs};
pub use output::OutputManager;

use crate::error::{CliError, KeychainError, Result};
use crate::keychain::import::CertificatePayload;
use crate::keychain::search_list::login_keychain_path;
use crate::keychain::security::{SecurityCli, SecurityTool};
use crate::keychain::setup::SetupSession;
use crate::keychain::state::{ActionsStateCarrier, FileStateCarrier, StateCarrier};
use crate::keychain::teardown::{self, StepOutcome, STEP_DELETE};
use std::path::{Path, PathBuf};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    let output = OutputManager::from_env();
    let tool = match &args.security_path {
        Some(path) => SecurityCli::new(path),
        None => SecurityCli::locate(),
    };

    match &args.command {
        Command::Setup(setup) => run_setup(setup, &tool, &output).await,
        Command::Cleanup(cleanup) => Ok(run_cleanup(cleanup, &tool, &output).await),
    }
}

/// State channel selected by `--state-file`.
fn state_carrier(state_file: Option<&Path>) -> Box<dyn StateCarrier> {
    match state_file {
        Some(path) => Box::new(FileStateCarrier::new(path)),
        None => Box::new(ActionsStateCarrier::from_env()),
    }
}

/// Run the setup phase and publish the resolved identity
pub async fn run_setup<T: SecurityTool>(
    args: &SetupArgs,
    tool: &T,
    output: &OutputManager,
) -> Result<i32> {
    args.validate()?;

    let payload = CertificatePayload::from_base64(&args.certificate, args.certificate_password.trim())?;

    let home = dirs::home_dir().ok_or_else(|| CliError::MissingArgument {
        argument: "HOME (could not determine home directory)".to_string(),
    })?;
    let session = SetupSession::new(args.to_config(&home))?;
    output.add_mask(session.keychain().password().expose())?;

    let mut carrier = state_carrier(args.state_file.as_deref());
    match session.run(tool, carrier.as_mut(), &payload).await {
        Ok(outcome) => {
            let keychain_path = outcome.keychain_path.display().to_string();
            output.set_output("identity-id", outcome.identity.id())?;
            output.set_output("identity-info", outcome.identity.info())?;
            output.set_output("cert-id", outcome.identity.id())?;
            output.set_output("cert-info", outcome.identity.info())?;
            output.set_output("keychain-path", &keychain_path)?;
            if outcome.identity.trust_repaired() {
                output.info("Identity became valid after trust repair")?;
            }
            output.success("Certificate imported and keychain configured.")?;
            Ok(0)
        }
        Err(e) => {
            if let KeychainError::IdentityNotFound { listing, .. } = &e {
                output.warn("No matching identity found. Printing all identities for debugging.")?;
                output.group("Signing identities", listing)?;
            }
            output.error(&e.to_string())?;
            Err(e)
        }
    }
}

/// Run the cleanup phase. Always returns exit code 0.
pub async fn run_cleanup<T: SecurityTool>(
    args: &CleanupArgs,
    tool: &T,
    output: &OutputManager,
) -> i32 {
    let mut carrier = state_carrier(args.state_file.as_deref());
    let state = match carrier.load() {
        Ok(state) => state,
        Err(e) => {
            let _ = output.warn(&format!("Could not read keychain state, skipping cleanup: {}", e));
            return 0;
        }
    };

    if state.is_empty() {
        let _ = output.info("No keychain state found; nothing to clean up");
        return 0;
    }

    let login_keychain = dirs::home_dir()
        .map(|home| login_keychain_path(&home))
        .unwrap_or_else(|| PathBuf::from("login.keychain-db"));

    let report = teardown::teardown(tool, &state, &login_keychain).await;

    for step in report.failures() {
        let _ = output.warn(&step.to_string());
    }
    if let (Some(StepOutcome::Ok), Some(path)) = (report.outcome(STEP_DELETE), &state.keychain_path) {
        let _ = output.success(&format!("Deleted keychain {}", path.display()));
    }

    0
}
