//! Ephemeral keychain lifecycle.
//!
//! The setup phase runs these steps in order, each one a blocking `security`
//! invocation that the next step depends on:
//!
//! 1. Generate a fresh unlock password ([`secret`])
//! 2. Snapshot the search list and default keychain ([`search_list`])
//! 3. Hand the teardown state over ([`state`])
//! 4. Create, configure and unlock the keychain ([`provision`])
//! 5. Insert it into the search list ([`search_list`])
//! 6. Import the .p12 and grant `codesign` key access ([`import`])
//! 7. Resolve the signing identity, repairing trust once if needed ([`resolver`])
//!
//! The cleanup phase ([`teardown`]) undoes steps 4-5 from the handed-over state
//! alone, and reports failures instead of raising them.
//!
//! # Module Organization
//!
//! - [`security`] - `SecurityTool` boundary and the `security(1)` implementation
//! - [`identity`] - `find-identity` listing parser
//! - [`scratch`] - scratch directory for the decoded certificate
//! - [`setup`] - setup phase orchestration

pub mod identity;
pub mod import;
pub mod provision;
pub mod resolver;
pub mod scratch;
pub mod search_list;
pub mod secret;
pub mod security;
pub mod setup;
pub mod state;
pub mod teardown;

#[cfg(test)]
pub(crate) mod fake;

pub use identity::SigningIdentity;
pub use import::{CertificatePayload, IdentityImporter};
pub use provision::EphemeralKeychain;
pub use resolver::{IdentityResolver, ResolvedIdentity, DEFAULT_IDENTITY_PREFIX};
pub use search_list::{SearchListMode, SearchListSnapshot};
pub use secret::KeychainPassword;
pub use security::{SecurityCli, SecurityTool};
pub use setup::{SetupConfig, SetupOutcome, SetupSession};
pub use state::{ActionsStateCarrier, FileStateCarrier, StateCarrier, TransferredState};
pub use teardown::{StepOutcome, TeardownReport};
