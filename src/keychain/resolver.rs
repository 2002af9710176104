//! Signing identity resolution with a single trust-repair retry.
//!
//! ```text
//! Listing ──match──▶ Matched
//!    │
//!    └─none─▶ NoMatch ─▶ TrustRepairAttempted ─▶ Listing ──match──▶ Matched
//!                                                   │
//!                                                   └─none─▶ Failed
//! ```
//!
//! Trust repair covers the case where the import succeeded but the issuer
//! chain is not trusted inside the isolated keychain, so `find-identity -v`
//! filters out an identity whose key is present and usable.

use crate::error::{KeychainError, Result};
use crate::keychain::identity::{first_match, SigningIdentity};
use crate::keychain::scratch::ScratchDir;
use crate::keychain::security::SecurityTool;
use std::path::Path;

/// Prefix used when none is configured.
pub const DEFAULT_IDENTITY_PREFIX: &str = "Apple Development";

/// States the resolver passes through, in visiting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionState {
    /// Enumerating valid identities in the keychain.
    Listing,
    /// No identity matched the prefix.
    NoMatch,
    /// Trust repair ran; `applied` is false when extraction or trust failed.
    TrustRepairAttempted { applied: bool },
    /// An identity matched.
    Matched,
    /// No identity matched after repair.
    Failed,
}

/// A resolved signing identity and how it was reached.
#[derive(Clone, Debug)]
pub struct ResolvedIdentity {
    /// The matched identity.
    pub identity: SigningIdentity,
    /// States visited, ending in [`ResolutionState::Matched`].
    pub trace: Vec<ResolutionState>,
}

impl ResolvedIdentity {
    /// Identity reference for `codesign --sign`: the quoted display name.
    pub fn id(&self) -> &str {
        &self.identity.name
    }

    /// Full listing line, for diagnostics.
    pub fn info(&self) -> &str {
        &self.identity.raw
    }

    /// Whether the match followed a trust repair that was applied.
    pub fn trust_repaired(&self) -> bool {
        self.trace
            .contains(&ResolutionState::TrustRepairAttempted { applied: true })
    }
}

enum Step {
    Listing { after_repair: bool },
    NoMatch,
    TrustRepairAttempted { applied: bool },
    Matched(SigningIdentity),
    Failed,
}

impl Step {
    fn state(&self) -> ResolutionState {
        match self {
            Step::Listing { .. } => ResolutionState::Listing,
            Step::NoMatch => ResolutionState::NoMatch,
            Step::TrustRepairAttempted { applied } => {
                ResolutionState::TrustRepairAttempted { applied: *applied }
            }
            Step::Matched(_) => ResolutionState::Matched,
            Step::Failed => ResolutionState::Failed,
        }
    }
}

/// Resolves the signing identity in one keychain by display-name prefix.
#[derive(Debug, Clone)]
pub struct IdentityResolver<'a> {
    keychain: &'a Path,
    prefix: String,
}

impl<'a> IdentityResolver<'a> {
    /// Resolver for `keychain`. A missing or empty prefix means
    /// [`DEFAULT_IDENTITY_PREFIX`].
    pub fn new(keychain: &'a Path, prefix: Option<&str>) -> Self {
        let prefix = match prefix.map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => DEFAULT_IDENTITY_PREFIX.to_string(),
        };
        Self { keychain, prefix }
    }

    /// The literal prefix being matched.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Runs the state machine to `Matched` or `Failed`.
    ///
    /// `Failed` returns [`KeychainError::IdentityNotFound`] carrying the most
    /// recent listing. A failing `find-identity` call is fatal as is.
    pub async fn resolve<T: SecurityTool>(
        &self,
        tool: &T,
        scratch: &ScratchDir,
    ) -> Result<ResolvedIdentity> {
        let mut trace = Vec::new();
        let mut listing = String::new();
        let mut step = Step::Listing {
            after_repair: false,
        };

        loop {
            trace.push(step.state());
            step = match step {
                Step::Listing { after_repair } => {
                    listing = tool.find_signing_identities(self.keychain).await?;
                    match first_match(&listing, &self.prefix) {
                        Some(identity) => Step::Matched(identity),
                        None if after_repair => Step::Failed,
                        None => Step::NoMatch,
                    }
                }
                Step::NoMatch => {
                    log::info!(
                        "No valid identity matches '{}'; attempting trust repair",
                        self.prefix
                    );
                    let applied = self.repair_trust(tool, scratch).await;
                    Step::TrustRepairAttempted { applied }
                }
                Step::TrustRepairAttempted { applied } => {
                    if !applied {
                        log::warn!("Trust repair was not applied; listing identities once more");
                    }
                    Step::Listing { after_repair: true }
                }
                Step::Matched(identity) => {
                    log::info!("✓ Resolved signing identity: {}", identity.name);
                    return Ok(ResolvedIdentity { identity, trace });
                }
                Step::Failed => {
                    log::warn!("No matching identity found. Printing all identities for debugging.");
                    log::info!("{}", listing);
                    return Err(KeychainError::IdentityNotFound {
                        prefix: self.prefix.clone(),
                        listing,
                    });
                }
            };
        }
    }

    /// Extracts the leaf certificate matching the prefix and trusts it as a
    /// root within the keychain. Returns whether trust was applied.
    ///
    /// The extraction matches by substring; the re-listing that follows still
    /// selects by literal prefix.
    ///
    /// Failures are logged only; the re-listing decides the outcome.
    async fn repair_trust<T: SecurityTool>(&self, tool: &T, scratch: &ScratchDir) -> bool {
        let pem = match tool.find_certificate_pem(self.keychain, &self.prefix).await {
            Ok(pem) if pem.contains("-----BEGIN CERTIFICATE-----") => pem,
            Ok(_) => {
                log::warn!("No certificate named '{}' to repair trust for", self.prefix);
                return false;
            }
            Err(e) => {
                log::warn!(
                    "Could not extract certificate '{}' for trust repair: {}",
                    self.prefix,
                    e
                );
                return false;
            }
        };

        let certificate = match scratch.write_private("leaf.pem", pem.as_bytes()) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Could not write certificate for trust repair: {}", e);
                return false;
            }
        };

        match tool.trust_as_root(self.keychain, &certificate).await {
            Ok(()) => {
                log::info!("Marked '{}' as trusted root in the keychain", self.prefix);
                true
            }
            Err(e) => {
                log::warn!("Trust repair failed: {}", e);
                false
            }
        }
    }
}
