//! Certificate import and signing-tool key access.

use crate::error::{KeychainError, Result};
use crate::keychain::provision::EphemeralKeychain;
use crate::keychain::scratch::ScratchDir;
use crate::keychain::security::SecurityTool;
use std::path::PathBuf;

/// Signing tool pre-authorized for the imported private key.
pub const DEFAULT_SIGN_TOOL: &str = "/usr/bin/codesign";

/// Partitions granted so automated `codesign` runs never prompt.
pub const DEFAULT_PARTITION_LIST: &str = "apple-tool:,apple:,codesign:";

/// Decoded PKCS#12 container and its passphrase.
pub struct CertificatePayload {
    bytes: Vec<u8>,
    passphrase: String,
}

impl CertificatePayload {
    /// Wraps decoded certificate bytes.
    pub fn new(bytes: Vec<u8>, passphrase: impl Into<String>) -> Self {
        Self {
            bytes,
            passphrase: passphrase.into(),
        }
    }

    /// Decodes a base64 certificate as supplied by CI secrets.
    pub fn from_base64(encoded: &str, passphrase: impl Into<String>) -> Result<Self> {
        use base64::Engine;
        // Secrets pasted through CI UIs often carry line breaks.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;
        Ok(Self::new(bytes, passphrase))
    }
}

impl std::fmt::Debug for CertificatePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePayload")
            .field("bytes", &format!("<{} bytes>", self.bytes.len()))
            .field("passphrase", &"<hidden>")
            .finish()
    }
}

/// Imports a certificate and grants signing tools access to its key.
#[derive(Debug, Clone)]
pub struct IdentityImporter {
    authorized_tools: Vec<PathBuf>,
    partitions: String,
}

impl Default for IdentityImporter {
    fn default() -> Self {
        Self::new(vec![PathBuf::from(DEFAULT_SIGN_TOOL)], DEFAULT_PARTITION_LIST)
    }
}

impl IdentityImporter {
    /// Importer authorizing `authorized_tools` and granting `partitions`.
    pub fn new(authorized_tools: Vec<PathBuf>, partitions: impl Into<String>) -> Self {
        Self {
            authorized_tools,
            partitions: partitions.into(),
        }
    }

    /// Writes the payload to `scratch`, imports it into `keychain`, then sets
    /// the key partition list.
    ///
    /// Both steps are fatal on failure; nothing downstream works without a
    /// usable imported key.
    pub async fn import<T: SecurityTool>(
        &self,
        tool: &T,
        keychain: &EphemeralKeychain,
        payload: &CertificatePayload,
        scratch: &ScratchDir,
    ) -> Result<()> {
        let certificate = scratch.write_certificate(&payload.bytes)?;

        log::info!("Importing certificate into {}", keychain.path().display());
        tool.import(
            &certificate,
            keychain.path(),
            &payload.passphrase,
            &self.authorized_tools,
        )
        .await
        .map_err(|e| KeychainError::ImportFailed {
            reason: e.to_string(),
        })?;

        log::debug!("Granting key partitions {}", self.partitions);
        tool.grant_key_partition_access(keychain.path(), keychain.password(), &self.partitions)
            .await
            .map_err(|e| KeychainError::ImportFailed {
                reason: format!("could not grant signing tools access to the key: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::fake::{self, FakeSecurity};
    use crate::keychain::provision::DEFAULT_AUTO_LOCK_SECONDS;
    use crate::keychain::secret::KeychainPassword;

    async fn provisioned(tool: &FakeSecurity, dir: &std::path::Path) -> EphemeralKeychain {
        let kc = EphemeralKeychain::new(
            dir.join("ci.keychain-db"),
            KeychainPassword::generate().unwrap(),
            DEFAULT_AUTO_LOCK_SECONDS,
        );
        kc.provision(tool).await.unwrap();
        kc
    }

    #[test]
    fn decodes_wrapped_base64() {
        let payload = CertificatePayload::from_base64("cDEy\nYnl0\r\nZXM=", "pw").unwrap();
        assert_eq!(payload.bytes, b"p12bytes");
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = CertificatePayload::from_base64("not base64!", "pw").unwrap_err();
        assert!(matches!(err, KeychainError::InvalidCertificate(_)));
    }

    #[test]
    fn debug_hides_payload() {
        let payload = CertificatePayload::new(b"secret-key".to_vec(), "pw1");
        let debug = format!("{:?}", payload);
        assert!(!debug.contains("pw1"));
        assert!(debug.contains("<10 bytes>"));
    }

    #[tokio::test]
    async fn import_grants_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        let kc = provisioned(&tool, dir.path()).await;
        let scratch = ScratchDir::new().unwrap();
        let payload = CertificatePayload::new(
            fake::payload("pw1", &[("Apple Development: Jane Doe (ABCDE12345)", true)]),
            "pw1",
        );

        IdentityImporter::default()
            .import(&tool, &kc, &payload, &scratch)
            .await
            .unwrap();

        assert_eq!(tool.partitions(kc.path()).as_deref(), Some(DEFAULT_PARTITION_LIST));
        let listing = tool.find_signing_identities(kc.path()).await.unwrap();
        assert!(listing.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn wrong_passphrase_is_an_import_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeSecurity::new();
        let kc = provisioned(&tool, dir.path()).await;
        let scratch = ScratchDir::new().unwrap();
        let payload = CertificatePayload::new(fake::payload("pw1", &[("Apple Development: X", true)]), "wrong");

        let err = IdentityImporter::default()
            .import(&tool, &kc, &payload, &scratch)
            .await
            .unwrap_err();

        assert!(matches!(err, KeychainError::ImportFailed { .. }));
        assert!(!tool.calls().contains(&"grant_key_partition_access".to_string()));
    }
}
