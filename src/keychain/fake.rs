//! In-memory `SecurityTool` for tests.
//!
//! Models keychains with lock state and per-identity trust, the user's search
//! list and default keychain. Certificate payloads are plain text: the first
//! line is the passphrase, each further line an identity name, optionally
//! suffixed with `;untrusted`.

use crate::error::{KeychainError, Result};
use crate::keychain::secret::KeychainPassword;
use crate::keychain::security::SecurityTool;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const LOGIN: &str = "/Users/ci/Library/Keychains/login.keychain-db";

struct FakeIdentity {
    name: String,
    fingerprint: String,
    trusted: bool,
}

struct FakeKeychain {
    password: String,
    locked: bool,
    auto_lock: Option<u32>,
    partitions: Option<String>,
    identities: Vec<FakeIdentity>,
}

#[derive(Default)]
struct Inner {
    keychains: BTreeMap<PathBuf, FakeKeychain>,
    search_list: Vec<PathBuf>,
    default: Option<PathBuf>,
    failures: HashSet<String>,
    calls: Vec<String>,
    fingerprints: u32,
}

pub(crate) struct FakeSecurity {
    inner: Mutex<Inner>,
}

/// Builds a fake PKCS#12 payload.
pub(crate) fn payload(passphrase: &str, identities: &[(&str, bool)]) -> Vec<u8> {
    let mut text = format!("{passphrase}\n");
    for (name, trusted) in identities {
        text.push_str(name);
        if !trusted {
            text.push_str(";untrusted");
        }
        text.push('\n');
    }
    text.into_bytes()
}

fn failed(command: &str, reason: &str) -> KeychainError {
    KeychainError::CommandFailed {
        command: format!("security {command}"),
        reason: reason.to_string(),
    }
}

impl FakeSecurity {
    pub(crate) fn new() -> Self {
        let inner = Inner {
            search_list: vec![PathBuf::from(LOGIN)],
            default: Some(PathBuf::from(LOGIN)),
            ..Inner::default()
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Makes every later call of `op` fail.
    pub(crate) fn fail_on(&self, op: &str) {
        self.inner.lock().unwrap().failures.insert(op.to_string());
    }

    pub(crate) fn set_initial_search_list(&self, list: Vec<PathBuf>) {
        self.inner.lock().unwrap().search_list = list;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub(crate) fn current_search_list(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().search_list.clone()
    }

    pub(crate) fn current_default(&self) -> Option<PathBuf> {
        self.inner.lock().unwrap().default.clone()
    }

    pub(crate) fn keychain_exists(&self, keychain: &Path) -> bool {
        self.inner.lock().unwrap().keychains.contains_key(keychain)
    }

    pub(crate) fn is_locked(&self, keychain: &Path) -> Option<bool> {
        self.inner.lock().unwrap().keychains.get(keychain).map(|k| k.locked)
    }

    pub(crate) fn auto_lock(&self, keychain: &Path) -> Option<u32> {
        self.inner
            .lock()
            .unwrap()
            .keychains
            .get(keychain)
            .and_then(|k| k.auto_lock)
    }

    pub(crate) fn partitions(&self, keychain: &Path) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .keychains
            .get(keychain)
            .and_then(|k| k.partitions.clone())
    }

    /// Adds an identity directly, bypassing import.
    pub(crate) fn add_identity(&self, keychain: &Path, name: &str, trusted: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.fingerprints += 1;
        let fingerprint = format!("{:040X}", 0xC0DE_0000u64 + u64::from(inner.fingerprints));
        if let Some(k) = inner.keychains.get_mut(keychain) {
            k.identities.push(FakeIdentity {
                name: name.to_string(),
                fingerprint,
                trusted,
            });
        }
    }

    fn enter(&self, op: &str) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op.to_string());
        if inner.failures.contains(op) {
            return Err(failed(op, "injected failure"));
        }
        Ok(inner)
    }
}

impl SecurityTool for FakeSecurity {
    async fn create_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()> {
        let mut inner = self.enter("create_keychain")?;
        if inner.keychains.contains_key(keychain) {
            return Err(failed("create-keychain", "A keychain with the same name already exists."));
        }
        inner.keychains.insert(
            keychain.to_path_buf(),
            FakeKeychain {
                password: password.expose().to_string(),
                locked: false,
                auto_lock: None,
                partitions: None,
                identities: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_keychain(&self, keychain: &Path) -> Result<()> {
        let mut inner = self.enter("delete_keychain")?;
        if inner.keychains.remove(keychain).is_none() {
            return Err(failed("delete-keychain", "The specified keychain could not be found."));
        }
        inner.search_list.retain(|entry| entry != keychain);
        if inner.default.as_deref() == Some(keychain) {
            inner.default = None;
        }
        Ok(())
    }

    async fn unlock_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()> {
        let mut inner = self.enter("unlock_keychain")?;
        let k = inner
            .keychains
            .get_mut(keychain)
            .ok_or_else(|| failed("unlock-keychain", "The specified keychain could not be found."))?;
        if k.password != password.expose() {
            return Err(failed("unlock-keychain", "The user name or passphrase you entered is not correct."));
        }
        k.locked = false;
        Ok(())
    }

    async fn set_auto_lock(&self, keychain: &Path, seconds: u32) -> Result<()> {
        let mut inner = self.enter("set_auto_lock")?;
        let k = inner
            .keychains
            .get_mut(keychain)
            .ok_or_else(|| failed("set-keychain-settings", "The specified keychain could not be found."))?;
        k.auto_lock = Some(seconds);
        // New settings relock the keychain until the explicit unlock.
        k.locked = true;
        Ok(())
    }

    async fn default_keychain(&self) -> Result<Option<PathBuf>> {
        let inner = self.enter("default_keychain")?;
        Ok(inner.default.clone())
    }

    async fn set_default_keychain(&self, keychain: &Path) -> Result<()> {
        let mut inner = self.enter("set_default_keychain")?;
        inner.default = Some(keychain.to_path_buf());
        Ok(())
    }

    async fn search_list(&self) -> Result<Vec<PathBuf>> {
        let inner = self.enter("search_list")?;
        Ok(inner.search_list.clone())
    }

    async fn set_search_list(&self, keychains: &[PathBuf]) -> Result<()> {
        let mut inner = self.enter("set_search_list")?;
        inner.search_list = keychains.to_vec();
        Ok(())
    }

    async fn import(
        &self,
        file: &Path,
        keychain: &Path,
        passphrase: &str,
        authorized_tools: &[PathBuf],
    ) -> Result<()> {
        let bytes = std::fs::read(file)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| failed("import", "Unknown format in import."))?;
        let mut lines = text.lines();
        if lines.next() != Some(passphrase) {
            return Err(failed("import", "MAC verification failed during PKCS12 import (wrong password?)"));
        }
        let entries: Vec<(String, bool)> = lines
            .filter(|line| !line.is_empty())
            .map(|line| match line.strip_suffix(";untrusted") {
                Some(name) => (name.to_string(), false),
                None => (line.to_string(), true),
            })
            .collect();

        {
            let mut inner = self.enter("import")?;
            assert!(!authorized_tools.is_empty(), "import without -T");
            let k = inner
                .keychains
                .get(keychain)
                .ok_or_else(|| failed("import", "The specified keychain could not be found."))?;
            if k.locked {
                return Err(failed("import", "User interaction is not allowed."));
            }
        }

        for (name, trusted) in entries {
            self.add_identity(keychain, &name, trusted);
        }
        Ok(())
    }

    async fn grant_key_partition_access(
        &self,
        keychain: &Path,
        password: &KeychainPassword,
        partitions: &str,
    ) -> Result<()> {
        let mut inner = self.enter("grant_key_partition_access")?;
        let k = inner
            .keychains
            .get_mut(keychain)
            .ok_or_else(|| failed("set-key-partition-list", "The specified keychain could not be found."))?;
        if k.password != password.expose() {
            return Err(failed("set-key-partition-list", "The user name or passphrase you entered is not correct."));
        }
        k.partitions = Some(partitions.to_string());
        Ok(())
    }

    async fn find_signing_identities(&self, keychain: &Path) -> Result<String> {
        let inner = self.enter("find_signing_identities")?;
        let k = inner
            .keychains
            .get(keychain)
            .ok_or_else(|| failed("find-identity", "The specified keychain could not be found."))?;
        let valid: Vec<&FakeIdentity> = k.identities.iter().filter(|i| i.trusted).collect();
        let mut out = String::new();
        for (index, identity) in valid.iter().enumerate() {
            out.push_str(&format!(
                "  {}) {} \"{}\"\n",
                index + 1,
                identity.fingerprint,
                identity.name
            ));
        }
        out.push_str(&format!("     {} valid identities found\n", valid.len()));
        Ok(out)
    }

    async fn find_certificate_pem(&self, keychain: &Path, name: &str) -> Result<String> {
        let inner = self.enter("find_certificate_pem")?;
        let k = inner
            .keychains
            .get(keychain)
            .ok_or_else(|| failed("find-certificate", "The specified keychain could not be found."))?;
        let identity = k
            .identities
            .iter()
            .find(|i| i.name.contains(name))
            .ok_or_else(|| failed("find-certificate", "The specified item could not be found in the keychain."))?;
        Ok(format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            hex::encode(&identity.name)
        ))
    }

    async fn trust_as_root(&self, keychain: &Path, certificate: &Path) -> Result<()> {
        let pem = std::fs::read_to_string(certificate)?;
        let mut inner = self.enter("trust_as_root")?;
        let name = pem
            .lines()
            .nth(1)
            .and_then(|line| hex::decode(line).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| failed("add-trusted-cert", "Error reading file"))?;
        let k = inner
            .keychains
            .get_mut(keychain)
            .ok_or_else(|| failed("add-trusted-cert", "The specified keychain could not be found."))?;
        for identity in k.identities.iter_mut().filter(|i| i.name == name) {
            identity.trusted = true;
        }
        Ok(())
    }
}
