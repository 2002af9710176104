//! Boundary to the macOS `security(1)` credential-store tool.
//!
//! [`SecurityTool`] lists every keychain operation the lifecycle needs.
//! [`SecurityCli`] implements it by spawning `security` with argument vectors,
//! never through a shell, so passwords and paths containing quotes or spaces
//! cannot change the command's structure.

use crate::error::{KeychainError, Result};
use crate::keychain::search_list::parse_keychain_list;
use crate::keychain::secret::KeychainPassword;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Fallback location of `security` when it is not on `PATH`.
pub const DEFAULT_SECURITY_PATH: &str = "/usr/bin/security";

/// Keychain operations required by the setup and cleanup phases.
///
/// Each call runs to completion before the next one starts; implementations
/// must not reorder or batch them.
#[allow(async_fn_in_trait)]
pub trait SecurityTool {
    /// Creates an empty keychain at `keychain` protected by `password`.
    async fn create_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()>;

    /// Deletes the keychain file and removes it from the search list.
    async fn delete_keychain(&self, keychain: &Path) -> Result<()>;

    /// Unlocks `keychain` with `password`.
    async fn unlock_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()>;

    /// Sets the inactivity timeout after which `keychain` relocks itself.
    async fn set_auto_lock(&self, keychain: &Path, seconds: u32) -> Result<()>;

    /// Returns the user's default keychain, if one is set.
    async fn default_keychain(&self) -> Result<Option<PathBuf>>;

    /// Makes `keychain` the user's default keychain.
    async fn set_default_keychain(&self, keychain: &Path) -> Result<()>;

    /// Returns the user's keychain search list in order.
    async fn search_list(&self) -> Result<Vec<PathBuf>>;

    /// Replaces the user's keychain search list.
    async fn set_search_list(&self, keychains: &[PathBuf]) -> Result<()>;

    /// Imports a PKCS#12 file, pre-authorizing `authorized_tools` for the key.
    async fn import(
        &self,
        file: &Path,
        keychain: &Path,
        passphrase: &str,
        authorized_tools: &[PathBuf],
    ) -> Result<()>;

    /// Sets the key partition list so `codesign` never prompts.
    async fn grant_key_partition_access(
        &self,
        keychain: &Path,
        password: &KeychainPassword,
        partitions: &str,
    ) -> Result<()>;

    /// Raw `find-identity` listing of valid code-signing identities.
    async fn find_signing_identities(&self, keychain: &Path) -> Result<String>;

    /// PEM text of the first certificate whose name contains `name`.
    ///
    /// `find-certificate -c` matches substrings, so this may return a
    /// certificate the resolver's literal prefix would not select. Callers
    /// must re-check any identity against the prefix afterwards.
    async fn find_certificate_pem(&self, keychain: &Path, name: &str) -> Result<String>;

    /// Marks the certificate in `certificate` as a trusted root within `keychain`.
    async fn trust_as_root(&self, keychain: &Path, certificate: &Path) -> Result<()>;
}

/// [`SecurityTool`] backed by the `security` executable.
#[derive(Debug, Clone)]
pub struct SecurityCli {
    program: PathBuf,
}

impl SecurityCli {
    /// Uses the given `security` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Finds `security` on `PATH`, falling back to `/usr/bin/security`.
    pub fn locate() -> Self {
        match which::which("security") {
            Ok(path) => {
                log::debug!("Found security at: {}", path.display());
                Self::new(path)
            }
            Err(e) => {
                log::debug!(
                    "security not found in PATH: {}. Falling back to {}",
                    e,
                    DEFAULT_SECURITY_PATH
                );
                Self::new(DEFAULT_SECURITY_PATH)
            }
        }
    }

    /// Path of the executable this runner spawns.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, subcommand: &str) -> SecurityCommand {
        SecurityCommand::new(&self.program, subcommand)
    }
}

impl SecurityTool for SecurityCli {
    async fn create_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()> {
        self.command("create-keychain")
            .arg("-p")
            .secret(password.expose())
            .arg(keychain)
            .run()
            .await
            .map(drop)
    }

    async fn delete_keychain(&self, keychain: &Path) -> Result<()> {
        self.command("delete-keychain").arg(keychain).run().await.map(drop)
    }

    async fn unlock_keychain(&self, keychain: &Path, password: &KeychainPassword) -> Result<()> {
        self.command("unlock-keychain")
            .arg("-p")
            .secret(password.expose())
            .arg(keychain)
            .run()
            .await
            .map(drop)
    }

    async fn set_auto_lock(&self, keychain: &Path, seconds: u32) -> Result<()> {
        // -l locks on sleep, -u locks after the -t timeout
        self.command("set-keychain-settings")
            .arg("-l")
            .arg("-u")
            .arg("-t")
            .arg(seconds.to_string())
            .arg(keychain)
            .run()
            .await
            .map(drop)
    }

    async fn default_keychain(&self) -> Result<Option<PathBuf>> {
        let stdout = self
            .command("default-keychain")
            .arg("-d")
            .arg("user")
            .run()
            .await?;
        Ok(parse_keychain_list(&stdout).into_iter().next())
    }

    async fn set_default_keychain(&self, keychain: &Path) -> Result<()> {
        self.command("default-keychain")
            .arg("-d")
            .arg("user")
            .arg("-s")
            .arg(keychain)
            .run()
            .await
            .map(drop)
    }

    async fn search_list(&self) -> Result<Vec<PathBuf>> {
        let stdout = self
            .command("list-keychains")
            .arg("-d")
            .arg("user")
            .run()
            .await?;
        Ok(parse_keychain_list(&stdout))
    }

    async fn set_search_list(&self, keychains: &[PathBuf]) -> Result<()> {
        let mut cmd = self.command("list-keychains").arg("-d").arg("user").arg("-s");
        for keychain in keychains {
            cmd = cmd.arg(keychain);
        }
        cmd.run().await.map(drop)
    }

    async fn import(
        &self,
        file: &Path,
        keychain: &Path,
        passphrase: &str,
        authorized_tools: &[PathBuf],
    ) -> Result<()> {
        let mut cmd = self
            .command("import")
            .arg(file)
            .arg("-k")
            .arg(keychain)
            .arg("-P")
            .secret(passphrase)
            .arg("-f")
            .arg("pkcs12");
        for tool in authorized_tools {
            cmd = cmd.arg("-T").arg(tool);
        }
        cmd.run().await.map(drop)
    }

    async fn grant_key_partition_access(
        &self,
        keychain: &Path,
        password: &KeychainPassword,
        partitions: &str,
    ) -> Result<()> {
        self.command("set-key-partition-list")
            .arg("-S")
            .arg(partitions)
            .arg("-s")
            .arg("-k")
            .secret(password.expose())
            .arg(keychain)
            .run()
            .await
            .map(drop)
    }

    async fn find_signing_identities(&self, keychain: &Path) -> Result<String> {
        self.command("find-identity")
            .arg("-v")
            .arg("-p")
            .arg("codesigning")
            .arg(keychain)
            .run()
            .await
    }

    async fn find_certificate_pem(&self, keychain: &Path, name: &str) -> Result<String> {
        self.command("find-certificate")
            .arg("-c")
            .arg(name)
            .arg("-p")
            .arg(keychain)
            .run()
            .await
    }

    async fn trust_as_root(&self, keychain: &Path, certificate: &Path) -> Result<()> {
        self.command("add-trusted-cert")
            .arg("-r")
            .arg("trustRoot")
            .arg("-k")
            .arg(keychain)
            .arg(certificate)
            .run()
            .await
            .map(drop)
    }
}

/// One `security` invocation, with secret arguments tracked for redaction.
struct SecurityCommand {
    program: PathBuf,
    args: Vec<OsString>,
    redacted: Vec<bool>,
}

impl SecurityCommand {
    fn new(program: &Path, subcommand: &str) -> Self {
        Self {
            program: program.to_path_buf(),
            args: vec![OsString::from(subcommand)],
            redacted: vec![false],
        }
    }

    fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self.redacted.push(false);
        self
    }

    fn secret(mut self, value: &str) -> Self {
        self.args.push(OsString::from(value));
        self.redacted.push(true);
        self
    }

    /// Command line for logs and errors, with secrets replaced by `***`.
    fn display(&self) -> String {
        let mut line = String::from("security");
        for (arg, redacted) in self.args.iter().zip(&self.redacted) {
            line.push(' ');
            if *redacted {
                line.push_str("***");
            } else {
                line.push_str(&arg.to_string_lossy());
            }
        }
        line
    }

    /// Runs to completion and returns stdout, failing on a non-zero exit.
    async fn run(self) -> Result<String> {
        let display = self.display();
        log::debug!("Running: {}", display);

        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| KeychainError::CommandFailed {
                command: display.clone(),
                reason: format!("failed to execute {}: {}", self.program.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KeychainError::CommandFailed {
                command: display,
                reason: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
