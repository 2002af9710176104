//! User-facing output: progress messages, CI annotations and step outputs.
//!
//! Under GitHub Actions, warnings and errors become workflow commands and
//! step outputs go to the `GITHUB_OUTPUT` file. Elsewhere messages go to
//! stderr and outputs are printed as `name=value` lines on stdout.

use crate::error::Result;
use crate::keychain::state::append_file_commands;
use std::io::{self, Write};
use std::path::PathBuf;

/// Output sink for the CLI
#[derive(Debug, Clone, Default)]
pub struct OutputManager {
    actions: bool,
    output_file: Option<PathBuf>,
}

impl OutputManager {
    /// Create an output manager
    pub fn new(actions: bool, output_file: Option<PathBuf>) -> Self {
        Self {
            actions,
            output_file,
        }
    }

    /// Detect GitHub Actions from the environment
    pub fn from_env() -> Self {
        let actions = std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true");
        let output_file = std::env::var_os("GITHUB_OUTPUT")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self::new(actions, output_file)
    }

    /// Whether workflow commands are emitted
    pub fn is_actions(&self) -> bool {
        self.actions
    }

    /// Print progress message
    pub fn info(&self, message: &str) -> io::Result<()> {
        self.line(message)
    }

    /// Print success message
    pub fn success(&self, message: &str) -> io::Result<()> {
        self.line(&format!("✓ {}", message))
    }

    /// Print warning message
    pub fn warn(&self, message: &str) -> io::Result<()> {
        if self.actions {
            writeln!(io::stdout().lock(), "::warning::{}", escape_data(message))
        } else {
            writeln!(io::stderr().lock(), "warning: {}", message)
        }
    }

    /// Print error annotation (the exit status is reported separately)
    pub fn error(&self, message: &str) -> io::Result<()> {
        if self.actions {
            writeln!(io::stdout().lock(), "::error::{}", escape_data(message))
        } else {
            Ok(())
        }
    }

    /// Hide `secret` from all later log output
    pub fn add_mask(&self, secret: &str) -> io::Result<()> {
        if self.actions {
            writeln!(io::stdout().lock(), "::add-mask::{}", escape_data(secret))
        } else {
            Ok(())
        }
    }

    /// Print a block of text, collapsible under Actions
    pub fn group(&self, title: &str, body: &str) -> io::Result<()> {
        if self.actions {
            let mut out = io::stdout().lock();
            writeln!(out, "::group::{}", escape_data(title))?;
            writeln!(out, "{}", body.trim_end())?;
            writeln!(out, "::endgroup::")
        } else {
            let mut err = io::stderr().lock();
            writeln!(err, "{}:", title)?;
            writeln!(err, "{}", body.trim_end())
        }
    }

    /// Set a step output
    pub fn set_output(&self, name: &str, value: &str) -> Result<()> {
        match &self.output_file {
            Some(path) => append_file_commands(path, &[(name, value.to_string())]),
            None => {
                writeln!(io::stdout().lock(), "{}={}", name, value)?;
                Ok(())
            }
        }
    }

    fn line(&self, message: &str) -> io::Result<()> {
        if self.actions {
            writeln!(io::stdout().lock(), "{}", message)
        } else {
            writeln!(io::stderr().lock(), "{}", message)
        }
    }
}

/// Escapes workflow command data so it cannot end the command early.
fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
