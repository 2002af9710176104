//! Kodegen Keychain - ephemeral signing keychain for CI builds.
//!
//! `setup` provisions the keychain and resolves the signing identity;
//! `cleanup` tears it down and never fails the job.

use kodegen_bundler_keychain::cli;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Run CLI and get exit code
    let exit_code = match cli::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            for suggestion in e.recovery_suggestions() {
                eprintln!("  hint: {}", suggestion);
            }
            1
        }
    };

    process::exit(exit_code);
}
