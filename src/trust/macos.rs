// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::fs::path_to_str;
use crate::trust::{validate_cert_path, TrustOutcome, TrustStore};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::info;

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

pub struct MacOsTrustStore;

fn security(args: &[&str]) -> Result<Output> {
    Command::new("security")
        .args(args)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound {
                    command: "security".into(),
                    hint: "The macOS 'security' tool is missing from PATH".into(),
                }
            } else {
                Error::Command {
                    command: format!("security {}", args.first().copied().unwrap_or_default()),
                    stderr: e.to_string(),
                }
            }
        })
}

#[cfg(unix)]
fn is_superuser() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_superuser() -> bool {
    false
}

impl TrustStore for MacOsTrustStore {
    fn install(&self, cert_path: &Path) -> Result<TrustOutcome> {
        // Validate path to prevent command injection
        let safe_cert_path = validate_cert_path(cert_path)?;

        if self.is_trusted(&safe_cert_path)? {
            return Ok(TrustOutcome::AlreadyTrusted);
        }

        if !is_superuser() {
            return Err(Error::InsufficientPrivilege(
                "adding a trusted root to the System keychain requires root".into(),
            ));
        }

        let cert_path_str = path_to_str(&safe_cert_path)?;
        let output = security(&[
            "add-trusted-cert",
            "-d", // add to admin cert store
            "-r",
            "trustRoot", // trust as root CA
            "-k",
            SYSTEM_KEYCHAIN,
            cert_path_str,
        ])?;

        if !output.status.success() {
            return Err(Error::Command {
                command: "security add-trusted-cert".into(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(keychain = SYSTEM_KEYCHAIN, "added trusted root");
        Ok(TrustOutcome::Installed(PathBuf::from(SYSTEM_KEYCHAIN)))
    }

    fn is_trusted(&self, cert_path: &Path) -> Result<bool> {
        let cert_path_str = path_to_str(cert_path)?;
        let output = security(&["verify-cert", "-c", cert_path_str])?;
        Ok(output.status.success())
    }

    fn name(&self) -> &'static str {
        "macOS Keychain"
    }
}
