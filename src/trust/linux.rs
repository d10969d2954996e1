// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::trust::{same_pem, validate_cert_path, TrustOutcome, TrustStore};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for the trust store refresh command
const REFRESH_TIMEOUT_SECS: u64 = 60;

/// Where one family of distributions keeps local trust anchors.
#[derive(Debug, PartialEq, Eq)]
pub struct DistroLayout {
    pub name: &'static str,
    /// File whose presence identifies the family.
    pub marker: &'static str,
    pub anchor_dir: &'static str,
    /// Command that rebuilds the system bundle from the anchor directory.
    pub refresh: &'static [&'static str],
}

/// Checked in order; the first marker found wins. New distributions are
/// added here.
pub const DISTRO_TABLE: &[DistroLayout] = &[
    DistroLayout {
        name: "Debian/Ubuntu ca-certificates",
        marker: "/etc/debian_version",
        anchor_dir: "/usr/local/share/ca-certificates",
        refresh: &["update-ca-certificates"],
    },
    DistroLayout {
        name: "Arch trust",
        marker: "/etc/arch-release",
        anchor_dir: "/etc/ca-certificates/trust-source/anchors",
        refresh: &["trust", "extract-compat"],
    },
    DistroLayout {
        name: "RedHat ca-trust",
        marker: "/etc/redhat-release",
        anchor_dir: "/etc/pki/ca-trust/source/anchors",
        refresh: &["update-ca-trust", "extract"],
    },
    DistroLayout {
        name: "Fedora ca-trust",
        marker: "/etc/fedora-release",
        anchor_dir: "/etc/pki/ca-trust/source/anchors",
        refresh: &["update-ca-trust", "extract"],
    },
];

fn under(sysroot: &Path, absolute: &str) -> PathBuf {
    sysroot.join(absolute.trim_start_matches('/'))
}

/// Pick the layout for the system rooted at `sysroot`, defaulting to the
/// Debian layout when no marker is present.
pub fn detect_layout(sysroot: &Path) -> &'static DistroLayout {
    DISTRO_TABLE
        .iter()
        .find(|layout| under(sysroot, layout.marker).exists())
        .unwrap_or(&DISTRO_TABLE[0])
}

pub struct LinuxTrustStore {
    sysroot: PathBuf,
    layout: &'static DistroLayout,
    file_name: String,
}

impl LinuxTrustStore {
    pub fn detect(sysroot: &Path, file_name: &str) -> Self {
        Self {
            sysroot: sysroot.to_path_buf(),
            layout: detect_layout(sysroot),
            file_name: file_name.to_string(),
        }
    }

    pub fn anchor_path(&self) -> PathBuf {
        under(&self.sysroot, self.layout.anchor_dir).join(&self.file_name)
    }

    fn is_live_system(&self) -> bool {
        self.sysroot == Path::new("/")
    }
}

impl TrustStore for LinuxTrustStore {
    fn install(&self, cert_path: &Path) -> Result<TrustOutcome> {
        let safe_cert_path = validate_cert_path(cert_path)?;

        if self.is_trusted(&safe_cert_path)? {
            return Ok(TrustOutcome::AlreadyTrusted);
        }

        let dest = self.anchor_path();
        if dest.exists() {
            return Err(Error::TrustStore(format!(
                "{} already holds a different certificate; remove it to trust this root CA",
                dest.display()
            )));
        }
        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).map_err(|e| copy_error(dir, e))?;
        }
        std::fs::copy(&safe_cert_path, &dest).map_err(|e| copy_error(&dest, e))?;
        info!(path = %dest.display(), "copied root certificate into {}", self.layout.name);

        if self.is_live_system() {
            run_refresh_command(self.layout.refresh)?;
        } else {
            debug!(sysroot = %self.sysroot.display(), "not the live system, skipping refresh");
        }

        Ok(TrustOutcome::Installed(dest))
    }

    fn is_trusted(&self, cert_path: &Path) -> Result<bool> {
        // Our anchor file must exist AND match the provided certificate
        let trusted_content = match std::fs::read_to_string(self.anchor_path()) {
            Ok(content) => content,
            Err(_) => return Ok(false),
        };

        let our_content = std::fs::read_to_string(cert_path).map_err(|e| Error::ArtifactRead {
            path: cert_path.to_path_buf(),
            source: e,
        })?;

        Ok(same_pem(&trusted_content, &our_content))
    }

    fn name(&self) -> &'static str {
        self.layout.name
    }
}

fn copy_error(path: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        Error::InsufficientPrivilege(format!("cannot write {}", path.display()))
    } else {
        Error::TrustStore(format!("Failed to write {}: {}", path.display(), e))
    }
}

/// Run a command with a timeout. Returns the command output or an error.
fn run_command_with_timeout(
    command: &str,
    args: &[&str],
    timeout_secs: u64,
) -> Result<std::process::Output> {
    let mut child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound {
                    command: command.to_string(),
                    hint: get_install_hint(command),
                }
            } else {
                Error::Command {
                    command: command.to_string(),
                    stderr: e.to_string(),
                }
            }
        })?;

    let timeout = Duration::from_secs(timeout_secs);
    let start = std::time::Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(_)) => {
                return child.wait_with_output().map_err(|e| Error::Command {
                    command: command.to_string(),
                    stderr: e.to_string(),
                });
            }
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // Kill and reap so no zombie is left behind
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Error::TrustStore(format!(
                        "{} timed out after {} seconds",
                        command, timeout_secs
                    )));
                }
                thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                return Err(Error::Command {
                    command: command.to_string(),
                    stderr: e.to_string(),
                });
            }
        }
    }
}

/// Get installation hint for missing commands
fn get_install_hint(command: &str) -> String {
    match command {
        "update-ca-certificates" => {
            "Install ca-certificates package: sudo apt install ca-certificates".to_string()
        }
        "update-ca-trust" => {
            "Install ca-certificates package: sudo dnf install ca-certificates".to_string()
        }
        "trust" => "Install p11-kit-trust package: sudo pacman -S p11-kit".to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}

fn run_refresh_command(args: &[&str]) -> Result<()> {
    let (cmd, rest) = args
        .split_first()
        .ok_or_else(|| Error::TrustStore("No command provided".into()))?;

    let output = run_command_with_timeout(cmd, rest, REFRESH_TIMEOUT_SECS)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Permission denied") {
            return Err(Error::InsufficientPrivilege(format!(
                "{} could not update the system bundle",
                cmd
            )));
        }
        return Err(Error::Command {
            command: args.join(" "),
            stderr: stderr.trim().to_string(),
        });
    }

    debug!(command = %args.join(" "), "refreshed system trust bundle");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sysroot_with_marker(marker: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        if let Some(marker) = marker {
            let path = under(dir.path(), marker);
            std::fs::create_dir_all(path.parent().expect("marker has a parent"))
                .expect("etc should be created");
            std::fs::write(&path, "1").expect("marker should be written");
        }
        dir
    }

    #[test]
    fn test_detect_layout() {
        let none = sysroot_with_marker(None);
        assert_eq!(detect_layout(none.path()).marker, "/etc/debian_version");

        let arch = sysroot_with_marker(Some("/etc/arch-release"));
        assert_eq!(
            detect_layout(arch.path()).anchor_dir,
            "/etc/ca-certificates/trust-source/anchors"
        );

        let fedora = sysroot_with_marker(Some("/etc/fedora-release"));
        assert_eq!(
            detect_layout(fedora.path()).anchor_dir,
            "/etc/pki/ca-trust/source/anchors"
        );
    }

    #[test]
    fn test_install_into_sysroot_is_idempotent() {
        let sysroot = sysroot_with_marker(Some("/etc/redhat-release"));
        let certs = tempfile::tempdir().expect("temp dir should be created");
        let cert = certs.path().join("rootCA.crt");
        std::fs::write(&cert, "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n")
            .expect("cert should be written");

        let store = LinuxTrustStore::detect(sysroot.path(), "crtforge-test-rootCA.crt");
        let expected = sysroot
            .path()
            .join("etc/pki/ca-trust/source/anchors/crtforge-test-rootCA.crt");

        assert!(!store.is_trusted(&cert).expect("check should succeed"));
        assert_eq!(
            store.install(&cert).expect("install should succeed"),
            TrustOutcome::Installed(expected.clone())
        );
        assert!(store.is_trusted(&cert).expect("check should succeed"));
        assert_eq!(
            store.install(&cert).expect("second install should succeed"),
            TrustOutcome::AlreadyTrusted
        );
        assert_eq!(
            std::fs::read(&expected).expect("anchor readable"),
            std::fs::read(&cert).expect("cert readable")
        );
    }

    #[test]
    fn test_different_anchor_is_not_overwritten() {
        let sysroot = sysroot_with_marker(None);
        let certs = tempfile::tempdir().expect("temp dir should be created");
        let first = certs.path().join("first.crt");
        let second = certs.path().join("second.crt");
        std::fs::write(&first, "FIRST\n").expect("cert should be written");
        std::fs::write(&second, "SECOND\n").expect("cert should be written");

        let store = LinuxTrustStore::detect(sysroot.path(), "crtforge-test-rootCA.crt");
        store.install(&first).expect("install should succeed");

        let err = store.install(&second).expect_err("a different anchor must be kept");
        assert!(matches!(err, Error::TrustStore(ref msg) if msg.contains("crtforge-test-rootCA.crt")));
        assert!(!err.is_fatal());
        assert_eq!(
            std::fs::read_to_string(store.anchor_path()).expect("anchor readable"),
            "FIRST\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_anchor_dir_needs_privilege() {
        use std::os::unix::fs::PermissionsExt;

        // Permission bits do not bind root
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let sysroot = sysroot_with_marker(Some("/etc/debian_version"));
        let anchors = under(sysroot.path(), "/usr/local/share/ca-certificates");
        std::fs::create_dir_all(&anchors).expect("anchor dir should be created");
        std::fs::set_permissions(&anchors, std::fs::Permissions::from_mode(0o555))
            .expect("permissions should be set");

        let certs = tempfile::tempdir().expect("temp dir should be created");
        let cert = certs.path().join("rootCA.crt");
        std::fs::write(&cert, "CERT").expect("cert should be written");

        let store = LinuxTrustStore::detect(sysroot.path(), "crtforge-test-rootCA.crt");
        let err = store.install(&cert).expect_err("read-only dir must fail");
        assert!(matches!(err, Error::InsufficientPrivilege(_)));
        assert!(err.remediation().is_some());

        std::fs::set_permissions(&anchors, std::fs::Permissions::from_mode(0o755))
            .expect("permissions should be restored");
    }

    #[test]
    fn test_get_install_hint() {
        assert!(get_install_hint("update-ca-certificates").contains("apt"));
        assert!(get_install_hint("update-ca-trust").contains("dnf"));
        assert!(get_install_hint("trust").contains("pacman"));
        assert!(get_install_hint("other").contains("'other'"));
    }
}
