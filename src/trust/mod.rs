// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

mod linux;
mod macos;

pub use linux::{detect_layout, DistroLayout, LinuxTrustStore, DISTRO_TABLE};
pub use macos::MacOsTrustStore;

use crate::error::{Error, Result};
use crate::fs::escape_name;
use std::path::{Path, PathBuf};

/// The host a trust anchor is installed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPlatform {
    /// Linux with its filesystem rooted at `sysroot` (normally `/`).
    Linux { sysroot: PathBuf },
    MacOs,
    Unsupported(String),
}

impl HostPlatform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier as found in `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => HostPlatform::Linux {
                sysroot: PathBuf::from("/"),
            },
            "macos" => HostPlatform::MacOs,
            other => HostPlatform::Unsupported(other.to_string()),
        }
    }
}

/// Result of a successful trust installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustOutcome {
    /// Written to this anchor file or keychain.
    Installed(PathBuf),
    AlreadyTrusted,
}

pub trait TrustStore {
    fn install(&self, cert_path: &Path) -> Result<TrustOutcome>;
    fn is_trusted(&self, cert_path: &Path) -> Result<bool>;
    fn name(&self) -> &'static str;
}

/// File name of a root CA inside a system anchor directory. Distinct CA
/// names always give distinct file names.
pub fn installed_cert_name(root_ca_name: &str) -> String {
    format!("crtforge-{}-rootCA.crt", escape_name(root_ca_name))
}

pub fn trust_store_for(platform: &HostPlatform, root_ca_name: &str) -> Result<Box<dyn TrustStore>> {
    match platform {
        HostPlatform::Linux { sysroot } => Ok(Box::new(LinuxTrustStore::detect(
            sysroot,
            &installed_cert_name(root_ca_name),
        ))),
        HostPlatform::MacOs => Ok(Box::new(MacOsTrustStore)),
        HostPlatform::Unsupported(os) => Err(Error::UnsupportedPlatform { os: os.clone() }),
    }
}

/// Install the root certificate at `cert_path` as a trust anchor.
pub fn install_root(
    platform: &HostPlatform,
    cert_path: &Path,
    root_ca_name: &str,
) -> Result<TrustOutcome> {
    let store = trust_store_for(platform, root_ca_name)?;
    tracing::debug!(store = store.name(), cert = %cert_path.display(), "installing trust anchor");
    store.install(cert_path)
}

/// Validate a path for use in trust store operations.
/// Prevents command injection and path traversal attacks.
pub fn validate_cert_path(path: &Path) -> Result<PathBuf> {
    // Must be a regular file, not a directory or symlink to directory
    if !path.is_file() {
        return Err(Error::TrustStore(format!(
            "Path is not a regular file: {}",
            path.display()
        )));
    }

    // Canonicalize to resolve symlinks and get absolute path
    let canonical = path.canonicalize().map_err(|e| Error::ArtifactRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let path_str = canonical
        .to_str()
        .ok_or_else(|| Error::TrustStore("Path contains invalid UTF-8 characters".to_string()))?;

    // Reject paths with characters that could be read as shell syntax or options
    const DANGEROUS_CHARS: &[char] = &[
        ';', '&', '|', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '!', '~', '*', '?', '#',
        '\n', '\r', '\0',
    ];

    if let Some(c) = DANGEROUS_CHARS.iter().find(|c| path_str.contains(**c)) {
        return Err(Error::TrustStore(format!(
            "Path contains dangerous character '{}': {}",
            c,
            path.display()
        )));
    }

    Ok(canonical)
}

/// PEM text with line-ending differences ignored.
pub(crate) fn same_pem(a: &str, b: &str) -> bool {
    let normalize = |s: &str| s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os() {
        assert!(matches!(
            HostPlatform::from_os("linux"),
            HostPlatform::Linux { .. }
        ));
        assert_eq!(HostPlatform::from_os("macos"), HostPlatform::MacOs);
        assert_eq!(
            HostPlatform::from_os("windows"),
            HostPlatform::Unsupported("windows".into())
        );
    }

    #[test]
    fn test_installed_cert_name() {
        assert_eq!(installed_cert_name("Crtforge"), "crtforge-Crtforge-rootCA.crt");
        assert_eq!(
            installed_cert_name("My Company"),
            "crtforge-My_20Company-rootCA.crt"
        );
    }

    #[test]
    fn test_roots_differing_in_case_get_separate_anchors() {
        let sysroot = tempfile::tempdir().expect("temp dir should be created");
        let platform = HostPlatform::Linux {
            sysroot: sysroot.path().to_path_buf(),
        };
        let certs = tempfile::tempdir().expect("temp dir should be created");
        let upper = certs.path().join("upper.crt");
        let lower = certs.path().join("lower.crt");
        std::fs::write(&upper, "AAAA\n").expect("write should succeed");
        std::fs::write(&lower, "BBBB\n").expect("write should succeed");

        let first = install_root(&platform, &upper, "Acme").expect("install should succeed");
        let second = install_root(&platform, &lower, "acme").expect("install should succeed");

        let (TrustOutcome::Installed(a), TrustOutcome::Installed(b)) = (first, second) else {
            panic!("both roots should be newly installed");
        };
        assert_ne!(a, b);
        assert_eq!(std::fs::read_to_string(&a).expect("anchor readable"), "AAAA\n");
        assert_eq!(std::fs::read_to_string(&b).expect("anchor readable"), "BBBB\n");
    }

    #[test]
    fn test_unsupported_platform_leaves_cert_alone() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let cert = dir.path().join("rootCA.crt");
        std::fs::write(&cert, "CERT").expect("write should succeed");

        let err = install_root(&HostPlatform::Unsupported("plan9".into()), &cert, "Crtforge")
            .expect_err("plan9 has no trust store");

        assert!(matches!(err, Error::UnsupportedPlatform { ref os } if os == "plan9"));
        assert!(!err.is_fatal());
        assert_eq!(std::fs::read(&cert).expect("cert readable"), b"CERT");
    }

    #[test]
    fn test_validate_cert_path() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        assert!(validate_cert_path(dir.path()).is_err());
        assert!(validate_cert_path(&dir.path().join("missing.crt")).is_err());

        let cert = dir.path().join("rootCA.crt");
        std::fs::write(&cert, "CERT").expect("write should succeed");
        assert!(validate_cert_path(&cert).is_ok());
    }

    #[test]
    fn test_same_pem_ignores_line_endings() {
        assert!(same_pem("A\r\nB\r\n", "A\nB\n"));
        assert!(!same_pem("A\nB\n", "A\nC\n"));
    }
}
