// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Certificate signing failed: {0}")]
    CertificateSigning(String),

    #[error("Failed to read {path}: {source}")]
    ArtifactRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("PKCS#12 encoding failed: {0}")]
    Encoding(String),

    #[error("Trust installation is not supported on '{os}'")]
    UnsupportedPlatform { os: String },

    #[error("Insufficient privileges: {0}")]
    InsufficientPrivilege(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("No domains specified")]
    NoDomains,

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{path} is out of date: {reason}; remove it to regenerate")]
    StaleArtifact { path: PathBuf, reason: String },

    #[error("Another crtforge run holds the lock at {0}")]
    Locked(PathBuf),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Trust store operation failed: {0}")]
    TrustStore(String),

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },
}

impl Error {
    /// Whether this error must abort the run.
    ///
    /// Errors from the optional steps (PKCS#12 export, trust installation)
    /// are reported as warnings; the issued chain is still valid output.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Encoding(_)
                | Error::UnsupportedPlatform { .. }
                | Error::InsufficientPrivilege(_)
                | Error::TrustStore(_)
                | Error::CommandNotFound { .. }
                | Error::Command { .. }
        )
    }

    /// What the user can do about a non-fatal error.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Error::InsufficientPrivilege(_) => Some(
                "Re-run with elevated privileges (sudo) to install the trust anchor.".to_string(),
            ),
            Error::UnsupportedPlatform { .. } => Some(
                "Import rootCA.crt into your system or browser trust store manually.".to_string(),
            ),
            Error::Encoding(_) => {
                Some("Re-run with --pfx once the inputs above are fixed.".to_string())
            }
            Error::TrustStore(_) | Error::Command { .. } => Some(
                "Install the root certificate manually or re-run with --trust.".to_string(),
            ),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
