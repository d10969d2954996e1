// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Deterministic on-disk layout and the create-or-reuse policy.
//!
//! ```text
//! <base>/<root>/rootCA/{rootCA.key, rootCA.crt}
//! <base>/<root>/<intermediate>/{intermediateCA.key, intermediateCA.crt}
//! <base>/<root>/<app>/{<app>.key, <app>.crt, fullchain.crt, <app>.pfx}
//! ```
//!
//! [`ArtifactStore::ensure`] is the only place that decides whether an
//! artifact is created or reused. Once a file exists it is authoritative.

use crate::error::{Error, Result};
use crate::fs::{atomic_write, atomic_write_secret, create_private_dir, validate_name, ROOT_CA_DIR};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file inside each CA tree.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Whether an artifact was written by this run or found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Reused,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Created => write!(f, "created"),
            Outcome::Reused => write!(f, "reused"),
        }
    }
}

/// File mode class for a new artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Certificates and bundles of public material.
    Public,
    /// Private keys and password-protected containers (mode 0600).
    Secret,
}

/// Key and certificate locations of one CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub cert: PathBuf,
}

/// Artifact locations of one application (leaf) certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub cert: PathBuf,
    pub fullchain: PathBuf,
    pub pfx: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base: PathBuf,
}

impl ArtifactStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory holding everything issued under one root CA.
    pub fn ca_tree(&self, root_ca_name: &str) -> Result<PathBuf> {
        validate_name(root_ca_name)?;
        Ok(self.base.join(root_ca_name))
    }

    pub fn lock_path(&self, root_ca_name: &str) -> Result<PathBuf> {
        Ok(self.ca_tree(root_ca_name)?.join(LOCK_FILE_NAME))
    }

    pub fn root_ca(&self, root_ca_name: &str) -> Result<CaPaths> {
        let dir = self.ca_tree(root_ca_name)?.join(ROOT_CA_DIR);
        Ok(CaPaths {
            key: dir.join("rootCA.key"),
            cert: dir.join("rootCA.crt"),
            dir,
        })
    }

    pub fn intermediate_ca(&self, root_ca_name: &str, intermediate_name: &str) -> Result<CaPaths> {
        validate_leaf_segment(intermediate_name)?;
        let dir = self.ca_tree(root_ca_name)?.join(intermediate_name);
        Ok(CaPaths {
            key: dir.join("intermediateCA.key"),
            cert: dir.join("intermediateCA.crt"),
            dir,
        })
    }

    /// Leaf artifact paths. The app shares the CA tree with the
    /// intermediate, so the two names must differ.
    pub fn app(
        &self,
        root_ca_name: &str,
        intermediate_name: &str,
        app_name: &str,
    ) -> Result<AppPaths> {
        validate_leaf_segment(app_name)?;
        if app_name == intermediate_name {
            return Err(Error::InvalidName {
                name: app_name.to_string(),
                reason: "app name must differ from the intermediate CA name".into(),
            });
        }

        let dir = self.ca_tree(root_ca_name)?.join(app_name);
        Ok(AppPaths {
            key: dir.join(format!("{}.key", app_name)),
            cert: dir.join(format!("{}.crt", app_name)),
            fullchain: dir.join("fullchain.crt"),
            pfx: dir.join(format!("{}.pfx", app_name)),
            dir,
        })
    }

    /// Create `dir` with owner-only permissions unless it already exists.
    pub fn ensure_dir(&self, dir: &Path) -> Result<Outcome> {
        if create_private_dir(dir)? {
            debug!(path = %dir.display(), "created directory");
            Ok(Outcome::Created)
        } else {
            debug!(path = %dir.display(), "directory already exists, skipped");
            Ok(Outcome::Reused)
        }
    }

    /// Create `path` from `generate` unless it already exists.
    ///
    /// The generator only runs when the file is absent, and its output is
    /// published with a temp-file rename. A generator error leaves nothing
    /// behind.
    pub fn ensure<F>(&self, path: &Path, sensitivity: Sensitivity, generate: F) -> Result<Outcome>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if path.exists() {
            debug!(path = %path.display(), "already exists, skipped");
            return Ok(Outcome::Reused);
        }

        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
        self.ensure_dir(parent)?;

        let contents = generate()?;
        match sensitivity {
            Sensitivity::Public => atomic_write(path, &contents)?,
            Sensitivity::Secret => atomic_write_secret(path, &contents)?,
        }

        debug!(path = %path.display(), "created");
        Ok(Outcome::Created)
    }
}

fn validate_leaf_segment(name: &str) -> Result<()> {
    validate_name(name)?;
    if name == ROOT_CA_DIR {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: format!("'{}' is reserved for the root CA", ROOT_CA_DIR),
        });
    }
    Ok(())
}
