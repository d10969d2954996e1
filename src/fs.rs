// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::path::Path;

pub fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))
}

fn temp_sibling(path: &Path) -> Result<std::path::PathBuf> {
    // Same directory so the rename stays on one filesystem
    let parent = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.to_path_buf()))?;
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    Ok(parent.join(format!(".tmp-{:x}", random_suffix)))
}

fn publish(temp_path: &Path, path: &Path) -> Result<()> {
    std::fs::rename(temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = std::fs::remove_file(temp_path);
        }
        Error::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Atomically write data to a file using a temporary file and rename.
/// Readers never observe a half-written artifact.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs;
    use std::io::Write;

    let temp_path = temp_sibling(path)?;

    let mut file = fs::File::create(&temp_path).map_err(|e| Error::ArtifactWrite {
        path: temp_path.clone(),
        source: e,
    })?;

    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::ArtifactWrite {
                path: temp_path.clone(),
                source: e,
            }
        })?;

    drop(file);

    publish(&temp_path, path)
}

/// Atomically write a secret (owner-only, mode 0600) using temp file and rename.
pub fn atomic_write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(path)?;

    if let Err(e) = write_secret_file(&temp_path, contents) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    publish(&temp_path, path)
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| Error::ArtifactWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::ArtifactWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Create a directory (and missing parents) readable only by the owner.
///
/// An existing directory is left as it is.
pub fn create_private_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder
        .create(path)
        .map_err(|e| Error::DirectoryCreation {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(true)
}

/// Directory name reserved for the root CA under each CA tree.
pub const ROOT_CA_DIR: &str = "rootCA";

/// Check that a logical name (CA or app) is usable as a single path segment.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    if name.trim().is_empty() {
        return invalid("name cannot be empty");
    }
    if name.contains('\0') {
        return invalid("name contains null byte");
    }
    if name.contains("..") {
        return invalid("name contains path traversal sequence");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("name contains path separator");
    }
    if name.starts_with('.') {
        return invalid("name cannot start with a dot");
    }
    if name.starts_with('-') {
        return invalid("name cannot start with a dash");
    }
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_' | ' ') {
            return invalid(&format!("name contains invalid character: '{}'", c));
        }
    }
    Ok(())
}

/// Case-preserving, reversible form of a name for use in system-wide file
/// names. Bytes outside `[A-Za-z0-9-]` become `_xx` (lowercase hex), so two
/// distinct names never map to the same file.
pub fn escape_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' {
            escaped.push(char::from(b));
        } else {
            escaped.push_str(&format!("_{:02x}", b));
        }
    }
    escaped
}
