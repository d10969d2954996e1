// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::path::Path;

/// Concatenate the leaf, intermediate and root certificate files, in that
/// order, byte for byte.
///
/// Every input is read before anything is returned, so an unreadable file
/// never yields a partial chain.
pub fn build_fullchain(leaf_cert: &Path, intermediate_cert: &Path, root_cert: &Path) -> Result<Vec<u8>> {
    let mut chain = Vec::new();
    for path in [leaf_cert, intermediate_cert, root_cert] {
        let pem = std::fs::read(path).map_err(|e| Error::ArtifactRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        chain.extend_from_slice(&pem);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fullchain_order() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let leaf = dir.path().join("app.crt");
        let inter = dir.path().join("intermediateCA.crt");
        let root = dir.path().join("rootCA.crt");
        std::fs::write(&leaf, "LEAF\n").expect("write should succeed");
        std::fs::write(&inter, "INTER\n").expect("write should succeed");
        std::fs::write(&root, "ROOT\n").expect("write should succeed");

        let chain = build_fullchain(&leaf, &inter, &root).expect("chain should build");
        assert_eq!(chain, b"LEAF\nINTER\nROOT\n");
    }

    #[test]
    fn test_fullchain_missing_input() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let leaf = dir.path().join("app.crt");
        let inter = dir.path().join("intermediateCA.crt");
        std::fs::write(&leaf, "LEAF\n").expect("write should succeed");
        std::fs::write(&inter, "INTER\n").expect("write should succeed");

        match build_fullchain(&leaf, &inter, &dir.path().join("rootCA.crt")) {
            Err(Error::ArtifactRead { path, .. }) => assert!(path.ends_with("rootCA.crt")),
            other => panic!("expected ArtifactRead, got {:?}", other.map(|c| c.len())),
        }
    }
}
