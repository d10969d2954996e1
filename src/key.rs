// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! RSA key material.
//!
//! Keys are generated with the `rsa` crate from the operating system's
//! entropy source and handed to `rcgen` as PKCS#8 so the same PEM form is
//! used for writing, re-loading and signing.

use crate::config::SUPPORTED_KEY_BITS;
use crate::error::{Error, Result};
use pkcs8::{EncodePrivateKey, LineEnding};
use rand_core::OsRng;
use rcgen::KeyPair;
use rsa::RsaPrivateKey;
use std::path::Path;

/// Modulus size for root and intermediate CA keys.
pub const CA_KEY_BITS: usize = 4096;

/// Modulus size for leaf (application) keys.
pub const LEAF_KEY_BITS: usize = 2048;

/// PEM label every key file carries.
pub const KEY_PEM_LABEL: &str = "PRIVATE KEY";

/// Generate a fresh RSA key pair of `bits` bits. There is no retry.
pub fn generate_key(bits: usize) -> Result<KeyPair> {
    if !SUPPORTED_KEY_BITS.contains(&bits) {
        return Err(Error::KeyGeneration(format!(
            "unsupported RSA key size {} (expected one of {:?})",
            bits, SUPPORTED_KEY_BITS
        )));
    }

    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| Error::KeyGeneration(format!("RSA-{}: {}", bits, e)))?;

    let pem = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| Error::KeyGeneration(format!("PKCS#8 encoding failed: {}", e)))?;

    KeyPair::from_pem(&pem).map_err(|e| Error::KeyGeneration(e.to_string()))
}

/// Serialize a key pair as PKCS#8 PEM.
pub fn key_pem(key_pair: &KeyPair) -> String {
    key_pair.serialize_pem()
}

/// Parse a PKCS#8 PEM private key.
pub fn parse_key_pem(pem: &str) -> Result<KeyPair> {
    let block = ::pem::parse(pem)
        .map_err(|e| Error::CertificateSigning(format!("malformed key PEM: {}", e)))?;
    if block.tag() != KEY_PEM_LABEL {
        return Err(Error::CertificateSigning(format!(
            "expected {} PEM block, got {}",
            KEY_PEM_LABEL,
            block.tag()
        )));
    }
    KeyPair::from_pem(pem).map_err(|e| Error::CertificateSigning(format!("unusable key: {}", e)))
}

/// Load a key written by this crate.
pub fn load_key(path: &Path) -> Result<KeyPair> {
    let pem = std::fs::read_to_string(path).map_err(|e| Error::ArtifactRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_key_pem(&pem).map_err(|e| match e {
        Error::CertificateSigning(reason) => {
            Error::CertificateSigning(format!("{}: {}", path.display(), reason))
        }
        other => other,
    })
}

/// Duplicate a key pair; `rcgen::Issuer` takes its signing key by value.
pub fn clone_key(key_pair: &KeyPair) -> Result<KeyPair> {
    parse_key_pem(&key_pair.serialize_pem())
}
