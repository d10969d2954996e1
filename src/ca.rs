// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::SubjectConfig;
use crate::error::{Error, Result};
use crate::issuer::{issue, CertificateTemplate, Role};
use crate::key::{clone_key, load_key};
use crate::store::CaPaths;
use crate::x509::{parse_cert_pem, public_key_matches, read_cert_file, verify_signed_by};
use rcgen::{Issuer, KeyPair};
use std::path::PathBuf;

/// A root or intermediate CA that can sign certificates.
pub struct CertificateAuthority {
    pub name: String,
    pub role: Role,
    pub key_pair: KeyPair,
    pub cert_pem: String,
    /// Where the certificate lives on disk, if it was loaded from there.
    pub cert_path: Option<PathBuf>,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("cert_path", &self.cert_path)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Self-sign a new root CA in memory.
    pub fn create_root(
        name: &str,
        subject: &SubjectConfig,
        days: u32,
        key_pair: KeyPair,
    ) -> Result<Self> {
        let template = CertificateTemplate::root(name, subject, days);
        let cert_pem = issue(&template, &key_pair, None)?;
        Ok(Self {
            name: name.to_string(),
            role: Role::Root,
            key_pair,
            cert_pem,
            cert_path: None,
        })
    }

    /// Issue a new intermediate CA under `root` in memory.
    pub fn create_intermediate(
        name: &str,
        subject: &SubjectConfig,
        days: u32,
        key_pair: KeyPair,
        root: &CertificateAuthority,
    ) -> Result<Self> {
        let template = CertificateTemplate::intermediate(name, subject, days);
        let cert_pem = issue(&template, &key_pair, Some(root))?;
        Ok(Self {
            name: name.to_string(),
            role: Role::Intermediate,
            key_pair,
            cert_pem,
            cert_path: None,
        })
    }

    /// Load a CA from its key and certificate files.
    ///
    /// The key must belong to the certificate and the certificate must be a
    /// CA of the expected role; anything else would produce a broken chain.
    pub fn load(name: &str, role: Role, paths: &CaPaths) -> Result<Self> {
        if role == Role::Leaf {
            return Err(Error::CertificateSigning(
                "a leaf certificate cannot act as a CA".into(),
            ));
        }

        let cert_pem = read_cert_file(&paths.cert)?;
        let key_pair = load_key(&paths.key)?;

        if !public_key_matches(&cert_pem, &key_pair)? {
            return Err(Error::CertificateSigning(format!(
                "{} does not belong to {}",
                paths.key.display(),
                paths.cert.display()
            )));
        }

        let info = parse_cert_pem(&cert_pem)?;
        if !info.is_ca {
            return Err(Error::CertificateSigning(format!(
                "{} is not a CA certificate",
                paths.cert.display()
            )));
        }
        if role == Role::Root {
            if !info.self_issued {
                return Err(Error::CertificateSigning(format!(
                    "{} is not self-signed",
                    paths.cert.display()
                )));
            }
            verify_signed_by(&cert_pem, &cert_pem)?;
        }

        Ok(Self {
            name: name.to_string(),
            role,
            key_pair,
            cert_pem,
            cert_path: Some(paths.cert.clone()),
        })
    }

    /// Create an Issuer for signing certificates
    ///
    /// Note: This recreates the KeyPair because Issuer takes ownership
    pub fn issuer(&self) -> Result<Issuer<'_, KeyPair>> {
        let key_pair = clone_key(&self.key_pair)?;
        Issuer::from_ca_cert_pem(&self.cert_pem, key_pair)
            .map_err(|e| Error::CertificateSigning(format!("{}: {}", self.name, e)))
    }

    /// Check that this CA was signed by `parent`.
    pub fn verify_issued_by(&self, parent: &CertificateAuthority) -> Result<()> {
        verify_signed_by(&self.cert_pem, &parent.cert_pem).map_err(|e| match e {
            Error::CertificateSigning(reason) => Error::CertificateSigning(format!(
                "{} '{}' was not issued by {} '{}': {}",
                self.role, self.name, parent.role, parent.name, reason
            )),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{generate_key, key_pem};

    fn root(name: &str) -> CertificateAuthority {
        let key = generate_key(2048).expect("key should be generated");
        CertificateAuthority::create_root(name, &SubjectConfig::default(), 30, key)
            .expect("root should be created")
    }

    fn write_ca(dir: &std::path::Path, ca: &CertificateAuthority) -> CaPaths {
        let paths = CaPaths {
            dir: dir.to_path_buf(),
            key: dir.join("ca.key"),
            cert: dir.join("ca.crt"),
        };
        std::fs::write(&paths.key, key_pem(&ca.key_pair)).expect("key should be written");
        std::fs::write(&paths.cert, &ca.cert_pem).expect("cert should be written");
        paths
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let ca = root("Crtforge");
        let paths = write_ca(dir.path(), &ca);

        let loaded = CertificateAuthority::load("Crtforge", Role::Root, &paths)
            .expect("root should load");
        assert_eq!(loaded.cert_pem, ca.cert_pem);
        assert_eq!(loaded.cert_path.as_deref(), Some(paths.cert.as_path()));
    }

    #[test]
    fn test_load_rejects_mismatched_key() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let ca = root("Crtforge");
        let paths = write_ca(dir.path(), &ca);

        let stranger = generate_key(2048).expect("key should be generated");
        std::fs::write(&paths.key, key_pem(&stranger)).expect("key should be written");

        assert!(matches!(
            CertificateAuthority::load("Crtforge", Role::Root, &paths),
            Err(Error::CertificateSigning(_))
        ));
    }

    #[test]
    fn test_verify_issued_by() {
        let root_a = root("Alpha");
        let root_b = root("Beta");
        let key = generate_key(2048).expect("key should be generated");
        let inter = CertificateAuthority::create_intermediate(
            "Inter",
            &SubjectConfig::default(),
            30,
            key,
            &root_a,
        )
        .expect("intermediate should be created");

        inter.verify_issued_by(&root_a).expect("issued by Alpha");
        assert!(matches!(
            inter.verify_issued_by(&root_b),
            Err(Error::CertificateSigning(_))
        ));
    }

    #[test]
    fn test_intermediate_is_not_loaded_as_root() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let root_ca = root("Crtforge");
        let key = generate_key(2048).expect("key should be generated");
        let inter = CertificateAuthority::create_intermediate(
            "Inter",
            &SubjectConfig::default(),
            30,
            key,
            &root_ca,
        )
        .expect("intermediate should be created");
        let paths = write_ca(dir.path(), &inter);

        assert!(CertificateAuthority::load("Inter", Role::Root, &paths).is_err());
        CertificateAuthority::load("Inter", Role::Intermediate, &paths)
            .expect("intermediate should load");
    }
}
