// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! PKCS#12 export of a leaf key with its certificate chain.
//!
//! The container uses the `p12-keystore` writer defaults: PBES2 with
//! AES-256-CBC for the bags and an HMAC-SHA256 integrity MAC.

use crate::error::{Error, Result};
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use rand::RngCore;

/// Decoded contents of a PKCS#12 file.
#[derive(Debug, Clone)]
pub struct PfxContents {
    /// PKCS#8 DER of the private key.
    pub key_der: Vec<u8>,
    /// Every certificate in the container, leaf first.
    pub certs: Vec<Vec<u8>>,
}

fn pem_contents(pem_str: &str, what: &str) -> Result<Vec<u8>> {
    ::pem::parse(pem_str)
        .map(|p| p.into_contents())
        .map_err(|e| Error::Encoding(format!("Failed to parse {} PEM: {}", what, e)))
}

fn certificate(pem_str: &str, what: &str) -> Result<Certificate> {
    let der = pem_contents(pem_str, what)?;
    Certificate::from_der(&der)
        .map_err(|e| Error::Encoding(format!("Failed to parse {} DER: {}", what, e)))
}

/// Bundle the leaf key, leaf certificate and CA chain (intermediate first)
/// into a password-protected PKCS#12 container.
pub fn export_pfx(
    alias: &str,
    leaf_key_pem: &str,
    leaf_cert_pem: &str,
    chain_pems: &[&str],
    password: &str,
) -> Result<Vec<u8>> {
    if password.is_empty() {
        return Err(Error::Encoding("PKCS#12 password cannot be empty".into()));
    }

    let key_der = pem_contents(leaf_key_pem, "private key")?;

    let mut chain = vec![certificate(leaf_cert_pem, "certificate")?];
    for pem_str in chain_pems {
        chain.push(certificate(pem_str, "CA certificate")?);
    }

    // Ties the key bag to the leaf certificate bag
    let mut local_key_id = [0u8; 20];
    rand::rng().fill_bytes(&mut local_key_id);

    let mut keystore = KeyStore::new();
    let key_chain = PrivateKeyChain::new(&key_der, local_key_id, chain);
    keystore.add_entry(alias, KeyStoreEntry::PrivateKeyChain(key_chain));

    keystore
        .writer(password)
        .write()
        .map_err(|e| Error::Encoding(format!("Failed to create PKCS12: {}", e)))
}

/// Decode a PKCS#12 container written by [`export_pfx`].
pub fn read_pfx(data: &[u8], password: &str) -> Result<PfxContents> {
    let keystore = KeyStore::from_pkcs12(data, password)
        .map_err(|e| Error::Encoding(format!("Failed to read PKCS12: {}", e)))?;

    let mut key_der = None;
    let mut certs = Vec::new();
    let mut loose_certs = Vec::new();

    for (_, entry) in keystore.entries() {
        match entry {
            KeyStoreEntry::PrivateKeyChain(chain) => {
                key_der = Some(chain.key().to_vec());
                certs.extend(chain.chain().iter().map(|c| c.as_der().to_vec()));
            }
            KeyStoreEntry::Certificate(cert) => loose_certs.push(cert.as_der().to_vec()),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
    certs.extend(loose_certs);

    let key_der = key_der.ok_or_else(|| Error::Encoding("PKCS12 holds no private key".into()))?;
    Ok(PfxContents { key_der, certs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::CertificateAuthority;
    use crate::config::SubjectConfig;
    use crate::issuer::{issue, CertificateTemplate};
    use crate::key::{generate_key, key_pem};

    #[test]
    fn test_export_and_read_back() {
        let subject = SubjectConfig::default();
        let root = CertificateAuthority::create_root(
            "Crtforge",
            &subject,
            30,
            generate_key(2048).expect("key should be generated"),
        )
        .expect("root should be created");
        let inter = CertificateAuthority::create_intermediate(
            "Inter",
            &subject,
            30,
            generate_key(2048).expect("key should be generated"),
            &root,
        )
        .expect("intermediate should be created");

        let leaf_key = generate_key(2048).expect("key should be generated");
        let template =
            CertificateTemplate::leaf("web", &["localhost".to_string()], &subject, 30)
                .expect("template should build");
        let leaf_pem = issue(&template, &leaf_key, Some(&inter)).expect("leaf should be issued");

        let pfx = export_pfx(
            "web",
            &key_pem(&leaf_key),
            &leaf_pem,
            &[inter.cert_pem.as_str(), root.cert_pem.as_str()],
            "s3cret",
        )
        .expect("pfx should be exported");

        let contents = read_pfx(&pfx, "s3cret").expect("pfx should decode");
        let decoded = rcgen::KeyPair::try_from(contents.key_der.as_slice())
            .expect("key should decode");
        assert_eq!(decoded.serialize_der(), leaf_key.serialize_der());
        for pem_str in [&leaf_pem, &inter.cert_pem, &root.cert_pem] {
            let der = crate::x509::cert_der_from_pem(pem_str).expect("cert should decode");
            assert!(contents.certs.contains(&der));
        }
        assert!(read_pfx(&pfx, "wrong").is_err());
    }

    #[test]
    fn test_export_rejects_bad_input() {
        assert!(matches!(
            export_pfx("web", "not a pem", "not a pem", &[], "pw"),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            export_pfx("web", "", "", &[], ""),
            Err(Error::Encoding(_))
        ));
    }
}
