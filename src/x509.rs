// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse and verify X.509 certificates without shelling out to openssl.

use crate::error::{Error, Result};
use rcgen::{KeyPair, PublicKeyData};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use x509_parser::prelude::*;

/// Key usage bits this crate sets or checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageBits {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub not_before_timestamp: i64,
    pub common_name: Option<String>,
    pub organizational_unit: Option<String>,
    pub issuer_common_name: Option<String>,
    /// Raw big-endian serial number.
    pub serial: Vec<u8>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub is_ca: bool,
    pub path_len: Option<u32>,
    pub key_usage: Option<KeyUsageBits>,
    pub server_auth: bool,
    pub has_authority_key_id: bool,
    pub self_issued: bool,
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
            Err(_) => "Invalid date".to_string(),
        }
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1, // Treat invalid timestamps as expired
        }
    }

    pub fn validity_days(&self) -> i64 {
        (self.not_after_timestamp - self.not_before_timestamp) / 86_400
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    let pem_data = read_cert_file(path)?;
    parse_cert_pem(&pem_data)
}

pub fn read_cert_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::ArtifactRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// DER bytes of the first PEM block, which must be a certificate.
pub fn cert_der_from_pem(pem_str: &str) -> Result<Vec<u8>> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    Ok(pem.into_contents())
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;
    Ok(cert)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let der = cert_der_from_pem(pem_str)?;
    let cert = parse_der(&der)?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let organizational_unit = cert
        .subject()
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok())
        .map(String::from);

    let issuer_common_name = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    let mut is_ca = false;
    let mut path_len = None;
    let mut key_usage = None;
    let mut server_auth = false;
    let mut has_authority_key_id = false;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 4 => {
                            ip_addresses.push(IpAddr::V4(Ipv4Addr::new(
                                ip_bytes[0],
                                ip_bytes[1],
                                ip_bytes[2],
                                ip_bytes[3],
                            )));
                        }
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 16 => {
                            if let Ok(bytes) = <[u8; 16]>::try_from(*ip_bytes) {
                                ip_addresses.push(IpAddr::V6(Ipv6Addr::from(bytes)));
                            }
                        }
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
                path_len = bc.path_len_constraint;
            }
            ParsedExtension::KeyUsage(ku) => {
                key_usage = Some(KeyUsageBits {
                    digital_signature: ku.digital_signature(),
                    key_encipherment: ku.key_encipherment(),
                    key_cert_sign: ku.key_cert_sign(),
                    crl_sign: ku.crl_sign(),
                });
            }
            ParsedExtension::ExtendedKeyUsage(eku) => {
                server_auth = eku.server_auth;
            }
            ParsedExtension::AuthorityKeyIdentifier(_) => {
                has_authority_key_id = true;
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        common_name,
        organizational_unit,
        issuer_common_name,
        serial: cert.raw_serial().to_vec(),
        dns_names,
        ip_addresses,
        is_ca,
        path_len,
        key_usage,
        server_auth,
        has_authority_key_id,
        self_issued: cert.subject().as_raw() == cert.issuer().as_raw(),
    })
}

/// Check that `cert_pem` carries a valid signature made by the key in
/// `issuer_pem`. A self-signed certificate is checked against itself.
pub fn verify_signed_by(cert_pem: &str, issuer_pem: &str) -> Result<()> {
    let cert_der = cert_der_from_pem(cert_pem)?;
    let issuer_der = cert_der_from_pem(issuer_pem)?;
    let cert = parse_der(&cert_der)?;
    let issuer = parse_der(&issuer_der)?;

    if cert.issuer().as_raw() != issuer.subject().as_raw() {
        return Err(Error::CertificateSigning(format!(
            "issuer name '{}' does not match '{}'",
            cert.issuer(),
            issuer.subject()
        )));
    }

    cert.verify_signature(Some(issuer.public_key()))
        .map_err(|e| {
            Error::CertificateSigning(format!(
                "signature of '{}' does not verify against '{}': {}",
                cert.subject(),
                issuer.subject(),
                e
            ))
        })
}

/// Whether the certificate's subject public key belongs to `key_pair`.
pub fn public_key_matches(cert_pem: &str, key_pair: &KeyPair) -> Result<bool> {
    let der = cert_der_from_pem(cert_pem)?;
    let cert = parse_der(&der)?;
    let spki = cert.public_key();
    Ok(&*spki.subject_public_key.data == key_pair.der_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubjectConfig;
    use crate::issuer::{issue, CertificateTemplate};
    use crate::key::generate_key;

    fn self_signed(name: &str) -> (KeyPair, String) {
        let key = generate_key(2048).expect("key should be generated");
        let template = CertificateTemplate::root(name, &SubjectConfig::default(), 30);
        let pem = issue(&template, &key, None).expect("root should be issued");
        (key, pem)
    }

    #[test]
    fn test_parse_root_cert() {
        let (_, pem) = self_signed("Crtforge");
        let info = parse_cert_pem(&pem).expect("cert should parse");

        assert!(info.is_ca);
        assert!(info.self_issued);
        assert_eq!(info.path_len, None);
        assert_eq!(info.common_name.as_deref(), Some("Crtforge ROOT CA"));
        assert_eq!(info.organizational_unit.as_deref(), Some("Crtforge ROOT CA"));
        assert_eq!(info.validity_days(), 30);
        assert!(info.days_remaining() >= 29);
        assert!(!info.serial.is_empty());
    }

    #[test]
    fn test_expiry_string() {
        let (_, pem) = self_signed("Crtforge");
        let info = parse_cert_pem(&pem).expect("cert should parse");

        let expiry = info.expiry_string();
        // Should be in YYYY-MM-DD format
        assert!(expiry.len() == 10);
        assert!(expiry.chars().nth(4) == Some('-'));
        assert!(expiry.chars().nth(7) == Some('-'));
    }

    #[test]
    fn test_verify_self_signed() {
        let (_, pem) = self_signed("Crtforge");
        verify_signed_by(&pem, &pem).expect("self-signature should verify");
    }

    #[test]
    fn test_verify_rejects_foreign_issuer() {
        let (_, a) = self_signed("Alpha");
        let (_, b) = self_signed("Beta");
        assert!(matches!(
            verify_signed_by(&a, &b),
            Err(Error::CertificateSigning(_))
        ));
    }

    #[test]
    fn test_verify_rejects_same_name_different_key() {
        let (_, a) = self_signed("Crtforge");
        let (_, b) = self_signed("Crtforge");
        assert!(matches!(
            verify_signed_by(&a, &b),
            Err(Error::CertificateSigning(_))
        ));
    }

    #[test]
    fn test_public_key_matches() {
        let (key, pem) = self_signed("Crtforge");
        let other = generate_key(2048).expect("key should be generated");

        assert!(public_key_matches(&pem, &key).expect("cert should parse"));
        assert!(!public_key_matches(&pem, &other).expect("cert should parse"));
    }

    #[test]
    fn test_parse_rejects_key_pem() {
        let key = generate_key(2048).expect("key should be generated");
        assert!(matches!(
            parse_cert_pem(&key.serialize_pem()),
            Err(Error::CertParse(_))
        ));
    }
}
