// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Certificate templates and signing for the three roles of the hierarchy.
//!
//! Every certificate is verified against its issuer's public key before it
//! is handed back, so a broken signature never reaches the disk.

use crate::ca::CertificateAuthority;
use crate::config::SubjectConfig;
use crate::error::{Error, Result};
use rand::RngCore;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};

/// Maximum DNS name length per RFC 1035
const MAX_DNS_NAME_LENGTH: usize = 253;

/// Serial numbers are this many random bytes (128 bits).
pub const SERIAL_BYTES: usize = 16;

/// Position of a certificate in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Root,
    Intermediate,
    Leaf,
}

impl Role {
    /// The role a certificate's issuer must have, `None` for self-signed.
    pub fn required_issuer(self) -> Option<Role> {
        match self {
            Role::Root => None,
            Role::Intermediate => Some(Role::Root),
            Role::Leaf => Some(Role::Intermediate),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Root => write!(f, "root CA"),
            Role::Intermediate => write!(f, "intermediate CA"),
            Role::Leaf => write!(f, "leaf"),
        }
    }
}

/// A subject alternative name after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

/// Classify a SAN entry: anything that parses as an IP literal is an IP
/// SAN, everything else is a DNS name. An IPv6 zone id is ignored.
pub fn classify_san(entry: &str) -> SubjectAltName {
    let ip_candidate = entry.split('%').next().unwrap_or(entry);
    match ip_candidate.parse::<IpAddr>() {
        Ok(ip) => SubjectAltName::Ip(ip),
        Err(_) => SubjectAltName::Dns(entry.to_string()),
    }
}

/// Validate the requested domains and drop duplicates, keeping the first
/// spelling and the input order.
pub fn normalize_domains(domains: &[String]) -> Result<Vec<String>> {
    if domains.is_empty() {
        return Err(Error::NoDomains);
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(domains.len());

    for domain in domains {
        let domain = domain.trim();
        validate_domain(domain)?;
        if seen.insert(domain.to_ascii_lowercase()) {
            normalized.push(domain.to_string());
        }
    }

    Ok(normalized)
}

fn validate_domain(domain: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::InvalidDomain {
            domain: domain.to_string(),
            reason: reason.to_string(),
        })
    };

    if domain.is_empty() {
        return invalid("domain cannot be empty");
    }
    if domain.len() > MAX_DNS_NAME_LENGTH {
        return invalid(&format!(
            "exceeds maximum length of {} characters",
            MAX_DNS_NAME_LENGTH
        ));
    }

    if let SubjectAltName::Ip(_) = classify_san(domain) {
        return Ok(());
    }

    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return invalid("empty DNS label");
    }

    for (i, label) in domain.split('.').enumerate() {
        if label == "*" {
            if i != 0 {
                return invalid("wildcard is only allowed as the leftmost label");
            }
            continue;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return invalid("DNS label cannot start or end with a hyphen");
        }
        if let Some(c) = label
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return invalid(&format!("invalid character '{}'", c));
        }
    }

    Ok(())
}

/// NotBefore/NotAfter window of one certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Validity {
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl Validity {
    /// Starting now, lasting `days` days.
    fn for_days(days: u32) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            not_before: now,
            not_after: now + Duration::days(i64::from(days)),
        }
    }
}

/// A fresh random 128-bit serial number.
pub fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; SERIAL_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    // Positive and minimally encoded
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    SerialNumber::from(bytes.to_vec())
}

/// Everything needed to issue one certificate except the keys.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub role: Role,
    pub common_name: String,
    pub organizational_unit: String,
    pub subject: SubjectConfig,
    pub alt_names: Vec<SubjectAltName>,
    pub days: u32,
}

impl CertificateTemplate {
    pub fn root(root_ca_name: &str, subject: &SubjectConfig, days: u32) -> Self {
        let label = format!("{} ROOT CA", root_ca_name);
        Self {
            role: Role::Root,
            common_name: label.clone(),
            organizational_unit: label,
            subject: subject.clone(),
            alt_names: Vec::new(),
            days,
        }
    }

    pub fn intermediate(intermediate_name: &str, subject: &SubjectConfig, days: u32) -> Self {
        Self {
            role: Role::Intermediate,
            common_name: format!("{} Intermediate CA", intermediate_name),
            organizational_unit: intermediate_name.to_string(),
            subject: subject.clone(),
            alt_names: Vec::new(),
            days,
        }
    }

    /// Leaf template. The first domain becomes the common name and every
    /// domain becomes a SAN entry.
    pub fn leaf(
        app_name: &str,
        domains: &[String],
        subject: &SubjectConfig,
        days: u32,
    ) -> Result<Self> {
        let domains = normalize_domains(domains)?;
        let common_name = domains.first().cloned().ok_or(Error::NoDomains)?;

        Ok(Self {
            role: Role::Leaf,
            common_name,
            organizational_unit: app_name.to_string(),
            subject: subject.clone(),
            alt_names: domains.iter().map(|d| classify_san(d)).collect(),
            days,
        })
    }

    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, self.subject.country.as_str());
        dn.push(DnType::StateOrProvinceName, self.subject.state.as_str());
        dn.push(DnType::LocalityName, self.subject.locality.as_str());
        dn.push(DnType::OrganizationName, self.subject.organization.as_str());
        dn.push(
            DnType::OrganizationalUnitName,
            self.organizational_unit.as_str(),
        );
        dn.push(DnType::CommonName, self.common_name.as_str());
        dn
    }

    fn params(&self) -> Result<CertificateParams> {
        let mut params = CertificateParams::default();
        params.distinguished_name = self.distinguished_name();
        params.serial_number = Some(random_serial());

        let validity = Validity::for_days(self.days);
        params.not_before = validity.not_before;
        params.not_after = validity.not_after;

        match self.role {
            Role::Root => {
                params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
                params.key_usages = ca_key_usages();
            }
            Role::Intermediate => {
                // Signs leaves only, never another CA
                params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
                params.key_usages = ca_key_usages();
                params.use_authority_key_identifier_extension = true;
            }
            Role::Leaf => {
                params.is_ca = IsCa::ExplicitNoCa;
                params.key_usages = vec![
                    KeyUsagePurpose::DigitalSignature,
                    KeyUsagePurpose::KeyEncipherment,
                ];
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
                params.use_authority_key_identifier_extension = true;
                params.subject_alt_names = self
                    .alt_names
                    .iter()
                    .map(san_type)
                    .collect::<Result<Vec<_>>>()?;
            }
        }

        Ok(params)
    }
}

fn ca_key_usages() -> Vec<KeyUsagePurpose> {
    vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ]
}

fn san_type(name: &SubjectAltName) -> Result<SanType> {
    match name {
        SubjectAltName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
        SubjectAltName::Dns(dns) => {
            let ia5 = dns.clone().try_into().map_err(|_| Error::InvalidDomain {
                domain: dns.clone(),
                reason: "Invalid DNS name".into(),
            })?;
            Ok(SanType::DnsName(ia5))
        }
    }
}

/// Sign `template` for `subject_key` and return the certificate PEM.
///
/// A root is self-signed and takes no issuer; an intermediate must be
/// issued by a root and a leaf by an intermediate.
pub fn issue(
    template: &CertificateTemplate,
    subject_key: &KeyPair,
    issuer: Option<&CertificateAuthority>,
) -> Result<String> {
    let issuer_role = issuer.map(|ca| ca.role);
    if issuer_role != template.role.required_issuer() {
        return Err(Error::CertificateSigning(match issuer_role {
            Some(role) => format!("a {} cannot be issued by a {}", template.role, role),
            None => format!("a {} needs an issuing CA", template.role),
        }));
    }

    let params = template.params()?;
    let signing_error =
        |e: rcgen::Error| Error::CertificateSigning(format!("{}: {}", template.common_name, e));

    let cert_pem = match issuer {
        None => params.self_signed(subject_key).map_err(signing_error)?.pem(),
        Some(ca) => {
            let ca_issuer = ca.issuer()?;
            params
                .signed_by(subject_key, &ca_issuer)
                .map_err(signing_error)?
                .pem()
        }
    };

    let issuer_pem = issuer.map_or(cert_pem.as_str(), |ca| ca.cert_pem.as_str());
    crate::x509::verify_signed_by(&cert_pem, issuer_pem)?;

    Ok(cert_pem)
}
