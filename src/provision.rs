// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! The provisioning pipeline: root CA, optional trust installation,
//! intermediate CA, leaf certificate, fullchain and optional PKCS#12.
//!
//! Steps up to the fullchain are fatal on error. Trust installation and
//! PKCS#12 export are isolated: their errors land in
//! [`ProvisionReport::warnings`] and never undo earlier artifacts.

use crate::ca::CertificateAuthority;
use crate::chain::build_fullchain;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::issuer::{issue, CertificateTemplate, Role};
use crate::key::{generate_key, key_pem, load_key};
use crate::lock::StoreLock;
use crate::pkcs12::{export_pfx, read_pfx};
use crate::store::{AppPaths, ArtifactStore, CaPaths, Outcome, Sensitivity};
use crate::trust::{install_root, HostPlatform, TrustOutcome};
use crate::x509::{cert_der_from_pem, read_cert_file, verify_signed_by};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_ROOT_CA_NAME: &str = "Crtforge";
pub const DEFAULT_INTERMEDIATE_CA_NAME: &str = "CrtforgeIntermediate";

/// What to provision. Built once by the caller and passed down unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub root_ca_name: String,
    pub intermediate_ca_name: String,
    pub app_name: String,
    /// The first entry becomes the leaf common name.
    pub domains: Vec<String>,
    /// Install the root into this host's trust store.
    pub trust: Option<HostPlatform>,
    /// Export a PKCS#12 bundle protected by this password.
    pub pfx_password: Option<String>,
}

impl ProvisionRequest {
    pub fn new(app_name: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            root_ca_name: DEFAULT_ROOT_CA_NAME.to_string(),
            intermediate_ca_name: DEFAULT_INTERMEDIATE_CA_NAME.to_string(),
            app_name: app_name.into(),
            domains,
            trust: None,
            pfx_password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    RootKey,
    RootCert,
    IntermediateKey,
    IntermediateCert,
    LeafKey,
    LeafCert,
    Fullchain,
    Pfx,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::RootKey => "root CA key",
            ArtifactKind::RootCert => "root CA certificate",
            ArtifactKind::IntermediateKey => "intermediate CA key",
            ArtifactKind::IntermediateCert => "intermediate CA certificate",
            ArtifactKind::LeafKey => "key",
            ArtifactKind::LeafCert => "certificate",
            ArtifactKind::Fullchain => "fullchain",
            ArtifactKind::Pfx => "PKCS#12 bundle",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub outcome: Outcome,
}

/// What a run produced.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub artifacts: Vec<Artifact>,
    pub trust: Option<TrustOutcome>,
    /// Non-fatal errors from the optional steps.
    pub warnings: Vec<Error>,
}

impl ProvisionReport {
    fn record(&mut self, kind: ArtifactKind, path: &Path, outcome: Outcome) {
        self.artifacts.push(Artifact {
            kind,
            path: path.to_path_buf(),
            outcome,
        });
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }

    pub fn created(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.outcome == Outcome::Created)
    }
}

fn ensure_key(
    store: &ArtifactStore,
    report: &mut ProvisionReport,
    kind: ArtifactKind,
    path: &Path,
    bits: usize,
) -> Result<()> {
    let outcome = store.ensure(path, Sensitivity::Secret, || {
        Ok(key_pem(&generate_key(bits)?).into_bytes())
    })?;
    report.record(kind, path, outcome);
    Ok(())
}

fn ensure_ca(
    store: &ArtifactStore,
    report: &mut ProvisionReport,
    config: &Config,
    name: &str,
    paths: &CaPaths,
    parent: Option<&CertificateAuthority>,
) -> Result<CertificateAuthority> {
    let (role, kinds, template) = match parent {
        None => (
            Role::Root,
            (ArtifactKind::RootKey, ArtifactKind::RootCert),
            CertificateTemplate::root(name, &config.subject, config.root_ca_days),
        ),
        Some(_) => (
            Role::Intermediate,
            (ArtifactKind::IntermediateKey, ArtifactKind::IntermediateCert),
            CertificateTemplate::intermediate(name, &config.subject, config.intermediate_ca_days),
        ),
    };

    ensure_key(store, report, kinds.0, &paths.key, config.ca_key_bits)?;

    let outcome = store.ensure(&paths.cert, Sensitivity::Public, || {
        let key_pair = load_key(&paths.key)?;
        Ok(issue(&template, &key_pair, parent)?.into_bytes())
    })?;
    report.record(kinds.1, &paths.cert, outcome);

    let ca = CertificateAuthority::load(name, role, paths)?;
    if let Some(parent) = parent {
        ca.verify_issued_by(parent)?;
    }

    info!(ca = name, path = %paths.cert.display(), "{} ready ({})", role, outcome);
    Ok(ca)
}

fn ensure_leaf(
    store: &ArtifactStore,
    report: &mut ProvisionReport,
    config: &Config,
    template: &CertificateTemplate,
    paths: &AppPaths,
    intermediate: &CertificateAuthority,
) -> Result<String> {
    ensure_key(
        store,
        report,
        ArtifactKind::LeafKey,
        &paths.key,
        config.leaf_key_bits,
    )?;

    let outcome = store.ensure(&paths.cert, Sensitivity::Public, || {
        let key_pair = load_key(&paths.key)?;
        Ok(issue(template, &key_pair, Some(intermediate))?.into_bytes())
    })?;
    report.record(ArtifactKind::LeafCert, &paths.cert, outcome);

    let cert_pem = read_cert_file(&paths.cert)?;
    verify_signed_by(&cert_pem, &intermediate.cert_pem).map_err(|e| match e {
        Error::CertificateSigning(reason) => Error::CertificateSigning(format!(
            "{} was not issued by intermediate CA '{}' ({}); remove {} to reissue it",
            paths.cert.display(),
            intermediate.name,
            reason,
            paths.dir.display()
        )),
        other => other,
    })?;

    info!(path = %paths.cert.display(), "certificate ready ({})", outcome);
    Ok(cert_pem)
}

/// A reused fullchain must still be exactly the current leaf, intermediate
/// and root, in that order.
fn check_fullchain(path: &Path, expected: &[u8]) -> Result<()> {
    let current = std::fs::read(path).map_err(|e| Error::ArtifactRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    if current != expected {
        return Err(Error::StaleArtifact {
            path: path.to_path_buf(),
            reason: "it does not match the current leaf, intermediate and root certificates"
                .into(),
        });
    }
    Ok(())
}

/// A reused PKCS#12 bundle must open with this run's password and carry the
/// current leaf certificate.
fn check_pfx(path: &Path, password: &str, leaf_pem: &str) -> Result<()> {
    let stale = |reason: String| {
        Error::Encoding(format!(
            "{}: {}; remove it to re-export",
            path.display(),
            reason
        ))
    };

    let data = std::fs::read(path).map_err(|e| Error::ArtifactRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let contents = read_pfx(&data, password).map_err(|e| match e {
        Error::Encoding(reason) => stale(reason),
        other => other,
    })?;

    if !contents.certs.contains(&cert_der_from_pem(leaf_pem)?) {
        return Err(stale("it does not contain the current certificate".into()));
    }
    Ok(())
}

/// Run the whole pipeline for `request` under `store`.
pub fn provision(
    store: &ArtifactStore,
    config: &Config,
    request: &ProvisionRequest,
) -> Result<ProvisionReport> {
    config.validate()?;

    // Every name and domain is checked before anything touches the disk
    let root_paths = store.root_ca(&request.root_ca_name)?;
    let inter_paths =
        store.intermediate_ca(&request.root_ca_name, &request.intermediate_ca_name)?;
    let app_paths = store.app(
        &request.root_ca_name,
        &request.intermediate_ca_name,
        &request.app_name,
    )?;
    let leaf_template = CertificateTemplate::leaf(
        &request.app_name,
        &request.domains,
        &config.subject,
        config.leaf_days,
    )?;

    let lock = StoreLock::try_acquire(&store.lock_path(&request.root_ca_name)?)?;
    let mut report = ProvisionReport::default();

    let root = ensure_ca(
        store,
        &mut report,
        config,
        &request.root_ca_name,
        &root_paths,
        None,
    )?;

    if let Some(platform) = &request.trust {
        match install_root(platform, &root_paths.cert, &request.root_ca_name) {
            Ok(outcome) => {
                match &outcome {
                    TrustOutcome::Installed(target) => {
                        info!(target = %target.display(), "root CA installed as trust anchor")
                    }
                    TrustOutcome::AlreadyTrusted => info!("root CA already trusted"),
                }
                report.trust = Some(outcome);
            }
            Err(e) => {
                warn!("trust installation skipped: {}", e);
                report.warnings.push(e);
            }
        }
    }

    let intermediate = ensure_ca(
        store,
        &mut report,
        config,
        &request.intermediate_ca_name,
        &inter_paths,
        Some(&root),
    )?;

    let leaf_pem = ensure_leaf(
        store,
        &mut report,
        config,
        &leaf_template,
        &app_paths,
        &intermediate,
    )?;

    let fullchain = || build_fullchain(&app_paths.cert, &inter_paths.cert, &root_paths.cert);
    let outcome = store.ensure(&app_paths.fullchain, Sensitivity::Public, fullchain)?;
    if outcome == Outcome::Reused {
        check_fullchain(&app_paths.fullchain, &fullchain()?)?;
    }
    report.record(ArtifactKind::Fullchain, &app_paths.fullchain, outcome);
    info!(path = %app_paths.fullchain.display(), "fullchain ready ({})", outcome);

    if let Some(password) = &request.pfx_password {
        let exported = store
            .ensure(&app_paths.pfx, Sensitivity::Secret, || {
                let leaf_key_pem = std::fs::read_to_string(&app_paths.key).map_err(|e| {
                    Error::ArtifactRead {
                        path: app_paths.key.clone(),
                        source: e,
                    }
                })?;
                export_pfx(
                    &request.app_name,
                    &leaf_key_pem,
                    &leaf_pem,
                    &[intermediate.cert_pem.as_str(), root.cert_pem.as_str()],
                    password,
                )
            })
            .and_then(|outcome| {
                if outcome == Outcome::Reused {
                    check_pfx(&app_paths.pfx, password, &leaf_pem)?;
                }
                Ok(outcome)
            });
        match exported {
            Ok(outcome) => {
                report.record(ArtifactKind::Pfx, &app_paths.pfx, outcome);
                info!(path = %app_paths.pfx.display(), "PKCS#12 bundle ready ({})", outcome);
            }
            Err(e) => {
                warn!("PKCS#12 export failed: {}", e);
                report.warnings.push(e);
            }
        }
    }

    drop(lock);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> Config {
        Config {
            ca_key_bits: 2048,
            ..Config::default()
        }
    }

    fn request(app: &str) -> ProvisionRequest {
        ProvisionRequest::new(app, vec!["app.example.com".into(), "127.0.0.1".into()])
    }

    #[test]
    fn test_request_defaults() {
        let req = request("web");
        assert_eq!(req.root_ca_name, "Crtforge");
        assert_eq!(req.intermediate_ca_name, "CrtforgeIntermediate");
        assert!(req.trust.is_none());
        assert!(req.pfx_password.is_none());
    }

    #[test]
    fn test_invalid_input_touches_nothing() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = ArtifactStore::new(dir.path());

        let mut req = request("web");
        req.domains = vec!["bad domain".into()];
        assert!(matches!(
            provision(&store, &fast_config(), &req),
            Err(Error::InvalidDomain { .. })
        ));

        let mut req = request("rootCA");
        req.domains = vec!["localhost".into()];
        assert!(matches!(
            provision(&store, &fast_config(), &req),
            Err(Error::InvalidName { .. })
        ));

        let entries = std::fs::read_dir(dir.path()).expect("dir readable").count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_held_lock_fails_fast() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = ArtifactStore::new(dir.path());
        let _held = StoreLock::try_acquire(&store.lock_path("Crtforge").expect("lock path"))
            .expect("lock should be acquired");

        assert!(matches!(
            provision(&store, &fast_config(), &request("web")),
            Err(Error::Locked(_))
        ));
        assert!(!dir.path().join("Crtforge").join("rootCA").exists());
    }

    #[test]
    fn test_report_lists_every_artifact() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = ArtifactStore::new(dir.path());
        let mut req = request("web");
        req.pfx_password = Some("pw".into());

        let report = provision(&store, &fast_config(), &req).expect("provision should succeed");

        assert_eq!(report.artifacts.len(), 8);
        assert_eq!(report.created().count(), 8);
        assert!(report.warnings.is_empty());
        assert_eq!(
            report
                .artifact(ArtifactKind::Pfx)
                .expect("pfx recorded")
                .path,
            dir.path().join("Crtforge").join("web").join("web.pfx")
        );
    }

    #[test]
    fn test_edited_fullchain_is_stale() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = ArtifactStore::new(dir.path());
        provision(&store, &fast_config(), &request("web")).expect("provision should succeed");

        let fullchain = dir.path().join("Crtforge/web/fullchain.crt");
        std::fs::write(&fullchain, "EDITED\n").expect("write should succeed");

        match provision(&store, &fast_config(), &request("web")) {
            Err(Error::StaleArtifact { path, .. }) => assert_eq!(path, fullchain),
            other => panic!("expected StaleArtifact, got {:?}", other.map(|_| ())),
        }
        assert_eq!(
            std::fs::read_to_string(&fullchain).expect("fullchain readable"),
            "EDITED\n"
        );
    }

    #[test]
    fn test_empty_pfx_password_is_a_warning() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = ArtifactStore::new(dir.path());
        let mut req = request("web");
        req.pfx_password = Some(String::new());

        let report = provision(&store, &fast_config(), &req).expect("provision should succeed");

        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(report.warnings[0], Error::Encoding(_)));
        assert!(report.artifact(ArtifactKind::Pfx).is_none());
        assert!(!dir.path().join("Crtforge/web/web.pfx").exists());
        assert!(dir.path().join("Crtforge/web/fullchain.crt").exists());
    }
}
