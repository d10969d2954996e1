// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Local three-tier certificate authority for development HTTPS.
//!
//! ```rust,no_run
//! use crtforge::{provision, ArtifactStore, Config, ProvisionRequest};
//!
//! let store = ArtifactStore::new("/tmp/crtforge");
//! let config = Config::default();
//!
//! let request = ProvisionRequest::new("web", vec!["app.test".into(), "127.0.0.1".into()]);
//! let report = provision(&store, &config, &request)?;
//! for artifact in &report.artifacts {
//!     println!("{}: {}", artifact.kind, artifact.path.display());
//! }
//! # Ok::<(), crtforge::Error>(())
//! ```

/// Root and intermediate certificate authorities.
pub mod ca;
/// Fullchain assembly.
pub mod chain;
/// Configuration handling.
pub mod config;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
/// Certificate templates and signing.
pub mod issuer;
/// RSA key material.
pub mod key;
/// Exclusive lock on a CA tree.
pub mod lock;
/// PKCS#12 export.
pub mod pkcs12;
/// The provisioning pipeline.
pub mod provision;
/// Artifact layout and create-or-reuse policy.
pub mod store;
/// System trust store management.
pub mod trust;
/// X.509 certificate parsing.
pub mod x509;

pub use ca::CertificateAuthority;
pub use chain::build_fullchain;
pub use config::{resolve_base_dir, Config, SubjectConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use issuer::{classify_san, issue, normalize_domains, CertificateTemplate, Role, SubjectAltName};
pub use key::{generate_key, load_key};
pub use lock::StoreLock;
pub use pkcs12::{export_pfx, read_pfx, PfxContents};
pub use provision::{
    provision, Artifact, ArtifactKind, ProvisionReport, ProvisionRequest,
    DEFAULT_INTERMEDIATE_CA_NAME, DEFAULT_ROOT_CA_NAME,
};
pub use store::{AppPaths, ArtifactStore, CaPaths, Outcome, Sensitivity};
pub use trust::{install_root, HostPlatform, TrustOutcome, TrustStore};
pub use x509::{parse_cert_file, parse_cert_pem, verify_signed_by, CertInfo};
