// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use crate::key::{CA_KEY_BITS, LEAF_KEY_BITS};
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the optional policy file inside the base directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// RSA modulus sizes the signing backend accepts.
pub const SUPPORTED_KEY_BITS: &[usize] = &[2048, 3072, 4096];

/// Issuance policy. Every field has a default, so an absent or partial
/// `config.toml` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default = "default_root_ca_days")]
    pub root_ca_days: u32,
    #[serde(default = "default_intermediate_ca_days")]
    pub intermediate_ca_days: u32,
    #[serde(default = "default_leaf_days")]
    pub leaf_days: u32,
    #[serde(default = "default_ca_key_bits")]
    pub ca_key_bits: usize,
    #[serde(default = "default_leaf_key_bits")]
    pub leaf_key_bits: usize,
    #[serde(default)]
    pub subject: SubjectConfig,
}

/// Distinguished-name attributes shared by every certificate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubjectConfig {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default = "default_locality")]
    pub locality: String,
    #[serde(default = "default_organization")]
    pub organization: String,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        Self {
            country: default_country(),
            state: default_state(),
            locality: default_locality(),
            organization: default_organization(),
        }
    }
}

fn default_root_ca_days() -> u32 {
    7305
}

fn default_intermediate_ca_days() -> u32 {
    3650
}

fn default_leaf_days() -> u32 {
    365
}

fn default_ca_key_bits() -> usize {
    CA_KEY_BITS
}

fn default_leaf_key_bits() -> usize {
    LEAF_KEY_BITS
}

fn default_country() -> String {
    "TR".into()
}

fn default_state() -> String {
    "Istanbul".into()
}

fn default_locality() -> String {
    "Istanbul".into()
}

fn default_organization() -> String {
    "Crtforge".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_ca_days: default_root_ca_days(),
            intermediate_ca_days: default_intermediate_ca_days(),
            leaf_days: default_leaf_days(),
            ca_key_bits: default_ca_key_bits(),
            leaf_key_bits: default_leaf_key_bits(),
            subject: SubjectConfig::default(),
        }
    }
}

impl Config {
    /// Load the policy from `path`, falling back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ArtifactRead {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, days) in [
            ("root_ca_days", self.root_ca_days),
            ("intermediate_ca_days", self.intermediate_ca_days),
            ("leaf_days", self.leaf_days),
        ] {
            if days == 0 {
                return Err(Error::Config(format!("{} cannot be 0", field)));
            }
        }

        if self.intermediate_ca_days > self.root_ca_days {
            return Err(Error::Config(
                "intermediate_ca_days cannot exceed root_ca_days".into(),
            ));
        }
        if self.leaf_days > self.intermediate_ca_days {
            return Err(Error::Config(
                "leaf_days cannot exceed intermediate_ca_days".into(),
            ));
        }

        for (field, bits) in [
            ("ca_key_bits", self.ca_key_bits),
            ("leaf_key_bits", self.leaf_key_bits),
        ] {
            if !SUPPORTED_KEY_BITS.contains(&bits) {
                return Err(Error::Config(format!(
                    "{} must be one of {:?}, got {}",
                    field, SUPPORTED_KEY_BITS, bits
                )));
            }
        }

        if self.subject.country.chars().count() != 2 {
            return Err(Error::Config(
                "subject.country must be a two-letter country code".into(),
            ));
        }

        Ok(())
    }
}

/// Resolve the directory all CA trees live under.
///
/// Precedence: explicit `--output`, then `CRTFORGE_ROOT`, then the platform
/// config directory.
pub fn resolve_base_dir(output: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = output {
        return absolutize(dir);
    }

    if let Ok(custom_root) = std::env::var("CRTFORGE_ROOT") {
        if !custom_root.trim().is_empty() {
            let path = PathBuf::from(&custom_root);
            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "CRTFORGE_ROOT must be an absolute path, got: {}",
                    custom_root
                )));
            }
            return Ok(path);
        }
    }

    if let Some(proj_dirs) = ProjectDirs::from("", "", "crtforge") {
        Ok(proj_dirs.config_dir().to_path_buf())
    } else if let Some(base_dirs) = BaseDirs::new() {
        Ok(base_dirs.home_dir().join(".config").join("crtforge"))
    } else {
        Err(Error::Config(
            "Could not determine a home directory. Pass --output or set CRTFORGE_ROOT.".into(),
        ))
    }
}

fn absolutize(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| Error::Config(format!("Cannot resolve current directory: {}", e)))?;
    Ok(cwd.join(dir))
}
