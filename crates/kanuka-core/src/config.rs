//! The two TOML documents: the user-global config (one per workstation) and
//! the per-project config inside the store.
//!
//! Loads are strict: anything toml cannot parse into the schema surfaces as
//! `InvalidProjectConfig`. Saves go through a temp file and a rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::write_atomic;

// Deliberately permissive; the mail server is the real validator.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

/// Identity of the user on this workstation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uuid: String,
    pub email: String,
}

/// Per-project entry in the user-global config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub device_name: String,
    pub project_name: String,
}

/// The user-global config, outside any project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub user: UserIdentity,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRef>,
}

/// Project identity inside the store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub uuid: String,
    pub name: String,
}

/// One registered workstation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The project config stored at `.kanuka/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectMeta,
    /// uuid -> email
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    /// uuid -> device
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

impl GlobalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::InvalidProjectConfig(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text =
            toml::to_string_pretty(self).map_err(|e| Error::InvalidProjectConfig(e.to_string()))?;
        write_atomic(path, text.as_bytes(), 0o600)
    }
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ProjectNotInitialized
            } else {
                Error::Io(e)
            }
        })?;
        toml::from_str(&text).map_err(|e| Error::InvalidProjectConfig(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text =
            toml::to_string_pretty(self).map_err(|e| Error::InvalidProjectConfig(e.to_string()))?;
        write_atomic(path, text.as_bytes(), 0o644)
    }

    /// Any one uuid registered under `email`.
    pub fn uuid_by_email(&self, email: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|(_, e)| e.as_str() == email)
            .map(|(uuid, _)| uuid.as_str())
    }

    /// Every device uuid registered under `email`, in uuid order.
    pub fn all_uuids_by_email(&self, email: &str) -> Vec<String> {
        self.users
            .iter()
            .filter(|(_, e)| e.as_str() == email)
            .map(|(uuid, _)| uuid.clone())
            .collect()
    }

    pub fn uuid_by_email_and_device(&self, email: &str, device: &str) -> Option<&str> {
        self.devices
            .iter()
            .find(|(_, d)| d.email == email && d.name == device)
            .map(|(uuid, _)| uuid.as_str())
    }

    /// Drop a device from both the `users` and `devices` tables.
    pub fn remove_device(&mut self, uuid: &str) {
        self.users.remove(uuid);
        self.devices.remove(uuid);
    }

    /// Device names are unique per email within a project.
    pub fn is_device_name_taken(&self, email: &str, name: &str) -> bool {
        self.devices
            .values()
            .any(|d| d.email == email && d.name == name)
    }
}

/// Locations of the user-global state: config file and private key dir.
#[derive(Debug, Clone)]
pub struct UserDirs {
    base: PathBuf,
}

impl UserDirs {
    /// Platform default: `<config dir>/kanuka`.
    pub fn discover() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "cannot resolve the user config directory",
                ))
            })?
            .join("kanuka");
        Ok(UserDirs { base })
    }

    /// Explicit base, used by tests and by anything that must not touch
    /// ambient process state.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        UserDirs { base: base.into() }
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn keys_dir(&self) -> PathBuf {
        self.base.join("keys")
    }

    /// This workstation's private key for `project_uuid`.
    pub fn private_key_path(&self, project_uuid: &str) -> PathBuf {
        self.keys_dir().join(project_uuid)
    }

    /// Local copy of the matching public key.
    pub fn public_key_path(&self, project_uuid: &str) -> PathBuf {
        self.keys_dir().join(format!("{project_uuid}.pub"))
    }

    pub fn load_global(&self) -> Result<Option<GlobalConfig>> {
        let path = self.config_path();
        if !path.is_file() {
            return Ok(None);
        }
        GlobalConfig::load(&path).map(Some)
    }

    pub fn save_global(&self, config: &GlobalConfig) -> Result<()> {
        config.save(&self.config_path())
    }
}

pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(Error::InvalidEmail(email.to_string()))
    }
}

/// Restrict a device name to `[a-z0-9_-]`, collapsing anything else.
pub fn sanitize_device_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
            out.push(c);
            gap = false;
        } else if !gap && !out.is_empty() {
            out.push('-');
            gap = true;
        }
    }
    let out = out.trim_matches('-').to_string();
    if out.is_empty() {
        "device".to_string()
    } else {
        out
    }
}

/// Default device name: the sanitized hostname.
pub fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| sanitize_device_name(&h))
        .unwrap_or_else(|| "workstation".to_string())
}
