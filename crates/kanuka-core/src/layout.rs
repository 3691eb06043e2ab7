//! On-disk shape of a project store.
//!
//! ```text
//! <project root>/.kanuka/
//!   config.toml
//!   audit.jsonl
//!   public_keys/<uuid>.pub    # PKIX PEM, 0644
//!   secrets/<uuid>.kanuka     # RSA-wrapped project key, 0600
//! ```
//!
//! The `.kanuka` suffix means two things depending on where the file lives:
//! inside the store it wraps the project symmetric key, outside it wraps a
//! plaintext file body.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Name of the marker directory at the project root.
pub const STORE_DIR_NAME: &str = ".kanuka";
/// Extension of wrapped files, both key wrappings and sealed secrets.
pub const WRAPPED_EXT: &str = "kanuka";
/// Extension of public keys inside the store.
pub const PUBLIC_KEY_EXT: &str = "pub";

pub const CONFIG_FILE: &str = "config.toml";
pub const AUDIT_FILE: &str = "audit.jsonl";
pub const PUBLIC_KEYS_DIR: &str = "public_keys";
pub const SECRETS_DIR: &str = "secrets";

/// Resolved paths of one project store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    /// Use `root` as the project root without checking initialization.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        StoreLayout { root: root.into() }
    }

    /// Walk up from `start` to the nearest ancestor holding an initialized
    /// store (a `.kanuka/config.toml`).
    pub fn discover(start: &Path) -> Result<Self> {
        let mut dir = Some(start);
        while let Some(candidate) = dir {
            if candidate.join(STORE_DIR_NAME).join(CONFIG_FILE).is_file() {
                return Ok(StoreLayout::at(candidate));
            }
            dir = candidate.parent();
        }
        Err(Error::ProjectNotInitialized)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.store_dir().join(CONFIG_FILE)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.store_dir().join(AUDIT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store_dir().join(".lock")
    }

    pub fn public_keys_dir(&self) -> PathBuf {
        self.store_dir().join(PUBLIC_KEYS_DIR)
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.store_dir().join(SECRETS_DIR)
    }

    pub fn public_key_path(&self, uuid: &str) -> PathBuf {
        self.public_keys_dir().join(format!("{uuid}.{PUBLIC_KEY_EXT}"))
    }

    pub fn wrapped_key_path(&self, uuid: &str) -> PathBuf {
        self.secrets_dir().join(format!("{uuid}.{WRAPPED_EXT}"))
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path().is_file()
    }

    /// Create the store skeleton. Fails if the marker directory exists.
    pub fn create_skeleton(&self) -> Result<()> {
        let store = self.store_dir();
        if store.exists() {
            return Err(Error::ProjectAlreadyInitialized(store));
        }
        fs::create_dir_all(self.public_keys_dir())?;
        fs::create_dir_all(self.secrets_dir())?;
        Ok(())
    }

    /// UUIDs that have a public key in the store, unordered.
    pub fn list_public_key_uuids(&self) -> Result<Vec<String>> {
        list_stems(&self.public_keys_dir(), PUBLIC_KEY_EXT)
    }

    /// UUIDs that have a wrapped project key in the store, unordered.
    pub fn list_wrapped_key_uuids(&self) -> Result<Vec<String>> {
        list_stems(&self.secrets_dir(), WRAPPED_EXT)
    }
}

fn list_stems(dir: &Path, ext: &str) -> Result<Vec<String>> {
    let mut stems = Vec::new();
    if !dir.is_dir() {
        return Ok(stems);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(ext) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    Ok(stems)
}

/// Write `bytes` to `path` atomically: temp file in the same directory,
/// permissions applied before the rename.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, bytes)?;
    tmp.as_file().sync_all()?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("project");
        let nested = root.join("services/api");
        fs::create_dir_all(&nested).unwrap();

        assert!(matches!(
            StoreLayout::discover(&nested),
            Err(Error::ProjectNotInitialized)
        ));

        let layout = StoreLayout::at(&root);
        layout.create_skeleton().unwrap();
        fs::write(layout.config_path(), "[project]\n").unwrap();

        let found = StoreLayout::discover(&nested).unwrap();
        assert_eq!(found.root(), root.as_path());
    }

    #[test]
    fn skeleton_refuses_existing_store() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::at(tmp.path().join("p"));
        layout.create_skeleton().unwrap();
        assert!(matches!(
            layout.create_skeleton(),
            Err(Error::ProjectAlreadyInitialized(_))
        ));
    }

    #[test]
    fn uuid_listing_filters_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StoreLayout::at(tmp.path());
        layout.create_skeleton().unwrap();
        fs::write(layout.public_key_path("aaa"), "x").unwrap();
        fs::write(layout.public_keys_dir().join("notes.txt"), "x").unwrap();
        fs::write(layout.wrapped_key_path("bbb"), "x").unwrap();

        assert_eq!(layout.list_public_key_uuids().unwrap(), vec!["aaa"]);
        assert_eq!(layout.list_wrapped_key_uuids().unwrap(), vec!["bbb"]);
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("file.bin");
        write_atomic(&path, b"one", 0o600).unwrap();
        write_atomic(&path, b"two", 0o600).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
    }
}
