//! `StoreHandle`: the resolved paths and loaded configs of one project,
//! passed explicitly into every workflow. No module-level state.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fs2::FileExt;

use crate::config::{GlobalConfig, ProjectConfig, UserDirs};
use crate::error::{Error, Result};
use crate::layout::StoreLayout;

/// Ambient cancellation signal, set from e.g. a Ctrl-C handler. Workflows
/// poll it at phase boundaries; cancellation before the write phase leaves
/// the store untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An opened project store.
pub struct StoreHandle {
    layout: StoreLayout,
    user_dirs: UserDirs,
    pub global: Option<GlobalConfig>,
    pub project: ProjectConfig,
    // Advisory lock on .kanuka/.lock, held for the life of the handle.
    _lock: Option<File>,
}

impl StoreHandle {
    /// Open for reading: discover the project root and load both configs.
    pub fn open(start: &Path, user_dirs: UserDirs) -> Result<Self> {
        Self::open_inner(start, user_dirs, false)
    }

    /// Open for a mutating workflow: additionally takes the advisory
    /// exclusive lock for the duration of the handle.
    pub fn open_mut(start: &Path, user_dirs: UserDirs) -> Result<Self> {
        Self::open_inner(start, user_dirs, true)
    }

    fn open_inner(start: &Path, user_dirs: UserDirs, exclusive: bool) -> Result<Self> {
        let layout = StoreLayout::discover(start)?;
        let project = ProjectConfig::load(&layout.config_path())?;
        let global = user_dirs.load_global()?;
        let lock = if exclusive {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(layout.lock_path())?;
            file.lock_exclusive()?;
            Some(file)
        } else {
            None
        };
        Ok(StoreHandle {
            layout,
            user_dirs,
            global,
            project,
            _lock: lock,
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn user_dirs(&self) -> &UserDirs {
        &self.user_dirs
    }

    /// The caller's workstation identity; absent global config means this
    /// workstation was never set up, which reads as no access.
    pub fn identity(&self) -> Result<&crate::config::UserIdentity> {
        self.global.as_ref().map(|g| &g.user).ok_or(Error::NoAccess)
    }

    /// The caller's uuid, verified to hold a wrapped project key.
    pub fn caller_uuid_with_access(&self) -> Result<String> {
        let uuid = self.identity()?.uuid.clone();
        if self.layout.wrapped_key_path(&uuid).is_file() {
            Ok(uuid)
        } else {
            Err(Error::NoAccess)
        }
    }

    /// Path of this workstation's private key for the open project.
    pub fn private_key_path(&self) -> std::path::PathBuf {
        self.user_dirs.private_key_path(&self.project.project.uuid)
    }

    pub fn save_project(&self) -> Result<()> {
        self.project.save(&self.layout.config_path())
    }

    pub fn save_global(&self) -> Result<()> {
        match &self.global {
            Some(global) => self.user_dirs.save_global(global),
            None => Ok(()),
        }
    }
}
