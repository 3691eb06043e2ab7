//! Workflow operations: thin orchestrators over the codec, cipher, resolver,
//! access, and sync layers. Every mutating workflow appends one audit record
//! on success; dry-runs return the same report while leaving the filesystem
//! byte-identical.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rsa::RsaPrivateKey;
use uuid::Uuid;

use crate::access::{self, FileState, UserAccess};
use crate::audit::{self, AuditRecord};
use crate::cipher;
use crate::config::{
    self, DeviceEntry, GlobalConfig, ProjectConfig, ProjectMeta, ProjectRef, UserDirs,
    UserIdentity,
};
use crate::error::{Error, Result};
use crate::keycodec::{self, Passphrase};
use crate::layout::{write_atomic, StoreLayout};
use crate::resolver::{self, FileKind};
use crate::secret::SymmetricKey;
use crate::store::{CancelFlag, StoreHandle};
use crate::sync::{rotate_project_key, SyncOptions, SyncReport};

/// Where the caller's private key comes from.
pub enum KeySource {
    /// This workstation's key for the open project.
    Default,
    /// Armored key text, e.g. streamed through standard input.
    Text(String),
}

impl KeySource {
    fn load(&self, store: &StoreHandle, passphrase: Option<&str>) -> Result<RsaPrivateKey> {
        let pass = match passphrase {
            Some(p) => Passphrase::Provided(p),
            None => Passphrase::Prompt,
        };
        match self {
            KeySource::Default => keycodec::load_private_key(&store.private_key_path(), pass),
            KeySource::Text(text) => keycodec::parse_private_key(text, pass),
        }
    }
}

// --- init ---

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub project_name: Option<String>,
    /// Required the first time kanuka runs on a workstation.
    pub email: Option<String>,
    pub device_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub project_uuid: String,
    pub project_name: String,
    pub user_uuid: String,
    pub device_name: String,
}

/// Initialize a new project at `root`: store skeleton, workstation identity,
/// keypair, project key, and the first wrapping. A failure rolls the
/// partially-created store directory back off disk.
pub fn init(root: &Path, user_dirs: &UserDirs, opts: &InitOptions) -> Result<InitReport> {
    let layout = StoreLayout::at(root);
    if layout.store_dir().exists() {
        return Err(Error::ProjectAlreadyInitialized(layout.store_dir()));
    }

    let mut global = match user_dirs.load_global()? {
        Some(global) => global,
        None => {
            let email = opts.email.clone().ok_or_else(|| {
                Error::InvalidEmail(
                    "an email is required the first time kanuka runs on this workstation".into(),
                )
            })?;
            config::validate_email(&email)?;
            GlobalConfig {
                user: UserIdentity {
                    uuid: Uuid::new_v4().to_string(),
                    email,
                },
                projects: Default::default(),
            }
        }
    };

    let result = init_store(&layout, &mut global, user_dirs, opts);
    if result.is_err() {
        let _ = fs::remove_dir_all(layout.store_dir());
    }
    result
}

fn init_store(
    layout: &StoreLayout,
    global: &mut GlobalConfig,
    user_dirs: &UserDirs,
    opts: &InitOptions,
) -> Result<InitReport> {
    layout.create_skeleton()?;

    let project_uuid = Uuid::new_v4().to_string();
    let project_name = opts.project_name.clone().unwrap_or_else(|| {
        layout
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });
    let device_name = match &opts.device_name {
        Some(name) => config::sanitize_device_name(name),
        None => config::default_device_name(),
    };
    let user_uuid = global.user.uuid.clone();

    let (private, public) = keycodec::generate_keypair()?;
    fs::create_dir_all(user_dirs.keys_dir())?;
    write_atomic(
        &user_dirs.private_key_path(&project_uuid),
        keycodec::private_key_pem(&private)?.as_bytes(),
        0o600,
    )?;
    let public_pem = keycodec::public_key_pem(&public)?;
    write_atomic(
        &user_dirs.public_key_path(&project_uuid),
        public_pem.as_bytes(),
        0o644,
    )?;
    write_atomic(&layout.public_key_path(&user_uuid), public_pem.as_bytes(), 0o644)?;

    let project_key = SymmetricKey::generate();
    write_atomic(
        &layout.wrapped_key_path(&user_uuid),
        &keycodec::wrap_project_key(&public, &project_key)?,
        0o600,
    )?;

    let mut project = ProjectConfig {
        project: ProjectMeta {
            uuid: project_uuid.clone(),
            name: project_name.clone(),
        },
        users: Default::default(),
        devices: Default::default(),
    };
    project
        .users
        .insert(user_uuid.clone(), global.user.email.clone());
    project.devices.insert(
        user_uuid.clone(),
        DeviceEntry {
            email: global.user.email.clone(),
            name: device_name.clone(),
            created_at: Utc::now(),
        },
    );
    project.save(&layout.config_path())?;

    global.projects.insert(
        project_uuid.clone(),
        ProjectRef {
            device_name: device_name.clone(),
            project_name: project_name.clone(),
        },
    );
    user_dirs.save_global(global)?;

    let mut record = AuditRecord::new("init", &global.user.email, &user_uuid);
    record.project_name = Some(project_name.clone());
    record.project_uuid = Some(project_uuid.clone());
    record.device_name = Some(device_name.clone());
    audit::append(layout, &record);

    tracing::info!(%project_uuid, %device_name, "initialized project");
    Ok(InitReport {
        project_uuid,
        project_name,
        user_uuid,
        device_name,
    })
}

// --- create ---

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub device_name: Option<String>,
    /// Required the first time kanuka runs on a workstation.
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateReport {
    pub user_uuid: String,
    pub device_name: String,
}

/// Add this workstation as a new pending device of an existing project. No
/// wrapping is written; a team member grants access with `register`.
pub fn create(store: &mut StoreHandle, opts: &CreateOptions) -> Result<CreateReport> {
    let mut global = match store.global.take() {
        Some(global) => global,
        None => {
            let email = opts.email.clone().ok_or_else(|| {
                Error::InvalidEmail(
                    "an email is required the first time kanuka runs on this workstation".into(),
                )
            })?;
            config::validate_email(&email)?;
            GlobalConfig {
                user: UserIdentity {
                    uuid: Uuid::new_v4().to_string(),
                    email,
                },
                projects: Default::default(),
            }
        }
    };
    let user_uuid = global.user.uuid.clone();
    let email = global.user.email.clone();

    if store.layout().public_key_path(&user_uuid).is_file() {
        store.global = Some(global);
        return Err(Error::PublicKeyExists(email));
    }
    let device_name = match &opts.device_name {
        Some(name) => config::sanitize_device_name(name),
        None => config::default_device_name(),
    };
    if store.project.is_device_name_taken(&email, &device_name) {
        store.global = Some(global);
        return Err(Error::DeviceNameTaken {
            email,
            name: device_name,
        });
    }

    let project_uuid = store.project.project.uuid.clone();
    let (private, public) = keycodec::generate_keypair()?;
    fs::create_dir_all(store.user_dirs().keys_dir())?;
    write_atomic(
        &store.user_dirs().private_key_path(&project_uuid),
        keycodec::private_key_pem(&private)?.as_bytes(),
        0o600,
    )?;
    let public_pem = keycodec::public_key_pem(&public)?;
    write_atomic(
        &store.user_dirs().public_key_path(&project_uuid),
        public_pem.as_bytes(),
        0o644,
    )?;
    write_atomic(
        &store.layout().public_key_path(&user_uuid),
        public_pem.as_bytes(),
        0o644,
    )?;

    store.project.users.insert(user_uuid.clone(), email.clone());
    store.project.devices.insert(
        user_uuid.clone(),
        DeviceEntry {
            email: email.clone(),
            name: device_name.clone(),
            created_at: Utc::now(),
        },
    );
    store.save_project()?;

    global.projects.insert(
        project_uuid,
        ProjectRef {
            device_name: device_name.clone(),
            project_name: store.project.project.name.clone(),
        },
    );
    store.user_dirs().save_global(&global)?;
    store.global = Some(global);

    let mut record = AuditRecord::new("create", &email, &user_uuid);
    record.device_name = Some(device_name.clone());
    audit::append(store.layout(), &record);

    Ok(CreateReport {
        user_uuid,
        device_name,
    })
}

// --- register ---

pub enum RegisterTarget {
    /// Grant every pending device registered under this email.
    Email(String),
    /// Raw public key text; a fresh device entry is minted for `email`.
    PubkeyText { text: String, email: Option<String> },
    /// A `.pub` file. A stem that names a known device grants that device;
    /// anything else is treated as new key material for `email`.
    PubkeyFile { path: PathBuf, email: Option<String> },
}

#[derive(Debug, Clone)]
pub struct RegisterReport {
    /// (uuid, email) pairs that received a wrapping.
    pub granted: Vec<(String, String)>,
}

/// Wrap the current project key for a pending user or for newly supplied
/// public key material. The caller must already hold access.
pub fn register(
    store: &mut StoreHandle,
    target: &RegisterTarget,
    key: &KeySource,
    passphrase: Option<&str>,
) -> Result<RegisterReport> {
    let caller_uuid = store.caller_uuid_with_access()?;
    let caller_email = store.identity()?.email.clone();
    let private = key.load(store, passphrase)?;
    let wrapped = fs::read(store.layout().wrapped_key_path(&caller_uuid))?;
    let project_key = keycodec::unwrap_project_key(&private, &wrapped)?;

    let mut granted = Vec::new();
    let mode = match target {
        RegisterTarget::Email(email) => {
            let uuids = store.project.all_uuids_by_email(email);
            if uuids.is_empty() {
                return Err(Error::UserNotFound(email.clone()));
            }
            let pending: Vec<String> = uuids
                .into_iter()
                .filter(|uuid| {
                    store.layout().public_key_path(uuid).is_file()
                        && !store.layout().wrapped_key_path(uuid).is_file()
                })
                .collect();
            if pending.is_empty() {
                return Err(Error::PublicKeyExists(email.clone()));
            }
            for uuid in pending {
                let pem = fs::read_to_string(store.layout().public_key_path(&uuid))
                    .map_err(|_| Error::PublicKeyNotFound(uuid.clone()))?;
                let public = keycodec::parse_public_key(&pem)?;
                write_atomic(
                    &store.layout().wrapped_key_path(&uuid),
                    &keycodec::wrap_project_key(&public, &project_key)?,
                    0o600,
                )?;
                granted.push((uuid, email.clone()));
            }
            "email"
        }
        RegisterTarget::PubkeyText { text, email } => {
            grant_key_material(store, &project_key, text, email.as_deref(), &mut granted)?;
            "pubkey-text"
        }
        RegisterTarget::PubkeyFile { path, email } => {
            let text =
                fs::read_to_string(path).map_err(|_| Error::FileNotFound(path.clone()))?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if let Some(known_email) = store.project.users.get(&stem).cloned() {
                if store.layout().wrapped_key_path(&stem).is_file() {
                    return Err(Error::PublicKeyExists(known_email));
                }
                let public = keycodec::parse_public_key(&text)?;
                if !store.layout().public_key_path(&stem).is_file() {
                    write_atomic(
                        &store.layout().public_key_path(&stem),
                        keycodec::public_key_pem(&public)?.as_bytes(),
                        0o644,
                    )?;
                }
                write_atomic(
                    &store.layout().wrapped_key_path(&stem),
                    &keycodec::wrap_project_key(&public, &project_key)?,
                    0o600,
                )?;
                granted.push((stem, known_email));
            } else {
                grant_key_material(store, &project_key, &text, email.as_deref(), &mut granted)?;
            }
            "pubkey-file"
        }
    };

    let mut record = AuditRecord::new("register", &caller_email, &caller_uuid);
    record.mode = Some(mode.to_string());
    record.target_uuid = granted.first().map(|(uuid, _)| uuid.clone());
    record.target_user = granted.first().map(|(_, email)| email.clone());
    record.users_count = Some(granted.len());
    audit::append(store.layout(), &record);

    Ok(RegisterReport { granted })
}

/// Mint a device entry for raw public key material and wrap the project key
/// under it. The config tables must keep covering exactly the UUIDs with a
/// public key, so an email is required.
fn grant_key_material(
    store: &mut StoreHandle,
    project_key: &SymmetricKey,
    text: &str,
    email: Option<&str>,
    granted: &mut Vec<(String, String)>,
) -> Result<()> {
    let email = email.ok_or_else(|| {
        Error::InvalidEmail("an email is required when registering a new public key".into())
    })?;
    config::validate_email(email)?;
    let public = keycodec::parse_public_key(text)?;

    let uuid = Uuid::new_v4().to_string();
    let device_name = unique_device_name(&store.project, email, "imported");
    write_atomic(
        &store.layout().public_key_path(&uuid),
        keycodec::public_key_pem(&public)?.as_bytes(),
        0o644,
    )?;
    write_atomic(
        &store.layout().wrapped_key_path(&uuid),
        &keycodec::wrap_project_key(&public, project_key)?,
        0o600,
    )?;

    store.project.users.insert(uuid.clone(), email.to_string());
    store.project.devices.insert(
        uuid.clone(),
        DeviceEntry {
            email: email.to_string(),
            name: device_name,
            created_at: Utc::now(),
        },
    );
    store.save_project()?;
    granted.push((uuid, email.to_string()));
    Ok(())
}

fn unique_device_name(project: &ProjectConfig, email: &str, base: &str) -> String {
    if !project.is_device_name_taken(email, base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let name = format!("{base}-{n}");
        if !project.is_device_name_taken(email, &name) {
            return name;
        }
        n += 1;
    }
}

// --- encrypt / decrypt ---

#[derive(Debug, Clone, Default)]
pub struct FileOpOptions {
    pub patterns: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct FileOpReport {
    pub files: Vec<PathBuf>,
    pub dry_run: bool,
}

/// Seal every resolved plaintext as a `.kanuka` sibling.
pub fn encrypt(
    store: &StoreHandle,
    opts: &FileOpOptions,
    key: &KeySource,
    passphrase: Option<&str>,
    cancel: &CancelFlag,
) -> Result<FileOpReport> {
    let caller_uuid = store.caller_uuid_with_access()?;
    let files = resolve_or_scan(store, &opts.patterns, FileKind::Plaintext)?;
    if files.is_empty() {
        return Err(Error::NoFilesFound);
    }
    if opts.dry_run {
        return Ok(FileOpReport {
            files,
            dry_run: true,
        });
    }

    let project_key = unwrap_project_key_for(store, &caller_uuid, key, passphrase)?;
    let mut sealed = Vec::with_capacity(files.len());
    for path in &files {
        let plaintext = zeroize::Zeroizing::new(fs::read(path)?);
        sealed.push((access::sibling_ciphertext(path), cipher::seal(&project_key, &plaintext)));
    }

    cancel.check()?;
    for (path, bytes) in &sealed {
        write_atomic(path, bytes, 0o644)?;
    }

    let mut record = AuditRecord::new("encrypt", &store.identity()?.email, &caller_uuid);
    record.files = Some(rel_strings(store.layout().root(), &files));
    record.files_count = Some(files.len());
    audit::append(store.layout(), &record);

    Ok(FileOpReport {
        files,
        dry_run: false,
    })
}

/// Open every resolved ciphertext back into its plaintext sibling. An
/// existing plaintext is overwritten with a warning, never an error.
pub fn decrypt(
    store: &StoreHandle,
    opts: &FileOpOptions,
    key: &KeySource,
    passphrase: Option<&str>,
    cancel: &CancelFlag,
) -> Result<FileOpReport> {
    let caller_uuid = store.caller_uuid_with_access()?;
    let files = resolve_or_scan(store, &opts.patterns, FileKind::Ciphertext)?;
    if files.is_empty() {
        return Err(Error::NoFilesFound);
    }
    if opts.dry_run {
        return Ok(FileOpReport {
            files,
            dry_run: true,
        });
    }

    let project_key = unwrap_project_key_for(store, &caller_uuid, key, passphrase)?;
    let mut opened = Vec::with_capacity(files.len());
    for path in &files {
        let sealed = fs::read(path)?;
        let target = access::sibling_plaintext(path);
        if target.exists() {
            tracing::warn!(path = %target.display(), "overwriting existing plaintext");
        }
        opened.push((target, cipher::open(&project_key, &sealed, path)?));
    }

    cancel.check()?;
    for (path, plaintext) in &opened {
        write_atomic(path, plaintext, 0o600)?;
    }

    let mut record = AuditRecord::new("decrypt", &store.identity()?.email, &caller_uuid);
    record.files = Some(rel_strings(store.layout().root(), &files));
    record.files_count = Some(files.len());
    audit::append(store.layout(), &record);

    Ok(FileOpReport {
        files,
        dry_run: false,
    })
}

// --- revoke ---

pub enum RevokeSelector {
    /// By email; a device name narrows to one workstation, otherwise every
    /// device of that user is revoked.
    Email {
        email: String,
        device: Option<String>,
    },
    /// By `.pub` file path; the stem is the device uuid.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct RevokeReport {
    /// UUIDs removed from the project.
    pub revoked: Vec<String>,
    /// UUIDs whose wrapping was (or would be) deleted.
    pub removed_wrappings: Vec<String>,
    /// Users that keep access after the rotation.
    pub active_uuids: Vec<String>,
    /// Ciphertexts re-encrypted under the new key.
    pub files: Vec<PathBuf>,
    pub dry_run: bool,
}

impl RevokeReport {
    pub fn users_count(&self) -> usize {
        self.active_uuids.len()
    }

    pub fn files_count(&self) -> usize {
        self.files.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed_wrappings.len()
    }
}

/// Remove devices from the project and rotate the key away from them.
pub fn revoke(
    store: &mut StoreHandle,
    selector: &RevokeSelector,
    dry_run: bool,
    key: &KeySource,
    passphrase: Option<&str>,
    cancel: &CancelFlag,
) -> Result<RevokeReport> {
    let caller_uuid = store.caller_uuid_with_access()?;
    let uuids: Vec<String> = match selector {
        RevokeSelector::Email { email, device } => match device {
            Some(device) => {
                let uuid = store
                    .project
                    .uuid_by_email_and_device(email, device)
                    .ok_or_else(|| Error::DeviceNotFound {
                        email: email.clone(),
                        device: device.clone(),
                    })?;
                vec![uuid.to_string()]
            }
            None => {
                let uuids = store.project.all_uuids_by_email(email);
                if uuids.is_empty() {
                    return Err(Error::UserNotFound(email.clone()));
                }
                uuids
            }
        },
        RevokeSelector::File(path) => {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if !store.project.users.contains_key(&stem) {
                return Err(Error::UserNotFound(stem));
            }
            vec![stem]
        }
    };
    if uuids.contains(&caller_uuid) {
        return Err(Error::SelfRevoke);
    }

    let private = key.load(store, passphrase)?;
    let removed_wrappings: Vec<String> = uuids
        .iter()
        .filter(|uuid| store.layout().wrapped_key_path(uuid).is_file())
        .cloned()
        .collect();
    let sync_opts = SyncOptions {
        exclude_uuids: uuids.iter().cloned().collect(),
        dry_run,
    };
    if dry_run {
        let sync = rotate_project_key(store, &private, &sync_opts, cancel)?;
        return Ok(RevokeReport {
            revoked: uuids,
            removed_wrappings,
            active_uuids: sync.active_uuids,
            files: sync.files,
            dry_run: true,
        });
    }

    let target_emails: Vec<String> = uuids
        .iter()
        .filter_map(|uuid| store.project.users.get(uuid).cloned())
        .collect();

    // The wrappings go first: once a device's wrapping is gone it cannot
    // unwrap the project key, whatever fails afterwards. Leaving them to the
    // rotation's exclusion pass would let an unrelated decrypt failure abort
    // the rotation with the revoked wrapping still on disk.
    cancel.check()?;
    for uuid in &removed_wrappings {
        fs::remove_file(store.layout().wrapped_key_path(uuid))?;
    }
    for uuid in &uuids {
        let pub_path = store.layout().public_key_path(uuid);
        if pub_path.is_file() {
            fs::remove_file(&pub_path)?;
        }
        store.project.remove_device(uuid);
    }
    store.save_project()?;

    let sync = rotate_project_key(store, &private, &sync_opts, cancel)?;

    let mut record = AuditRecord::new("revoke", &store.identity()?.email, &caller_uuid);
    record.target_user = target_emails.first().cloned();
    record.target_uuid = uuids.first().cloned();
    if let RevokeSelector::Email {
        device: Some(device),
        ..
    } = selector
    {
        record.device = Some(device.clone());
    }
    record.users_count = Some(sync.users_count());
    record.files_count = Some(sync.files_count());
    record.removed_count = Some(removed_wrappings.len());
    audit::append(store.layout(), &record);

    Ok(RevokeReport {
        revoked: uuids,
        removed_wrappings,
        active_uuids: sync.active_uuids,
        files: sync.files,
        dry_run: false,
    })
}

// --- rotate ---

#[derive(Debug, Clone)]
pub struct RotateReport {
    pub user_uuid: String,
}

/// Re-key the caller's own device: fresh keypair, same project key. The
/// store-side wrapping and public key are replaced before the local private
/// key so a failure never leaves the store pointing at a key that was never
/// written.
pub fn rotate(
    store: &StoreHandle,
    key: &KeySource,
    passphrase: Option<&str>,
) -> Result<RotateReport> {
    let caller_uuid = store.caller_uuid_with_access()?;
    let old_private = key.load(store, passphrase)?;
    let wrapped = fs::read(store.layout().wrapped_key_path(&caller_uuid))?;
    let project_key = keycodec::unwrap_project_key(&old_private, &wrapped)?;

    let (new_private, new_public) = keycodec::generate_keypair()?;
    let new_wrapping = keycodec::wrap_project_key(&new_public, &project_key)?;
    let public_pem = keycodec::public_key_pem(&new_public)?;
    let private_pem = keycodec::private_key_pem(&new_private)?;

    write_atomic(
        &store.layout().wrapped_key_path(&caller_uuid),
        &new_wrapping,
        0o600,
    )?;
    write_atomic(
        &store.layout().public_key_path(&caller_uuid),
        public_pem.as_bytes(),
        0o644,
    )?;
    fs::create_dir_all(store.user_dirs().keys_dir())?;
    write_atomic(&store.private_key_path(), private_pem.as_bytes(), 0o600)?;
    write_atomic(
        &store
            .user_dirs()
            .public_key_path(&store.project.project.uuid),
        public_pem.as_bytes(),
        0o644,
    )?;

    let record = AuditRecord::new("rotate", &store.identity()?.email, &caller_uuid);
    audit::append(store.layout(), &record);

    Ok(RotateReport {
        user_uuid: caller_uuid,
    })
}

// --- sync ---

/// Rotate the project key for everyone currently holding a public key.
pub fn sync(
    store: &StoreHandle,
    dry_run: bool,
    key: &KeySource,
    passphrase: Option<&str>,
    cancel: &CancelFlag,
) -> Result<SyncReport> {
    let private = key.load(store, passphrase)?;
    let opts = SyncOptions {
        exclude_uuids: Default::default(),
        dry_run,
    };
    let report = rotate_project_key(store, &private, &opts, cancel)?;
    if !dry_run {
        let caller_uuid = store.caller_uuid_with_access()?;
        let mut record = AuditRecord::new("sync", &store.identity()?.email, &caller_uuid);
        record.users_count = Some(report.users_count());
        record.files_count = Some(report.files_count());
        audit::append(store.layout(), &record);
    }
    Ok(report)
}

// --- clean ---

#[derive(Debug, Clone)]
pub struct CleanReport {
    /// UUIDs whose orphaned wrapping was (or would be) deleted.
    pub removed: Vec<String>,
    pub dry_run: bool,
}

/// Delete wrappings whose uuid has no public key.
pub fn clean(store: &StoreHandle, dry_run: bool) -> Result<CleanReport> {
    let mut orphans: Vec<String> = store
        .layout()
        .list_wrapped_key_uuids()?
        .into_iter()
        .filter(|uuid| !store.layout().public_key_path(uuid).is_file())
        .collect();
    orphans.sort();

    if !dry_run {
        for uuid in &orphans {
            fs::remove_file(store.layout().wrapped_key_path(uuid))?;
        }
        let (email, uuid) = store
            .identity()
            .map(|i| (i.email.clone(), i.uuid.clone()))
            .unwrap_or_default();
        let mut record = AuditRecord::new("clean", &email, &uuid);
        record.removed_count = Some(orphans.len());
        audit::append(store.layout(), &record);
    }
    Ok(CleanReport {
        removed: orphans,
        dry_run,
    })
}

// --- status ---

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub users: Vec<UserAccess>,
    pub files: Vec<FileState>,
}

/// Read-only membership and freshness report.
pub fn status(store: &StoreHandle) -> Result<StatusReport> {
    Ok(StatusReport {
        users: access::user_report(store)?,
        files: access::file_report(store)?,
    })
}

// --- helpers ---

fn resolve_or_scan(
    store: &StoreHandle,
    patterns: &[String],
    kind: FileKind,
) -> Result<Vec<PathBuf>> {
    let root = store.layout().root();
    match resolver::resolve(patterns, root, kind)? {
        Some(files) => Ok(files),
        None => resolver::scan(root, kind),
    }
}

fn unwrap_project_key_for(
    store: &StoreHandle,
    caller_uuid: &str,
    key: &KeySource,
    passphrase: Option<&str>,
) -> Result<SymmetricKey> {
    let private = key.load(store, passphrase)?;
    let wrapped = fs::read(store.layout().wrapped_key_path(caller_uuid))?;
    keycodec::unwrap_project_key(&private, &wrapped)
}

fn rel_strings(root: &Path, files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .map(|path| {
            path.strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}
