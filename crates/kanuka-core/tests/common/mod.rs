//! Shared fixtures: real stores built through the public workflow API with
//! injected user directories, one per simulated workstation.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use kanuka_core::keycodec::{self, Passphrase};
use kanuka_core::layout::StoreLayout;
use kanuka_core::workflows::{self, InitOptions, KeySource, RegisterTarget};
use kanuka_core::{StoreHandle, SymmetricKey, UserDirs};
use rsa::RsaPrivateKey;

pub struct Team {
    pub tmp: tempfile::TempDir,
    pub root: PathBuf,
    pub alice: UserDirs,
    pub project_uuid: String,
    pub alice_uuid: String,
}

/// A teammate registered by public-key text; the private half never leaves
/// the test.
pub struct Member {
    pub email: String,
    pub uuid: String,
    pub private: RsaPrivateKey,
}

/// Initialize a fresh project as alice@example.com on device "laptop".
pub fn init_as_alice() -> Team {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("project");
    fs::create_dir_all(&root).unwrap();
    let alice = UserDirs::at(tmp.path().join("alice"));
    let report = workflows::init(
        &root,
        &alice,
        &InitOptions {
            project_name: Some("api".into()),
            email: Some("alice@example.com".into()),
            device_name: Some("laptop".into()),
        },
    )
    .unwrap();
    Team {
        tmp,
        root,
        alice,
        project_uuid: report.project_uuid,
        alice_uuid: report.user_uuid,
    }
}

pub fn open(team: &Team) -> StoreHandle {
    StoreHandle::open_mut(&team.root, team.alice.clone()).unwrap()
}

pub fn layout(team: &Team) -> StoreLayout {
    StoreLayout::at(&team.root)
}

pub fn alice_private(team: &Team) -> RsaPrivateKey {
    keycodec::load_private_key(
        &team.alice.private_key_path(&team.project_uuid),
        Passphrase::Provided(""),
    )
    .unwrap()
}

/// Register a new member by raw public-key text, as alice.
pub fn register_member(team: &Team, email: &str) -> Member {
    let (private, public) = keycodec::generate_keypair().unwrap();
    let mut store = open(team);
    let report = workflows::register(
        &mut store,
        &RegisterTarget::PubkeyText {
            text: keycodec::public_key_pem(&public).unwrap(),
            email: Some(email.into()),
        },
        &KeySource::Default,
        None,
    )
    .unwrap();
    let (uuid, _) = report.granted[0].clone();
    Member {
        email: email.into(),
        uuid,
        private,
    }
}

pub fn unwrap_key_for(team: &Team, uuid: &str, private: &RsaPrivateKey) -> SymmetricKey {
    let blob = fs::read(layout(team).wrapped_key_path(uuid)).unwrap();
    keycodec::unwrap_project_key(private, &blob).unwrap()
}

/// Everything under `dir` as path -> bytes, minus the advisory lock file.
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut out = BTreeMap::new();
    for entry in walkdir_paths(dir) {
        if entry.file_name().map(|n| n == ".lock").unwrap_or(false) {
            continue;
        }
        out.insert(entry.clone(), fs::read(&entry).unwrap());
    }
    out
}

fn walkdir_paths(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}
