//! Read-only classification of who has access and which files are in sync.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::Result;
use crate::layout::WRAPPED_EXT;
use crate::resolver::{self, FileKind};
use crate::store::StoreHandle;

/// Membership state of one uuid, from the `.pub` / `.kanuka` matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UserStatus {
    /// Has a public key and a wrapped project key.
    Active,
    /// Has a public key but no wrapping yet; waiting for `register`.
    Pending,
    /// Has a wrapping but no public key; removable with `clean`.
    Orphan,
}

#[derive(Debug, Clone)]
pub struct UserAccess {
    pub uuid: String,
    pub email: Option<String>,
    pub device: Option<String>,
    pub status: UserStatus,
}

/// Freshness of one plaintext/ciphertext pair, by mtime at one-second
/// granularity. Ties go to `Current`: the ciphertext is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Current,
    Stale,
    Unencrypted,
    EncryptedOnly,
}

#[derive(Debug, Clone)]
pub struct FileState {
    pub plaintext: PathBuf,
    pub ciphertext: PathBuf,
    pub status: FileStatus,
}

/// Classify every uuid mentioned by either store directory. Sorted by
/// severity (active, pending, orphan), then email, falling back to uuid.
pub fn user_report(store: &StoreHandle) -> Result<Vec<UserAccess>> {
    let layout = store.layout();
    let with_pub: BTreeSet<String> = layout.list_public_key_uuids()?.into_iter().collect();
    let with_wrap: BTreeSet<String> = layout.list_wrapped_key_uuids()?.into_iter().collect();

    let mut report = Vec::new();
    for uuid in with_pub.union(&with_wrap) {
        let status = match (with_pub.contains(uuid), with_wrap.contains(uuid)) {
            (true, true) => UserStatus::Active,
            (true, false) => UserStatus::Pending,
            (false, true) => UserStatus::Orphan,
            (false, false) => unreachable!("uuid from neither set"),
        };
        let device = store.project.devices.get(uuid);
        report.push(UserAccess {
            uuid: uuid.clone(),
            email: store
                .project
                .users
                .get(uuid)
                .cloned()
                .or_else(|| device.map(|d| d.email.clone())),
            device: device.map(|d| d.name.clone()),
            status,
        });
    }
    report.sort_by(|a, b| {
        (a.status, a.email.as_deref().unwrap_or(&a.uuid), &a.uuid).cmp(&(
            b.status,
            b.email.as_deref().unwrap_or(&b.uuid),
            &b.uuid,
        ))
    });
    Ok(report)
}

/// Pair up every plaintext and ciphertext under the project root.
pub fn file_report(store: &StoreHandle) -> Result<Vec<FileState>> {
    let root = store.layout().root();
    let mut report = Vec::new();
    let mut claimed = BTreeSet::new();

    for plaintext in resolver::scan(root, FileKind::Plaintext)? {
        let ciphertext = sibling_ciphertext(&plaintext);
        let status = if !ciphertext.is_file() {
            FileStatus::Unencrypted
        } else if mtime_secs(&plaintext)? > mtime_secs(&ciphertext)? {
            FileStatus::Stale
        } else {
            FileStatus::Current
        };
        claimed.insert(ciphertext.clone());
        report.push(FileState {
            plaintext,
            ciphertext,
            status,
        });
    }

    for ciphertext in resolver::scan(root, FileKind::Ciphertext)? {
        if claimed.contains(&ciphertext) {
            continue;
        }
        let plaintext = sibling_plaintext(&ciphertext);
        report.push(FileState {
            plaintext,
            ciphertext,
            status: FileStatus::EncryptedOnly,
        });
    }
    Ok(report)
}

/// `X` -> `X.kanuka`
pub fn sibling_ciphertext(plaintext: &Path) -> PathBuf {
    let mut name = plaintext
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push('.');
    name.push_str(WRAPPED_EXT);
    plaintext.with_file_name(name)
}

/// `X.kanuka` -> `X`
pub fn sibling_plaintext(ciphertext: &Path) -> PathBuf {
    let name = ciphertext
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(&format!(".{WRAPPED_EXT}"))
        .unwrap_or(&name)
        .to_string();
    ciphertext.with_file_name(stem)
}

fn mtime_secs(path: &Path) -> Result<u64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserDirs;
    use crate::layout::StoreLayout;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    fn handle(tmp: &tempfile::TempDir) -> StoreHandle {
        let root = tmp.path().join("project");
        let layout = StoreLayout::at(&root);
        layout.create_skeleton().unwrap();
        fs::write(
            layout.config_path(),
            "[project]\nuuid = \"p-1\"\nname = \"api\"\n\n\
             [users]\nbbb = \"bob@example.com\"\naaa = \"alice@example.com\"\n",
        )
        .unwrap();
        StoreHandle::open(&root, UserDirs::at(tmp.path().join("user"))).unwrap()
    }

    fn set_mtime(path: &Path, t: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    #[test]
    fn status_matrix() {
        let tmp = tempfile::tempdir().unwrap();
        let store = handle(&tmp);
        let layout = store.layout();
        // active: both; pending: pub only; orphan: wrap only
        fs::write(layout.public_key_path("aaa"), "x").unwrap();
        fs::write(layout.wrapped_key_path("aaa"), "x").unwrap();
        fs::write(layout.public_key_path("bbb"), "x").unwrap();
        fs::write(layout.wrapped_key_path("ccc"), "x").unwrap();

        let report = user_report(&store).unwrap();
        let by_uuid: Vec<(&str, UserStatus)> = report
            .iter()
            .map(|u| (u.uuid.as_str(), u.status))
            .collect();
        assert_eq!(
            by_uuid,
            vec![
                ("aaa", UserStatus::Active),
                ("bbb", UserStatus::Pending),
                ("ccc", UserStatus::Orphan),
            ]
        );
        assert_eq!(report[0].email.as_deref(), Some("alice@example.com"));
        assert_eq!(report[2].email, None);
    }

    #[test]
    fn presentation_sorts_by_severity_then_email() {
        let tmp = tempfile::tempdir().unwrap();
        let store = handle(&tmp);
        let layout = store.layout();
        // two actives with emails sorting bob-before-alice reversed
        for uuid in ["aaa", "bbb"] {
            fs::write(layout.public_key_path(uuid), "x").unwrap();
            fs::write(layout.wrapped_key_path(uuid), "x").unwrap();
        }
        let report = user_report(&store).unwrap();
        assert_eq!(report[0].uuid, "aaa"); // alice@ sorts first
        assert_eq!(report[1].uuid, "bbb");
    }

    #[test]
    fn file_pairing_statuses() {
        let tmp = tempfile::tempdir().unwrap();
        let store = handle(&tmp);
        let root = store.layout().root().to_path_buf();

        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        // current: ciphertext newer
        fs::write(root.join(".env"), "a").unwrap();
        fs::write(root.join(".env.kanuka"), "a").unwrap();
        set_mtime(&root.join(".env"), base);
        set_mtime(&root.join(".env.kanuka"), base + Duration::from_secs(5));
        // stale: plaintext newer
        fs::write(root.join("stale.env"), "a").unwrap();
        fs::write(root.join("stale.env.kanuka"), "a").unwrap();
        set_mtime(&root.join("stale.env"), base + Duration::from_secs(5));
        set_mtime(&root.join("stale.env.kanuka"), base);
        // unencrypted and encrypted-only
        fs::write(root.join("new.env"), "a").unwrap();
        fs::write(root.join("old.env.kanuka"), "a").unwrap();

        let report = file_report(&store).unwrap();
        let status_of = |name: &str| {
            report
                .iter()
                .find(|f| f.ciphertext.ends_with(format!("{name}.kanuka")) )
                .map(|f| f.status)
                .unwrap()
        };
        assert_eq!(status_of(".env"), FileStatus::Current);
        assert_eq!(status_of("stale.env"), FileStatus::Stale);
        assert_eq!(status_of("new.env"), FileStatus::Unencrypted);
        assert_eq!(status_of("old.env"), FileStatus::EncryptedOnly);
    }

    #[test]
    fn equal_mtime_is_current() {
        let tmp = tempfile::tempdir().unwrap();
        let store = handle(&tmp);
        let root = store.layout().root().to_path_buf();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::write(root.join(".env"), "a").unwrap();
        fs::write(root.join(".env.kanuka"), "a").unwrap();
        set_mtime(&root.join(".env"), base);
        set_mtime(&root.join(".env.kanuka"), base);

        let report = file_report(&store).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].status, FileStatus::Current);
    }

    #[test]
    fn sibling_naming() {
        assert_eq!(
            sibling_ciphertext(Path::new("a/.env")),
            Path::new("a/.env.kanuka")
        );
        assert_eq!(
            sibling_plaintext(Path::new("a/.env.production.kanuka")),
            Path::new("a/.env.production")
        );
    }
}
