//! Status classification, orphan cleanup, and dry-run guarantees.

mod common;

use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use common::{init_as_alice, layout, open, register_member, snapshot};
use kanuka_core::workflows::{self, FileOpOptions, KeySource, RevokeSelector};
use kanuka_core::{CancelFlag, FileStatus, UserStatus};

fn set_mtime(path: &std::path::Path, t: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(t)
        .unwrap();
}

/// Orphan cleanup: a wrapping without a public key is reported, listed by a
/// dry-run, deleted by clean, and gone on the second pass.
#[test]
fn orphan_is_reported_cleaned_and_stays_gone() {
    let team = init_as_alice();
    let carol = register_member(&team, "carol@example.com");
    fs::remove_file(layout(&team).public_key_path(&carol.uuid)).unwrap();

    let store = open(&team);
    let status = workflows::status(&store).unwrap();
    let orphans: Vec<_> = status
        .users
        .iter()
        .filter(|u| u.status == UserStatus::Orphan)
        .collect();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].uuid, carol.uuid);

    let dry = workflows::clean(&store, true).unwrap();
    assert_eq!(dry.removed, vec![carol.uuid.clone()]);
    assert!(layout(&team).wrapped_key_path(&carol.uuid).is_file());

    let real = workflows::clean(&store, false).unwrap();
    assert_eq!(real.removed, dry.removed);
    assert!(!layout(&team).wrapped_key_path(&carol.uuid).exists());

    let again = workflows::clean(&store, false).unwrap();
    assert!(again.removed.is_empty());
}

/// Stale detection: touching the plaintext flips the pair to stale, and
/// re-encrypting restores current.
#[test]
fn stale_flips_back_to_current_after_encrypt() {
    let team = init_as_alice();
    fs::write(team.root.join(".env"), "SECRET=foo\n").unwrap();
    let store = open(&team);
    workflows::encrypt(
        &store,
        &FileOpOptions::default(),
        &KeySource::Default,
        None,
        &CancelFlag::new(),
    )
    .unwrap();

    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    set_mtime(&team.root.join(".env.kanuka"), base);
    set_mtime(&team.root.join(".env"), base + Duration::from_secs(30));

    let status = workflows::status(&store).unwrap();
    assert_eq!(status.files.len(), 1);
    assert_eq!(status.files[0].status, FileStatus::Stale);

    workflows::encrypt(
        &store,
        &FileOpOptions::default(),
        &KeySource::Default,
        None,
        &CancelFlag::new(),
    )
    .unwrap();
    let status = workflows::status(&store).unwrap();
    assert_eq!(status.files[0].status, FileStatus::Current);
}

/// A member with a public key but no wrapping is pending until registered.
#[test]
fn unregistered_device_shows_pending() {
    let team = init_as_alice();
    let (_, public) = kanuka_core::keycodec::generate_keypair().unwrap();
    let uuid = "cccccccc-cccc-4ccc-8ccc-cccccccccccc";
    fs::write(
        layout(&team).public_key_path(uuid),
        kanuka_core::keycodec::public_key_pem(&public).unwrap(),
    )
    .unwrap();

    let store = open(&team);
    let status = workflows::status(&store).unwrap();
    let entry = status.users.iter().find(|u| u.uuid == uuid).unwrap();
    assert_eq!(entry.status, UserStatus::Pending);
    // severity order: active rows come first
    assert_eq!(status.users[0].status, UserStatus::Active);
}

/// Dry-runs of every mutating workflow return the real report and leave the
/// tree byte-identical.
#[test]
fn dry_runs_leave_the_tree_byte_identical() {
    let team = init_as_alice();
    let bob = register_member(&team, "bob@example.com");
    fs::write(team.root.join(".env"), "SECRET=foo\n").unwrap();
    {
        let store = open(&team);
        workflows::encrypt(
            &store,
            &FileOpOptions::default(),
            &KeySource::Default,
            None,
            &CancelFlag::new(),
        )
        .unwrap();
    }
    fs::write(team.root.join("new.env"), "MORE=bar\n").unwrap();
    let before = snapshot(&team.root);

    let mut store = open(&team);

    let encrypt_dry = workflows::encrypt(
        &store,
        &FileOpOptions {
            patterns: vec![],
            dry_run: true,
        },
        &KeySource::Default,
        None,
        &CancelFlag::new(),
    )
    .unwrap();
    assert!(encrypt_dry.files.iter().any(|p| p.ends_with("new.env")));

    let sync_dry =
        workflows::sync(&store, true, &KeySource::Default, None, &CancelFlag::new()).unwrap();
    assert_eq!(sync_dry.users_count(), 2);
    assert_eq!(sync_dry.files_count(), 1);

    let revoke_dry = workflows::revoke(
        &mut store,
        &RevokeSelector::Email {
            email: "bob@example.com".into(),
            device: None,
        },
        true,
        &KeySource::Default,
        None,
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(revoke_dry.revoked, vec![bob.uuid.clone()]);
    assert_eq!(revoke_dry.removed_wrappings, vec![bob.uuid.clone()]);

    let clean_dry = workflows::clean(&store, true).unwrap();
    assert!(clean_dry.removed.is_empty());
    drop(store);

    assert_eq!(snapshot(&team.root), before);

    // the dry revoke predicted exactly what the real one removes
    let mut store = open(&team);
    let revoke_real = workflows::revoke(
        &mut store,
        &RevokeSelector::Email {
            email: "bob@example.com".into(),
            device: None,
        },
        false,
        &KeySource::Default,
        None,
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(revoke_real.revoked, revoke_dry.revoked);
    assert_eq!(revoke_real.removed_wrappings, revoke_dry.removed_wrappings);
    assert_eq!(revoke_real.active_uuids, revoke_dry.active_uuids);
}
