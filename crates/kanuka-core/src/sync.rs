//! Key rotation and re-encryption.
//!
//! Sync rotates the project symmetric key and re-encrypts every ciphertext
//! under it. Revoke and plain sync are the same operation with different
//! exclusion sets. All reads, decryptions, and wrappings complete before the
//! first byte is written; the commit phase performs only atomic per-file
//! renames, in a fixed order: key wrappings, ciphertexts, then deletion of
//! excluded wrappings.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use rsa::RsaPrivateKey;

use crate::cipher;
use crate::error::{Error, Result};
use crate::keycodec;
use crate::layout::write_atomic;
use crate::resolver::{self, FileKind};
use crate::secret::SymmetricKey;
use crate::store::{CancelFlag, StoreHandle};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// UUIDs losing access: skipped when rewrapping, their wrappings deleted.
    pub exclude_uuids: BTreeSet<String>,
    pub dry_run: bool,
}

/// What a sync did, or would do under `dry_run`. Dry-run and real run
/// produce identical reports.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub active_uuids: Vec<String>,
    pub files: Vec<PathBuf>,
    pub removed_uuids: Vec<String>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn users_count(&self) -> usize {
        self.active_uuids.len()
    }

    pub fn files_count(&self) -> usize {
        self.files.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed_uuids.len()
    }
}

/// Rotate the project key and re-encrypt everything it protects.
///
/// Failure before the commit phase leaves the store untouched. A failure
/// after the first committed write surfaces as `SyncPartial` and performs no
/// rollback; a re-run once the cause is fixed converges the store.
pub fn rotate_project_key(
    store: &StoreHandle,
    private_key: &RsaPrivateKey,
    opts: &SyncOptions,
    cancel: &CancelFlag,
) -> Result<SyncReport> {
    // 1. validate: the active set is everyone with a public key, minus the
    //    exclusions. An empty active set would brick the store.
    let caller = store.caller_uuid_with_access()?;
    let mut active = store.layout().list_public_key_uuids()?;
    active.sort();
    active.retain(|uuid| !opts.exclude_uuids.contains(uuid));
    if active.is_empty() {
        return Err(Error::UserNotFound(
            "no active users would remain after this operation".into(),
        ));
    }

    // 2. unwrap the current project key with the caller's private key
    let wrapped = fs::read(store.layout().wrapped_key_path(&caller))?;
    let old_key = keycodec::unwrap_project_key(private_key, &wrapped)?;

    // 3. decrypt every ciphertext into memory; any failure aborts before
    //    anything is written
    let files = resolver::scan(store.layout().root(), FileKind::Ciphertext)?;
    let mut plaintexts = Vec::with_capacity(files.len());
    for path in &files {
        let sealed = fs::read(path)?;
        plaintexts.push(cipher::open(&old_key, &sealed, path)?);
    }

    // 4. fresh key
    let new_key = SymmetricKey::generate();

    // 5. rewrap for the active set
    let mut wrappings = Vec::with_capacity(active.len());
    for uuid in &active {
        let pub_path = store.layout().public_key_path(uuid);
        let pem = fs::read_to_string(&pub_path)
            .map_err(|_| Error::PublicKeyNotFound(uuid.clone()))?;
        let public = keycodec::parse_public_key(&pem)?;
        wrappings.push((uuid.clone(), keycodec::wrap_project_key(&public, &new_key)?));
    }

    // 6. reseal every file under the new key, fresh nonces
    let mut resealed = Vec::with_capacity(files.len());
    for (path, plaintext) in files.iter().zip(&plaintexts) {
        resealed.push((path.clone(), cipher::seal(&new_key, plaintext)));
    }
    drop(plaintexts);

    let removed_uuids: Vec<String> = opts
        .exclude_uuids
        .iter()
        .filter(|uuid| store.layout().wrapped_key_path(uuid).is_file())
        .cloned()
        .collect();
    let report = SyncReport {
        active_uuids: active,
        files,
        removed_uuids,
        dry_run: opts.dry_run,
    };

    // read phase over; cancellation here must leave the store untouched
    cancel.check()?;
    if opts.dry_run {
        return Ok(report);
    }

    // 7a + 7b: commit wrappings, then ciphertexts
    let mut written = 0usize;
    let outcome: Result<()> = (|| {
        for (uuid, blob) in &wrappings {
            write_atomic(&store.layout().wrapped_key_path(uuid), blob, 0o600)?;
            written += 1;
        }
        for (path, sealed) in &resealed {
            write_atomic(path, sealed, 0o644)?;
            written += 1;
        }
        Ok(())
    })();
    if let Err(source) = outcome {
        return Err(if written == 0 {
            source
        } else {
            Error::SyncPartial {
                written,
                source: Box::new(source),
            }
        });
    }

    // 7c: drop excluded wrappings; failures are recorded, not fatal
    for uuid in &report.removed_uuids {
        if let Err(err) = fs::remove_file(store.layout().wrapped_key_path(uuid)) {
            tracing::warn!(%uuid, %err, "failed to delete excluded wrapping");
        }
    }

    tracing::info!(
        users = report.users_count(),
        files = report.files_count(),
        removed = report.removed_count(),
        "project key rotated"
    );
    Ok(report)
}
