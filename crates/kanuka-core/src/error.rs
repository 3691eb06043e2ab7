use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the whole crate.
///
/// Kinds are stable: callers branch on the variant, only the CLI renders
/// messages. Contextual detail rides inside the variant so wrapping never
/// changes the kind.
#[derive(Debug, Error)]
pub enum Error {
    // State
    #[error("not a kanuka project (no .kanuka directory found)")]
    ProjectNotInitialized,
    #[error("project already initialized at {}", .0.display())]
    ProjectAlreadyInitialized(PathBuf),
    #[error("invalid project config: {0}")]
    InvalidProjectConfig(String),

    // Access
    #[error("you do not have access to this project's secrets")]
    NoAccess,
    #[error("private key not found at {}", .0.display())]
    PrivateKeyNotFound(PathBuf),
    #[error("public key not found for {0}")]
    PublicKeyNotFound(String),
    #[error("could not decrypt the project key with this private key")]
    KeyDecryptFailed,
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("private key is encrypted and no terminal is available to prompt for a passphrase")]
    PassphraseRequired,
    #[error("unsupported key type: {0} (only RSA keys are supported)")]
    UnsupportedKeyType(String),

    // Files
    #[error("no matching files found")]
    NoFilesFound,
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("{}: expected {expected}", path.display())]
    InvalidFileType { path: PathBuf, expected: &'static str },
    #[error("invalid archive: {0}")]
    InvalidArchive(String),
    #[error("failed to decrypt {}: authentication failed (wrong key or corrupted file)", .0.display())]
    FileDecryptFailed(PathBuf),

    // Users
    #[error("no user with email {0} in this project")]
    UserNotFound(String),
    #[error("no device named {device} registered for {email}")]
    DeviceNotFound { email: String, device: String },
    #[error("refusing to revoke your own access")]
    SelfRevoke,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("device name {name} is already taken for {email}")]
    DeviceNameTaken { email: String, name: String },
    #[error("{0} already has access to this project")]
    PublicKeyExists(String),

    // Carriers
    #[error("sync partially applied ({written} files written): {source}")]
    SyncPartial {
        written: usize,
        #[source]
        source: Box<Error>,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The kind survives contextual wrapping; a partial sync reports the
    /// kind of its underlying failure.
    pub fn kind(&self) -> &Error {
        match self {
            Error::SyncPartial { source, .. } => source.kind(),
            other => other,
        }
    }
}
