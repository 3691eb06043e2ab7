//! Kanuka core: the access-control and re-encryption engine behind the CLI.
//!
//! A project holds one 256-bit symmetric key. Every secret file is sealed
//! under it with XSalsa20-Poly1305; the key itself is stored once per device
//! as an RSA wrapping in the project's store directory. Membership changes
//! rotate the key and re-encrypt everything, atomically enough that a store
//! is never left half old-key, half new-key.

pub mod access;
pub mod audit;
pub mod cipher;
pub mod config;
pub mod error;
pub mod keycodec;
pub mod layout;
pub mod resolver;
pub mod secret;
pub mod store;
pub mod sync;
pub mod workflows;

pub use access::{FileState, FileStatus, UserAccess, UserStatus};
pub use config::UserDirs;
pub use error::{Error, Result};
pub use keycodec::{Passphrase, PrivateKeyFormat};
pub use secret::SymmetricKey;
pub use store::{CancelFlag, StoreHandle};
pub use sync::{SyncOptions, SyncReport};
pub use workflows::{
    CleanReport, CreateOptions, FileOpOptions, FileOpReport, InitOptions, InitReport, KeySource,
    RegisterTarget, RevokeSelector, StatusReport,
};
