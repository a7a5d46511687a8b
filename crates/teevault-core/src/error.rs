use std::io;

use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

/// Every failure the core surfaces to callers.
///
/// Wrong-key and tampered-ciphertext AEAD failures are deliberately
/// indistinguishable: both surface as [`VaultError::IntegrityFailure`].
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no entry with label '{0}'")]
    NotFound(String),
    #[error("an entry with label '{0}' already exists")]
    DuplicateLabel(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("vault file is corrupted: {0}")]
    Corrupted(String),
    #[error("unsupported vault format version {0}")]
    UnsupportedVersion(u32),
    #[error("unsupported backend '{0}'")]
    UnsupportedBackend(String),
    #[error("integrity verification failed")]
    IntegrityFailure,
    #[error("authentication failed")]
    AuthenticationFailure,
    #[error("entry '{0}' is resident in a hardware module")]
    HardwareResident(String),
    #[error("hardware module unavailable")]
    HardwareUnavailable,
    #[error("vault is locked")]
    Locked,
    #[error("cryptographic primitive failure: {0}")]
    PrimitiveFailure(String),
    #[error("vault i/o failure: {0}")]
    IoFailure(#[from] io::Error),
}
