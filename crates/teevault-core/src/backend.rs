//! Key-protection backends: pluggable seal/unseal of the VMK at rest.
//!
//! The envelope records which backend sealed it as a closed-set string
//! tag; unlock dispatches on that tag. Only the passphrase backend ships
//! in this crate. Platform transports (DPAPI, TPM, PKCS#11) live with
//! their collaborators and plug in through [`KeyBackend`].

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{VaultError, VaultResult};
use crate::keys::Vmk;

/// Recognized backend identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "yubihsm")]
    YubiHsm,
    #[serde(rename = "dpapi+tpm")]
    DpapiTpm,
    #[serde(rename = "dpapi")]
    Dpapi,
    #[serde(rename = "openssl-pbkdf2")]
    OpensslPbkdf2,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::YubiHsm => "yubihsm",
            BackendKind::DpapiTpm => "dpapi+tpm",
            BackendKind::Dpapi => "dpapi",
            BackendKind::OpensslPbkdf2 => "openssl-pbkdf2",
        }
    }

    /// Parse a backend identifier; anything outside the closed set is
    /// [`VaultError::UnsupportedBackend`].
    pub fn parse(s: &str) -> VaultResult<Self> {
        match s {
            "yubihsm" => Ok(BackendKind::YubiHsm),
            "dpapi+tpm" => Ok(BackendKind::DpapiTpm),
            "dpapi" => Ok(BackendKind::Dpapi),
            "openssl-pbkdf2" => Ok(BackendKind::OpensslPbkdf2),
            other => Err(VaultError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seal/unseal of the VMK behind a platform mechanism.
///
/// `seal` returns an opaque textual blob safe to store in the envelope's
/// `sealedVmk` field; its layout is backend-private. `unseal` returns a
/// fresh owned [`Vmk`] or fails with [`VaultError::AuthenticationFailure`]
/// (wrong passphrase / device auth), [`VaultError::HardwareUnavailable`]
/// (missing device), or [`VaultError::IntegrityFailure`] (tamper).
pub trait KeyBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn seal(&self, vmk: &Vmk) -> VaultResult<String>;
    fn unseal(&self, sealed: &str) -> VaultResult<Vmk>;
}

/// Contract for the external hardware module that owns the key material
/// of hardware-resident entries. The vault stores only the object id;
/// callers route retrieval and deletion of such entries through an
/// implementation of this trait.
pub trait HsmAdapter: Send + Sync {
    /// Import secret material into the module; returns the object id to
    /// record on the vault entry.
    fn import_object(&self, label: &str, value: &[u8]) -> VaultResult<String>;
    /// Fetch material for an object id, if the module permits export.
    fn fetch_object(&self, object_id: &str) -> VaultResult<Zeroizing<Vec<u8>>>;
    /// Destroy the object inside the module.
    fn delete_object(&self, object_id: &str) -> VaultResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_round_trip() {
        for kind in [
            BackendKind::YubiHsm,
            BackendKind::DpapiTpm,
            BackendKind::Dpapi,
            BackendKind::OpensslPbkdf2,
        ] {
            assert_eq!(BackendKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = BackendKind::parse("keychain").unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedBackend(s) if s == "keychain"));
    }
}
