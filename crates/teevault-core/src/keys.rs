//! The two-layer key hierarchy: the Vault Master Key and the per-entry
//! keys derived from it.
//!
//! The VMK is the root secret. It exists in memory only while the vault
//! is open, is owned by exactly one holder at a time, and is scrubbed on
//! lock, rotation, and drop. Per-entry keys are derived on demand with
//! HKDF-SHA256 and live only for the single encrypt or decrypt that
//! needed them.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

use crate::error::VaultResult;
use crate::primitives;

/// Vault Master Key length.
pub const VMK_LEN: usize = 32;
/// Per-entry key length.
pub const EEK_LEN: usize = 32;

/// The Vault Master Key.
///
/// Heap-allocated so moves of the owning value never leave stale copies
/// on the stack. Zeroizes on drop; [`Vmk::scrub`] zeroizes in place for
/// the lock/rotate paths that want the wipe to happen eagerly.
pub struct Vmk(Box<[u8; VMK_LEN]>);

impl Vmk {
    /// Generate a fresh VMK from the OS CSPRNG.
    pub fn generate() -> VaultResult<Self> {
        let mut bytes = Box::new([0u8; VMK_LEN]);
        primitives::random_bytes(bytes.as_mut_slice())?;
        Ok(Self(bytes))
    }

    /// Take ownership of raw key bytes (e.g. from a backend unseal).
    /// The source buffer is scrubbed.
    pub fn from_bytes(bytes: &mut [u8; VMK_LEN]) -> Self {
        let vmk = Self(Box::new(*bytes));
        bytes.zeroize();
        vmk
    }

    /// Borrow the key bytes. The borrow must not escape the caller.
    pub fn expose(&self) -> &[u8; VMK_LEN] {
        &self.0
    }

    /// Overwrite the key bytes with zeros.
    pub fn scrub(&mut self) {
        self.0.zeroize();
    }

    /// True once [`Vmk::scrub`] has run.
    pub fn is_scrubbed(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Drop for Vmk {
    fn drop(&mut self) {
        self.scrub();
    }
}

impl fmt::Debug for Vmk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Vmk(..)")
    }
}

/// Derive the entry encryption key for `(entry_id, version)`.
///
/// `HKDF-SHA256(salt=empty, ikm=VMK, info=id || "||" || decimal(version))`.
/// The returned key zeroizes when it leaves scope.
pub fn derive_entry_key(
    vmk: &Vmk,
    entry_id: &str,
    version: u32,
) -> VaultResult<Zeroizing<[u8; EEK_LEN]>> {
    let info = format!("{entry_id}||{version}");
    let okm = primitives::hkdf_sha256(vmk.expose(), &[], info.as_bytes(), EEK_LEN)?;
    let mut key = Zeroizing::new([0u8; EEK_LEN]);
    key.copy_from_slice(&okm);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_keys_differ_per_version() {
        let vmk = Vmk::generate().unwrap();
        let id = "0c6f2f5e-8e5e-4c85-9d3c-1f2a55f0a001";
        let v1 = derive_entry_key(&vmk, id, 1).unwrap();
        let v2 = derive_entry_key(&vmk, id, 2).unwrap();
        assert_ne!(&*v1, &*v2);
    }

    #[test]
    fn entry_keys_differ_per_id() {
        let vmk = Vmk::generate().unwrap();
        let a = derive_entry_key(&vmk, "entry-a", 1).unwrap();
        let b = derive_entry_key(&vmk, "entry-b", 1).unwrap();
        assert_ne!(&*a, &*b);
    }

    #[test]
    fn entry_key_is_deterministic() {
        let vmk = Vmk::generate().unwrap();
        let a = derive_entry_key(&vmk, "entry", 3).unwrap();
        let b = derive_entry_key(&vmk, "entry", 3).unwrap();
        assert_eq!(&*a, &*b);
    }

    #[test]
    fn version_is_not_ambiguous_with_id_suffix() {
        // "a||1" as id with version 1 must not collide with "a" version 11.
        let vmk = Vmk::generate().unwrap();
        let a = derive_entry_key(&vmk, "a||1", 1).unwrap();
        let b = derive_entry_key(&vmk, "a", 11).unwrap();
        assert_ne!(&*a, &*b);
    }

    #[test]
    fn scrub_zeroes_the_vmk() {
        let mut vmk = Vmk::generate().unwrap();
        assert!(!vmk.is_scrubbed());
        vmk.scrub();
        assert!(vmk.is_scrubbed());
        assert_eq!(vmk.expose(), &[0u8; VMK_LEN]);
    }

    #[test]
    fn from_bytes_scrubs_the_source() {
        let mut raw = [0x42u8; VMK_LEN];
        let vmk = Vmk::from_bytes(&mut raw);
        assert_eq!(raw, [0u8; VMK_LEN]);
        assert_eq!(vmk.expose(), &[0x42u8; VMK_LEN]);
    }
}
