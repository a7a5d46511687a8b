//! Passphrase sealing of the VMK, the reference backend.
//!
//! No hardware assumed: a wrapping key is stretched out of the
//! passphrase with PBKDF2-HMAC-SHA256 (600k iterations, the OWASP
//! figure for this construction) and the VMK is sealed under it with
//! AES-256-GCM. The sealed blob is self-contained:
//!
//! ```text
//! salt (32) || iv (12) || ciphertext (32) || tag (16)   = 92 bytes
//! ```

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::backend::{BackendKind, KeyBackend};
use crate::error::{VaultError, VaultResult};
use crate::keys::{Vmk, VMK_LEN};
use crate::primitives::{self, AEAD_IV_LEN, AEAD_TAG_LEN};

/// PBKDF2-HMAC-SHA256 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 600_000;
/// Salt length for passphrase derivation.
pub const SALT_LEN: usize = 32;
/// Derived wrapping-key length.
pub const DERIVED_KEY_LEN: usize = 32;
/// Exact sealed-blob length: salt || iv || ciphertext || tag.
pub const SEALED_BLOB_LEN: usize = SALT_LEN + AEAD_IV_LEN + VMK_LEN + AEAD_TAG_LEN;

/// Stretch `passphrase` with the stored (or freshly drawn) salt.
/// The returned key zeroizes when it leaves scope.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8; SALT_LEN],
) -> Zeroizing<[u8; DERIVED_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut *key);
    key
}

/// Seal the VMK under `passphrase` with a fresh salt and IV.
pub fn seal_vmk(vmk: &Vmk, passphrase: &str) -> VaultResult<[u8; SEALED_BLOB_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt)
        .map_err(|e| VaultError::PrimitiveFailure(format!("os rng unavailable: {e}")))?;

    let key = derive_key(passphrase, &salt);
    let sealed = primitives::aead_encrypt(&*key, vmk.expose())?;

    let mut blob = [0u8; SEALED_BLOB_LEN];
    blob[..SALT_LEN].copy_from_slice(&salt);
    blob[SALT_LEN..SALT_LEN + AEAD_IV_LEN].copy_from_slice(&sealed.iv);
    blob[SALT_LEN + AEAD_IV_LEN..SALT_LEN + AEAD_IV_LEN + VMK_LEN]
        .copy_from_slice(&sealed.ciphertext);
    blob[SALT_LEN + AEAD_IV_LEN + VMK_LEN..].copy_from_slice(&sealed.tag);
    Ok(blob)
}

/// Unseal a [`seal_vmk`] blob. Wrong passphrase and tampering are
/// indistinguishable; both surface as [`VaultError::IntegrityFailure`].
pub fn unseal_vmk(blob: &[u8], passphrase: &str) -> VaultResult<Vmk> {
    if blob.len() != SEALED_BLOB_LEN {
        return Err(VaultError::Corrupted(format!(
            "sealed VMK blob must be {SEALED_BLOB_LEN} bytes, got {}",
            blob.len()
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&blob[..SALT_LEN]);
    let mut iv = [0u8; AEAD_IV_LEN];
    iv.copy_from_slice(&blob[SALT_LEN..SALT_LEN + AEAD_IV_LEN]);
    let ciphertext = &blob[SALT_LEN + AEAD_IV_LEN..SALT_LEN + AEAD_IV_LEN + VMK_LEN];
    let mut tag = [0u8; AEAD_TAG_LEN];
    tag.copy_from_slice(&blob[SALT_LEN + AEAD_IV_LEN + VMK_LEN..]);

    let key = derive_key(passphrase, &salt);
    let pt = primitives::aead_decrypt(&*key, &iv, ciphertext, &tag)?;

    let mut vmk_bytes = [0u8; VMK_LEN];
    vmk_bytes.copy_from_slice(&pt);
    Ok(Vmk::from_bytes(&mut vmk_bytes))
}

/// The `openssl-pbkdf2` backend: passphrase-only sealing.
pub struct PassphraseBackend {
    passphrase: SecretString,
}

impl PassphraseBackend {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: SecretString::new(passphrase.into()),
        }
    }
}

impl KeyBackend for PassphraseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::OpensslPbkdf2
    }

    fn seal(&self, vmk: &Vmk) -> VaultResult<String> {
        use base64::{engine::general_purpose, Engine as _};
        let blob = seal_vmk(vmk, self.passphrase.expose_secret())?;
        Ok(general_purpose::STANDARD.encode(blob))
    }

    fn unseal(&self, sealed: &str) -> VaultResult<Vmk> {
        use base64::{engine::general_purpose, Engine as _};
        let blob = general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| VaultError::Corrupted("sealed VMK is not valid base64".into()))?;
        unseal_vmk(&blob, self.passphrase.expose_secret())
    }
}
