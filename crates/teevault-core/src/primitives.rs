//! Cryptographic primitives every higher layer builds on.
//!
//! AES-256-GCM for authenticated encryption, HKDF-SHA256 for key
//! derivation, HMAC-SHA256 for the envelope integrity tag, the OS CSPRNG
//! for all randomness, and constant-time comparison for anything
//! authentication-relevant. Nonce uniqueness is delegated to
//! [`aead_encrypt`]: every call draws a fresh random 12-byte IV.
//!
//! Nothing in this module performs I/O.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{VaultError, VaultResult};

/// AEAD key length (AES-256).
pub const AEAD_KEY_LEN: usize = 32;
/// AEAD IV length (96-bit GCM nonce).
pub const AEAD_IV_LEN: usize = 12;
/// AEAD authentication tag length.
pub const AEAD_TAG_LEN: usize = 16;
/// HMAC-SHA256 output length.
pub const HMAC_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Ciphertext triple produced by [`aead_encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub iv: [u8; AEAD_IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; AEAD_TAG_LEN],
}

/// Fill `buf` from the OS CSPRNG.
pub fn random_bytes(buf: &mut [u8]) -> VaultResult<()> {
    rand::rngs::OsRng
        .try_fill_bytes(buf)
        .map_err(|e| VaultError::PrimitiveFailure(format!("os rng unavailable: {e}")))
}

/// Fixed-size convenience wrapper over [`random_bytes`].
pub fn random_array<const N: usize>() -> VaultResult<[u8; N]> {
    let mut out = [0u8; N];
    random_bytes(&mut out)?;
    Ok(out)
}

/// HKDF-SHA256: derive `len` bytes bound to `info`.
///
/// An empty `salt` selects the RFC 5869 default (a zeroed hash block).
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> VaultResult<Zeroizing<Vec<u8>>> {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = Zeroizing::new(vec![0u8; len]);
    hk.expand(info, &mut okm)
        .map_err(|_| VaultError::PrimitiveFailure("hkdf output length out of range".into()))?;
    Ok(okm)
}

/// Encrypt `plaintext` under a 32-byte key with a fresh random IV.
///
/// Empty plaintexts are fine: the ciphertext is empty and the tag is
/// still [`AEAD_TAG_LEN`] bytes.
pub fn aead_encrypt(key: &[u8], plaintext: &[u8]) -> VaultResult<SealedBox> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| VaultError::InvalidArgument("AEAD key must be 32 bytes".into()))?;
    let iv = random_array::<AEAD_IV_LEN>()?;
    let mut ct = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| VaultError::PrimitiveFailure("AEAD encrypt failed".into()))?;

    // aes-gcm appends the tag to the ciphertext; split it back out.
    let tag_offset = ct.len() - AEAD_TAG_LEN;
    let mut tag = [0u8; AEAD_TAG_LEN];
    tag.copy_from_slice(&ct[tag_offset..]);
    ct.truncate(tag_offset);

    Ok(SealedBox {
        iv,
        ciphertext: ct,
        tag,
    })
}

/// Decrypt an [`aead_encrypt`] triple. Fails closed: on any
/// authentication failure no plaintext is returned.
pub fn aead_decrypt(
    key: &[u8],
    iv: &[u8; AEAD_IV_LEN],
    ciphertext: &[u8],
    tag: &[u8; AEAD_TAG_LEN],
) -> VaultResult<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| VaultError::InvalidArgument("AEAD key must be 32 bytes".into()))?;

    let mut joined = Zeroizing::new(Vec::with_capacity(ciphertext.len() + AEAD_TAG_LEN));
    joined.extend_from_slice(ciphertext);
    joined.extend_from_slice(tag);

    let pt = cipher
        .decrypt(Nonce::from_slice(iv), joined.as_slice())
        .map_err(|_| VaultError::IntegrityFailure)?;
    Ok(Zeroizing::new(pt))
}

/// HMAC-SHA256 over `data`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_LEN] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    let mut out = [0u8; HMAC_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Constant-time equality: true only for identical length and content.
/// The content comparison does not short-circuit.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Overwrite a buffer with zeros.
pub fn scrub(buf: &mut [u8]) {
    buf.zeroize();
}
