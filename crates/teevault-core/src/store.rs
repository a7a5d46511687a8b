//! Atomic persistence of the envelope.
//!
//! One file per vault: `<state_dir>/<vault_dir>/vault.enc`. Writes go to
//! `vault.enc.tmp` in the same directory, are flushed to disk, then
//! renamed over the target. A crash before the rename leaves the prior
//! file untouched; a crash after leaves the new file durable.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::envelope::{Envelope, ENVELOPE_VERSION};
use crate::error::{VaultError, VaultResult};
use crate::harden;

/// Envelope file name inside the vault directory.
pub const VAULT_FILE: &str = "vault.enc";
const VAULT_TMP_FILE: &str = "vault.enc.tmp";

/// Handle on a vault directory.
#[derive(Debug, Clone)]
pub struct VaultStore {
    dir: PathBuf,
}

/// Decoded first to reject foreign format versions before the full
/// (stricter) entry decode runs.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Decoded second: an identifier outside the closed backend set is
/// `UnsupportedBackend`, not a generic decode failure.
#[derive(Deserialize)]
struct BackendProbe {
    metadata: MetadataProbe,
}

#[derive(Deserialize)]
struct MetadataProbe {
    backend: String,
}

impl VaultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Create the vault directory (owner-only) if it is missing.
    pub async fn ensure_dir(&self) -> VaultResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        harden::secure_dir_permissions(&self.dir)?;
        Ok(())
    }

    /// Read and decode the envelope. The HMAC is NOT verified here;
    /// that is the unlock path's job, once a VMK is available.
    pub async fn read_vault(&self) -> VaultResult<Envelope> {
        let path = self.path();
        let bytes = tokio::fs::read(&path).await?;

        let probe: VersionProbe = serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::Corrupted(format!("envelope decode: {e}")))?;
        if probe.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(probe.version));
        }

        let probe: BackendProbe = serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::Corrupted(format!("envelope decode: {e}")))?;
        crate::backend::BackendKind::parse(&probe.metadata.backend)?;

        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|e| VaultError::Corrupted(format!("envelope decode: {e}")))?;
        debug!(path = %path.display(), entries = envelope.entries.len(), "read vault envelope");
        Ok(envelope)
    }

    /// Serialize and atomically replace the envelope file.
    pub async fn write_vault(&self, envelope: &Envelope) -> VaultResult<()> {
        let bytes = serde_json::to_vec_pretty(envelope).map_err(std::io::Error::from)?;

        let tmp = self.dir.join(VAULT_TMP_FILE);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        harden::secure_file_permissions(&tmp)?;
        tokio::fs::rename(&tmp, self.path()).await?;
        debug!(path = %self.path().display(), entries = envelope.entries.len(), "wrote vault envelope");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::envelope;
    use crate::keys::Vmk;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path().join("vault"));
        store.ensure_dir().await.unwrap();

        let vmk = Vmk::generate().unwrap();
        let env = envelope::Envelope::create(BackendKind::OpensslPbkdf2, "sealed".into(), &vmk);
        store.write_vault(&env).await.unwrap();

        let back = store.read_vault().await.unwrap();
        assert_eq!(env, back);
        assert!(!store.dir().join(VAULT_TMP_FILE).exists());
    }

    #[tokio::test]
    async fn foreign_version_is_rejected_before_full_decode() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        tokio::fs::write(store.path(), br#"{"version": 2, "anything": "goes"}"#)
            .await
            .unwrap();
        let err = store.read_vault().await.unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedVersion(2)));
    }

    #[tokio::test]
    async fn unknown_backend_identifier_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        tokio::fs::write(
            store.path(),
            br#"{"version": 1, "metadata": {"backend": "keychain"}}"#,
        )
        .await
        .unwrap();
        let err = store.read_vault().await.unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedBackend(s) if s == "keychain"));
    }

    #[tokio::test]
    async fn garbage_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        tokio::fs::write(store.path(), b"not json at all")
            .await
            .unwrap();
        let err = store.read_vault().await.unwrap_err();
        assert!(matches!(err, VaultError::Corrupted(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path());
        let err = store.read_vault().await.unwrap_err();
        assert!(matches!(err, VaultError::IoFailure(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn envelope_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = VaultStore::new(dir.path().join("vault"));
        store.ensure_dir().await.unwrap();

        let vmk = Vmk::generate().unwrap();
        let env = envelope::Envelope::create(BackendKind::OpensslPbkdf2, "sealed".into(), &vmk);
        store.write_vault(&env).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(store.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
