//! The vault facade: ties the envelope store, the unlocked-state
//! holder, the active key backend, and the audit sink together.
//!
//! Mutating operations are read-modify-write: the envelope on disk is
//! read, transformed by the pure ops, and atomically rewritten. The
//! authoritative envelope is whatever the latest successful atomic
//! write produced. Concurrent mutation of the same vault file is the
//! caller's problem; this layer adds no file locking.

use std::sync::Arc;

use tracing::info;
use zeroize::Zeroizing;

use crate::audit::{AuditAction, AuditEvent, AuditSink, NullSink};
use crate::backend::KeyBackend;
use crate::config::VaultConfig;
use crate::envelope::{verify_entries_hmac, Envelope, EntryType};
use crate::error::{VaultError, VaultResult};
use crate::harden;
use crate::keys::Vmk;
use crate::ops::{self, EntryFilter, EntryInfo, NewEntry};
use crate::session::VaultSession;
use crate::store::VaultStore;

pub struct Vault {
    store: VaultStore,
    session: VaultSession,
    backend: Arc<dyn KeyBackend>,
    audit: Arc<dyn AuditSink>,
}

impl Vault {
    /// Bind to a vault directory without touching the disk.
    pub fn open(config: &VaultConfig, backend: Arc<dyn KeyBackend>) -> Self {
        Self {
            store: VaultStore::new(config.vault_path()),
            session: VaultSession::new(config.auto_lock_timeout_ms),
            backend,
            audit: Arc::new(NullSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Create a new vault: owner-only directory, fresh VMK sealed by the
    /// backend, empty envelope on disk. Leaves the vault unlocked.
    pub async fn init(config: &VaultConfig, backend: Arc<dyn KeyBackend>) -> VaultResult<Self> {
        let vault = Self::open(config, backend);
        let result = vault.init_inner().await;
        vault.report(AuditAction::Init, None, None, &result);
        result.map(|()| vault)
    }

    async fn init_inner(&self) -> VaultResult<()> {
        harden::disable_core_dumps().ok();
        if self.store.exists() {
            return Err(VaultError::InvalidArgument(format!(
                "a vault already exists at {}",
                self.store.path().display()
            )));
        }
        self.store.ensure_dir().await?;

        let vmk = Vmk::generate()?;
        let sealed = self.backend.seal(&vmk)?;
        let envelope = Envelope::create(self.backend.kind(), sealed, &vmk);
        self.store.write_vault(&envelope).await?;
        self.session.unlock(vmk, self.backend.kind());
        info!(path = %self.store.path().display(), backend = %self.backend.kind(), "initialized vault");
        Ok(())
    }

    /// Unseal the VMK, verify the envelope HMAC in constant time, and
    /// populate the unlocked state. An integrity failure forcibly locks.
    pub async fn unlock(&self) -> VaultResult<()> {
        let result = self.unlock_inner().await;
        self.report(AuditAction::Unlock, None, None, &result);
        result
    }

    async fn unlock_inner(&self) -> VaultResult<()> {
        harden::disable_core_dumps().ok();
        let envelope = self.store.read_vault().await?;
        if envelope.metadata.backend != self.backend.kind() {
            return Err(VaultError::UnsupportedBackend(
                envelope.metadata.backend.as_str().to_string(),
            ));
        }

        let vmk = self.backend.unseal(&envelope.sealed_vmk)?;
        if let Err(e) = verify_entries_hmac(&vmk, &envelope) {
            self.session.lock();
            return Err(e);
        }
        self.session.unlock(vmk, self.backend.kind());
        Ok(())
    }

    /// Scrub the VMK and drop the unlocked state.
    pub fn lock(&self) {
        self.session.lock();
        self.audit.append(AuditEvent::new(AuditAction::Lock, true));
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    pub fn set_auto_lock_timeout(&self, timeout_ms: u64) {
        self.session.set_auto_lock_timeout(timeout_ms);
    }

    pub fn session(&self) -> &VaultSession {
        &self.session
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    pub async fn add_entry(&self, new: NewEntry) -> VaultResult<EntryInfo> {
        let label = new.label.clone();
        let entry_type = new.entry_type;
        let result = self.add_entry_inner(new).await;
        self.report(AuditAction::AddEntry, Some(&label), Some(entry_type), &result);
        result
    }

    async fn add_entry_inner(&self, new: NewEntry) -> VaultResult<EntryInfo> {
        let envelope = self.store.read_vault().await?;
        let (envelope, info) = self
            .session
            .with_vmk(|vmk| ops::add_entry(&envelope, vmk, new))??;
        self.store.write_vault(&envelope).await?;
        Ok(info)
    }

    /// Decrypt one entry's payload. The returned bytes zeroize when
    /// dropped; the caller decides how long they live.
    pub async fn retrieve(&self, label: &str) -> VaultResult<(EntryInfo, Zeroizing<Vec<u8>>)> {
        let result = self.retrieve_inner(label).await;
        let entry_type = result.as_ref().ok().map(|(info, _)| info.entry_type);
        self.report(AuditAction::RetrieveEntry, Some(label), entry_type, &result);
        result
    }

    async fn retrieve_inner(&self, label: &str) -> VaultResult<(EntryInfo, Zeroizing<Vec<u8>>)> {
        let envelope = self.store.read_vault().await?;
        self.session
            .with_vmk(|vmk| ops::retrieve_entry(&envelope, vmk, label))?
    }

    /// Metadata listing. Works on a locked vault; nothing here needs the
    /// VMK and no key material is returned.
    pub async fn list(&self, filter: &EntryFilter) -> VaultResult<Vec<EntryInfo>> {
        let envelope = self.store.read_vault().await?;
        Ok(ops::list_entries(&envelope, filter))
    }

    pub async fn delete(&self, label: &str) -> VaultResult<()> {
        let result = self.delete_inner(label).await;
        self.report(AuditAction::DeleteEntry, Some(label), None, &result);
        result
    }

    async fn delete_inner(&self, label: &str) -> VaultResult<()> {
        let envelope = self.store.read_vault().await?;
        let envelope = self
            .session
            .with_vmk(|vmk| ops::delete_entry(&envelope, vmk, label))??;
        self.store.write_vault(&envelope).await
    }

    pub async fn rotate_entry(&self, label: &str) -> VaultResult<()> {
        let result = self.rotate_entry_inner(label).await;
        self.report(AuditAction::RotateEntry, Some(label), None, &result);
        result
    }

    async fn rotate_entry_inner(&self, label: &str) -> VaultResult<()> {
        let envelope = self.store.read_vault().await?;
        let envelope = self
            .session
            .with_vmk(|vmk| ops::rotate_entry(&envelope, vmk, label))??;
        self.store.write_vault(&envelope).await
    }

    /// Generate a fresh VMK, re-key every sealed entry, re-seal the new
    /// VMK with the active backend, and swap the unlocked state over to
    /// the new key. The old VMK is scrubbed by the swap.
    pub async fn rotate_master(&self) -> VaultResult<()> {
        let result = self.rotate_master_inner().await;
        self.report(AuditAction::RotateMaster, None, None, &result);
        result
    }

    async fn rotate_master_inner(&self) -> VaultResult<()> {
        let envelope = self.store.read_vault().await?;
        let new_vmk = Vmk::generate()?;
        let resealed = self.backend.seal(&new_vmk)?;
        let rotated = self
            .session
            .with_vmk(|old_vmk| ops::rotate_master(&envelope, old_vmk, &new_vmk, resealed))??;
        self.store.write_vault(&rotated).await?;
        self.session.unlock(new_vmk, self.backend.kind());
        info!(vmk_version = rotated.metadata.vmk_version, "rotated vault master key");
        Ok(())
    }

    fn report<T>(
        &self,
        action: AuditAction,
        label: Option<&str>,
        entry_type: Option<EntryType>,
        result: &VaultResult<T>,
    ) {
        let mut event = AuditEvent::new(action, result.is_ok());
        if let Some(label) = label {
            event = event.with_label(label);
        }
        if let Some(entry_type) = entry_type {
            event = event.with_entry_type(entry_type);
        }
        if let Err(e) = result {
            event = event.with_error(e.to_string());
        }
        self.audit.append(event);
    }
}
