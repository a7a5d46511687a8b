//! Entry and master-key rotation against the on-disk envelope.

use std::sync::Arc;

use anyhow::Result;
use teevault_core::{
    retrieve_entry, Envelope, EntryPayload, EntryType, KeyBackend, NewEntry, PassphraseBackend,
    Vault, VaultConfig, VaultError,
};

fn test_config(dir: &tempfile::TempDir) -> VaultConfig {
    VaultConfig::new(dir.path())
        .with_vault_dir("vault")
        .with_auto_lock_timeout_ms(0)
}

fn passphrase_backend() -> Arc<PassphraseBackend> {
    Arc::new(PassphraseBackend::new("test-pass"))
}

fn entry_iv(envelope: &Envelope, label: &str) -> [u8; 12] {
    let entry = envelope
        .entries
        .iter()
        .find(|e| e.label == label)
        .expect("entry present");
    match &entry.payload {
        EntryPayload::Sealed { iv, .. } => *iv,
        _ => panic!("expected sealed payload"),
    }
}

#[tokio::test]
async fn rotate_entry_preserves_plaintext_under_a_new_iv() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let vault = Vault::init(&config, passphrase_backend()).await?;
    vault
        .add_entry(NewEntry::sealed("r", EntryType::Secret, b"original"))
        .await?;

    let iv_before = entry_iv(&vault.store().read_vault().await?, "r");
    vault.rotate_entry("r").await?;

    let envelope = vault.store().read_vault().await?;
    let iv_after = entry_iv(&envelope, "r");
    assert_ne!(iv_before, iv_after);
    assert_eq!(envelope.entries[0].version, 2);

    let (info, value) = vault.retrieve("r").await?;
    assert_eq!(info.version, 2);
    assert_eq!(&*value, b"original");
    Ok(())
}

#[tokio::test]
async fn rotate_master_rekeys_and_invalidates_the_old_vmk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let vault = Vault::init(&config, passphrase_backend()).await?;
    vault
        .add_entry(NewEntry::sealed("s1", EntryType::Secret, b"val1"))
        .await?;
    vault
        .add_entry(NewEntry::sealed("s2", EntryType::Secret, b"val2"))
        .await?;
    vault.rotate_entry("s2").await?; // push s2 to version 2 pre-rotation

    // Keep the old VMK around, as an attacker holding a stale unseal
    // would: unseal the pre-rotation blob out-of-band.
    let old_envelope = vault.store().read_vault().await?;
    let old_vmk = passphrase_backend().unseal(&old_envelope.sealed_vmk)?;
    assert_eq!(old_envelope.metadata.vmk_version, 1);

    vault.rotate_master().await?;

    // Still unlocked, now under the new key; values unchanged.
    assert!(vault.is_unlocked());
    let (info1, v1) = vault.retrieve("s1").await?;
    let (info2, v2) = vault.retrieve("s2").await?;
    assert_eq!(&*v1, b"val1");
    assert_eq!(&*v2, b"val2");
    assert_eq!(info1.version, 1);
    assert_eq!(info2.version, 1);

    let envelope = vault.store().read_vault().await?;
    assert_eq!(envelope.metadata.vmk_version, 2);
    assert!(envelope.entries.iter().all(|e| e.version == 1));
    assert_ne!(envelope.sealed_vmk, old_envelope.sealed_vmk);

    // The old VMK decrypts nothing anymore.
    for label in ["s1", "s2"] {
        let err = retrieve_entry(&envelope, &old_vmk, label).unwrap_err();
        assert!(matches!(err, VaultError::IntegrityFailure));
    }
    Ok(())
}

#[tokio::test]
async fn reopen_after_master_rotation_uses_the_new_seal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let vault = Vault::init(&config, passphrase_backend()).await?;
    vault
        .add_entry(NewEntry::sealed("k", EntryType::ApiToken, b"tok"))
        .await?;
    vault.rotate_master().await?;
    vault.lock();

    let reopened = Vault::open(&config, passphrase_backend());
    reopened.unlock().await?;
    let (_, value) = reopened.retrieve("k").await?;
    assert_eq!(&*value, b"tok");
    Ok(())
}

#[tokio::test]
async fn hardware_entries_ride_through_master_rotation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(&dir);
    let vault = Vault::init(&config, passphrase_backend()).await?;
    vault
        .add_entry(NewEntry {
            label: "hw".into(),
            entry_type: EntryType::PrivateKey,
            tags: vec![],
            body: teevault_core::NewEntryBody::HsmResident {
                hsm_object_id: "0x2001".into(),
            },
        })
        .await?;
    vault
        .add_entry(NewEntry::sealed("soft", EntryType::Secret, b"v"))
        .await?;

    vault.rotate_master().await?;

    let envelope = vault.store().read_vault().await?;
    let hw = envelope.entries.iter().find(|e| e.label == "hw").unwrap();
    assert!(matches!(
        &hw.payload,
        EntryPayload::HsmResident { hsm_object_id } if hsm_object_id == "0x2001"
    ));
    let (_, value) = vault.retrieve("soft").await?;
    assert_eq!(&*value, b"v");
    Ok(())
}
