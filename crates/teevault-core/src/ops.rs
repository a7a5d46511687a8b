//! Entry lifecycle operations.
//!
//! Every mutating operation is a pure value transform: envelope in, new
//! envelope out, with [`touch_envelope`] applied. Persistence belongs to
//! the caller. Every operation that touches key material derives the
//! per-entry key for exactly one encrypt or decrypt and scrubs it on
//! all exit paths.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::envelope::{touch_envelope, Envelope, EntryPayload, EntryType, VaultEntry};
use crate::error::{VaultError, VaultResult};
use crate::keys::{derive_entry_key, Vmk};
use crate::primitives;

/// Input to [`add_entry`].
pub struct NewEntry {
    pub label: String,
    pub entry_type: EntryType,
    pub tags: Vec<String>,
    pub body: NewEntryBody,
}

/// What the new entry holds: an opaque payload to seal into the
/// envelope, or a reference to material already resident in an external
/// hardware module.
pub enum NewEntryBody {
    Value(Zeroizing<Vec<u8>>),
    HsmResident { hsm_object_id: String },
}

impl NewEntry {
    /// Convenience constructor for the common sealed-payload case.
    pub fn sealed(label: impl Into<String>, entry_type: EntryType, value: &[u8]) -> Self {
        Self {
            label: label.into(),
            entry_type,
            tags: Vec::new(),
            body: NewEntryBody::Value(Zeroizing::new(value.to_vec())),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Metadata-only filter for [`list_entries`]. Both filters must match
/// when both are set; `type` is exact equality, `tag` exact membership.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub entry_type: Option<EntryType>,
    pub tag: Option<String>,
}

/// Metadata view of an entry. Never carries key material or payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub modified_at: chrono::DateTime<Utc>,
    pub version: u32,
    pub hsm_resident: bool,
}

impl From<&VaultEntry> for EntryInfo {
    fn from(entry: &VaultEntry) -> Self {
        EntryInfo {
            id: entry.id.clone(),
            label: entry.label.clone(),
            entry_type: entry.entry_type,
            tags: entry.tags.clone(),
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            version: entry.version,
            hsm_resident: entry.payload.is_hsm_resident(),
        }
    }
}

fn find_entry<'a>(envelope: &'a Envelope, label: &str) -> VaultResult<(usize, &'a VaultEntry)> {
    envelope
        .entries
        .iter()
        .enumerate()
        .find(|(_, e)| e.label == label)
        .ok_or_else(|| VaultError::NotFound(label.to_string()))
}

/// Append a new entry. Labels are unique per vault; the new record gets
/// a fresh 128-bit id, version 1, and the current time for both
/// timestamps.
pub fn add_entry(
    envelope: &Envelope,
    vmk: &Vmk,
    new: NewEntry,
) -> VaultResult<(Envelope, EntryInfo)> {
    if new.label.is_empty() {
        return Err(VaultError::InvalidArgument("label must not be empty".into()));
    }
    if envelope.entries.iter().any(|e| e.label == new.label) {
        return Err(VaultError::DuplicateLabel(new.label));
    }

    let id = Uuid::new_v4().to_string();
    let payload = match new.body {
        NewEntryBody::Value(value) => {
            let eek = derive_entry_key(vmk, &id, 1)?;
            let sealed = primitives::aead_encrypt(&*eek, &value)?;
            EntryPayload::Sealed {
                iv: sealed.iv,
                ciphertext: sealed.ciphertext,
                auth_tag: sealed.tag,
            }
        }
        NewEntryBody::HsmResident { hsm_object_id } => {
            if hsm_object_id.is_empty() {
                return Err(VaultError::InvalidArgument(
                    "hardware-resident entries need an object id".into(),
                ));
            }
            EntryPayload::HsmResident { hsm_object_id }
        }
    };

    let now = Utc::now();
    let entry = VaultEntry {
        id,
        label: new.label,
        entry_type: new.entry_type,
        tags: new.tags,
        created_at: now,
        modified_at: now,
        version: 1,
        payload,
    };
    let info = EntryInfo::from(&entry);

    let mut next = envelope.clone();
    next.entries.push(entry);
    Ok((touch_envelope(next, vmk), info))
}

/// Decrypt and return an entry's payload. The caller owns the returned
/// bytes and is responsible for scrubbing them (the `Zeroizing` wrapper
/// does so when they fall out of scope).
pub fn retrieve_entry(
    envelope: &Envelope,
    vmk: &Vmk,
    label: &str,
) -> VaultResult<(EntryInfo, Zeroizing<Vec<u8>>)> {
    let (_, entry) = find_entry(envelope, label)?;
    match &entry.payload {
        EntryPayload::HsmResident { .. } => {
            Err(VaultError::HardwareResident(label.to_string()))
        }
        EntryPayload::Sealed {
            iv,
            ciphertext,
            auth_tag,
        } => {
            let eek = derive_entry_key(vmk, &entry.id, entry.version)?;
            let value = primitives::aead_decrypt(&*eek, iv, ciphertext, auth_tag)?;
            Ok((EntryInfo::from(entry), value))
        }
    }
}

/// Metadata listing with optional conjunctive filters.
pub fn list_entries(envelope: &Envelope, filter: &EntryFilter) -> Vec<EntryInfo> {
    envelope
        .entries
        .iter()
        .filter(|e| {
            filter
                .entry_type
                .map_or(true, |wanted| e.entry_type == wanted)
        })
        .filter(|e| {
            filter
                .tag
                .as_ref()
                .map_or(true, |wanted| e.tags.iter().any(|t| t == wanted))
        })
        .map(EntryInfo::from)
        .collect()
}

/// Remove an entry by label. Logical deletion only; the old ciphertext
/// disappears with the next atomic rewrite of the file.
pub fn delete_entry(envelope: &Envelope, vmk: &Vmk, label: &str) -> VaultResult<Envelope> {
    let (index, _) = find_entry(envelope, label)?;
    let mut next = envelope.clone();
    next.entries.remove(index);
    Ok(touch_envelope(next, vmk))
}

/// Re-encrypt one entry under its next version's key. The IV is fresh by
/// construction, the version increments by exactly one, and order in the
/// entry list is preserved.
pub fn rotate_entry(envelope: &Envelope, vmk: &Vmk, label: &str) -> VaultResult<Envelope> {
    let (index, entry) = find_entry(envelope, label)?;
    let (iv, ciphertext, auth_tag) = match &entry.payload {
        EntryPayload::HsmResident { .. } => {
            return Err(VaultError::HardwareResident(label.to_string()))
        }
        EntryPayload::Sealed {
            iv,
            ciphertext,
            auth_tag,
        } => (iv, ciphertext, auth_tag),
    };

    let old_eek = derive_entry_key(vmk, &entry.id, entry.version)?;
    let value = primitives::aead_decrypt(&*old_eek, iv, ciphertext, auth_tag)?;

    let next_version = entry.version + 1;
    let new_eek = derive_entry_key(vmk, &entry.id, next_version)?;
    let sealed = primitives::aead_encrypt(&*new_eek, &value)?;

    let mut next = envelope.clone();
    let entry = &mut next.entries[index];
    entry.version = next_version;
    entry.modified_at = Utc::now();
    entry.payload = EntryPayload::Sealed {
        iv: sealed.iv,
        ciphertext: sealed.ciphertext,
        auth_tag: sealed.tag,
    };
    Ok(touch_envelope(next, vmk))
}

/// Re-key the whole vault from `old_vmk` to `new_vmk`.
///
/// Every sealed entry is decrypted at its current `(id, version)` and
/// re-encrypted at `(id, 1)`; versions reset to 1. Hardware-resident
/// entries are carried through untouched. The caller supplies the
/// re-sealed VMK blob from the active backend; `vmkVersion` increments
/// by one and the HMAC is recomputed under the new key.
pub fn rotate_master(
    envelope: &Envelope,
    old_vmk: &Vmk,
    new_vmk: &Vmk,
    resealed_vmk: String,
) -> VaultResult<Envelope> {
    let mut next = envelope.clone();
    let now = Utc::now();

    for entry in &mut next.entries {
        let (iv, ciphertext, auth_tag) = match &entry.payload {
            EntryPayload::HsmResident { .. } => continue,
            EntryPayload::Sealed {
                iv,
                ciphertext,
                auth_tag,
            } => (iv, ciphertext, auth_tag),
        };

        let old_eek = derive_entry_key(old_vmk, &entry.id, entry.version)?;
        let value = primitives::aead_decrypt(&*old_eek, iv, ciphertext, auth_tag)?;

        let new_eek = derive_entry_key(new_vmk, &entry.id, 1)?;
        let sealed = primitives::aead_encrypt(&*new_eek, &value)?;

        entry.version = 1;
        entry.modified_at = now;
        entry.payload = EntryPayload::Sealed {
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
            auth_tag: sealed.tag,
        };
    }

    next.metadata.vmk_version += 1;
    next.sealed_vmk = resealed_vmk;
    Ok(touch_envelope(next, new_vmk))
}
