//! The on-disk envelope: schema, canonical entry serialization, and the
//! HMAC integrity binding over the entry set.
//!
//! The envelope is a JSON document (`version`, `metadata`, `sealedVmk`,
//! `entries`, `hmac`). The HMAC input is NOT the on-disk byte layout but
//! a canonical textual form computed over the entries in list order:
//!
//! ```text
//! id:decimal(version):base64(ciphertext):base64(tag) | ...
//! ```
//!
//! Hardware-resident entries contribute empty ciphertext and tag fields
//! (`id:version::`); their payload integrity is the hardware module's
//! job, the HMAC binds their presence and version.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;
use crate::error::{VaultError, VaultResult};
use crate::keys::Vmk;
use crate::primitives::{self, AEAD_IV_LEN, AEAD_TAG_LEN};

/// The only envelope format version this crate reads or writes.
pub const ENVELOPE_VERSION: u32 = 1;

/// Closed set of entry type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Secret,
    ApiToken,
    SshKey,
    PrivateKey,
    Certificate,
}

/// Where an entry's secret material lives.
///
/// A tagged variant rather than nullable fields: an entry either carries
/// a ciphertext triple in the envelope or an object id pointing into an
/// external hardware module, never both and never neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    Sealed {
        iv: [u8; AEAD_IV_LEN],
        ciphertext: Vec<u8>,
        auth_tag: [u8; AEAD_TAG_LEN],
    },
    HsmResident {
        hsm_object_id: String,
    },
}

impl EntryPayload {
    pub fn is_hsm_resident(&self) -> bool {
        matches!(self, EntryPayload::HsmResident { .. })
    }
}

/// One record in the vault. Append-only; `version` counts re-encryptions
/// of the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntryWire", into = "EntryWire")]
pub struct VaultEntry {
    pub id: String,
    pub label: String,
    pub entry_type: EntryType,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version: u32,
    pub payload: EntryPayload,
}

/// Envelope metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    pub backend: BackendKind,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub vmk_version: u32,
    pub entry_count: u32,
}

/// The complete on-disk record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: u32,
    pub metadata: VaultMetadata,
    pub sealed_vmk: String,
    pub entries: Vec<VaultEntry>,
    pub hmac: String,
}

impl Envelope {
    /// Build a fresh envelope around a just-sealed VMK, HMAC included.
    pub fn create(backend: BackendKind, sealed_vmk: String, vmk: &Vmk) -> Self {
        let now = Utc::now();
        let envelope = Envelope {
            version: ENVELOPE_VERSION,
            metadata: VaultMetadata {
                backend,
                created_at: now,
                last_modified_at: now,
                vmk_version: 1,
                entry_count: 0,
            },
            sealed_vmk,
            entries: Vec::new(),
            hmac: String::new(),
        };
        touch_envelope(envelope, vmk)
    }
}

/// Canonical serialization of the entry list for the HMAC input.
pub fn canonical_entries(entries: &[VaultEntry]) -> Vec<u8> {
    let mut parts = Vec::with_capacity(entries.len());
    for entry in entries {
        let (ciphertext, tag) = match &entry.payload {
            EntryPayload::Sealed {
                ciphertext,
                auth_tag,
                ..
            } => (
                general_purpose::STANDARD.encode(ciphertext),
                general_purpose::STANDARD.encode(auth_tag),
            ),
            EntryPayload::HsmResident { .. } => (String::new(), String::new()),
        };
        parts.push(format!(
            "{}:{}:{}:{}",
            entry.id, entry.version, ciphertext, tag
        ));
    }
    parts.join("|").into_bytes()
}

/// HMAC-SHA256 over the canonical entry serialization, hex-encoded.
pub fn compute_entries_hmac(vmk: &Vmk, entries: &[VaultEntry]) -> String {
    let tag = primitives::hmac_sha256(vmk.expose(), &canonical_entries(entries));
    hex::encode(tag)
}

/// Constant-time verification of the stored tag against a recomputation
/// under `vmk`. Undecodable stored tags count as corruption, mismatches
/// as integrity failures.
pub fn verify_entries_hmac(vmk: &Vmk, envelope: &Envelope) -> VaultResult<()> {
    let stored = hex::decode(&envelope.hmac)
        .map_err(|_| VaultError::Corrupted("hmac field is not valid hex".into()))?;
    let computed = primitives::hmac_sha256(vmk.expose(), &canonical_entries(&envelope.entries));
    if primitives::constant_time_eq(&computed, &stored) {
        Ok(())
    } else {
        Err(VaultError::IntegrityFailure)
    }
}

/// Refresh everything derived from the entry list: modification
/// timestamp, entry count, and the HMAC. Every mutation of `entries`
/// must pass the envelope through here before persisting.
pub fn touch_envelope(mut envelope: Envelope, vmk: &Vmk) -> Envelope {
    envelope.metadata.last_modified_at = Utc::now();
    envelope.metadata.entry_count = envelope.entries.len() as u32;
    envelope.hmac = compute_entries_hmac(vmk, &envelope.entries);
    envelope
}

/// Wire form of an entry: the bit-exact field layout of the JSON
/// document, with the payload variant flattened into optional fields.
/// Decoding validates the presence rules and yields `Corrupted` for
/// records that violate them.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryWire {
    id: String,
    label: String,
    #[serde(rename = "type")]
    entry_type: EntryType,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    version: u32,
    hsm_resident: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hsm_object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ciphertext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_tag: Option<String>,
}

impl From<VaultEntry> for EntryWire {
    fn from(entry: VaultEntry) -> Self {
        let (hsm_resident, hsm_object_id, iv, ciphertext, auth_tag) = match entry.payload {
            EntryPayload::Sealed {
                iv,
                ciphertext,
                auth_tag,
            } => (
                false,
                None,
                Some(general_purpose::STANDARD.encode(iv)),
                Some(general_purpose::STANDARD.encode(ciphertext)),
                Some(general_purpose::STANDARD.encode(auth_tag)),
            ),
            EntryPayload::HsmResident { hsm_object_id } => {
                (true, Some(hsm_object_id), None, None, None)
            }
        };
        EntryWire {
            id: entry.id,
            label: entry.label,
            entry_type: entry.entry_type,
            tags: entry.tags,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            version: entry.version,
            hsm_resident,
            hsm_object_id,
            iv,
            ciphertext,
            auth_tag,
        }
    }
}

impl TryFrom<EntryWire> for VaultEntry {
    type Error = VaultError;

    fn try_from(wire: EntryWire) -> VaultResult<Self> {
        if wire.version < 1 {
            return Err(VaultError::Corrupted(format!(
                "entry '{}' has version 0",
                wire.id
            )));
        }
        let payload = if wire.hsm_resident {
            if wire.iv.is_some() || wire.ciphertext.is_some() || wire.auth_tag.is_some() {
                return Err(VaultError::Corrupted(format!(
                    "hardware-resident entry '{}' carries ciphertext fields",
                    wire.id
                )));
            }
            let hsm_object_id = wire.hsm_object_id.ok_or_else(|| {
                VaultError::Corrupted(format!(
                    "hardware-resident entry '{}' has no object id",
                    wire.id
                ))
            })?;
            EntryPayload::HsmResident { hsm_object_id }
        } else {
            let (iv, ciphertext, auth_tag) = match (wire.iv, wire.ciphertext, wire.auth_tag) {
                (Some(iv), Some(ct), Some(tag)) => (iv, ct, tag),
                _ => {
                    return Err(VaultError::Corrupted(format!(
                        "entry '{}' is missing ciphertext fields",
                        wire.id
                    )))
                }
            };
            EntryPayload::Sealed {
                iv: decode_fixed::<AEAD_IV_LEN>(&iv, "iv", &wire.id)?,
                ciphertext: general_purpose::STANDARD.decode(&ciphertext).map_err(|_| {
                    VaultError::Corrupted(format!("entry '{}' ciphertext is not base64", wire.id))
                })?,
                auth_tag: decode_fixed::<AEAD_TAG_LEN>(&auth_tag, "authTag", &wire.id)?,
            }
        };
        Ok(VaultEntry {
            id: wire.id,
            label: wire.label,
            entry_type: wire.entry_type,
            tags: wire.tags,
            created_at: wire.created_at,
            modified_at: wire.modified_at,
            version: wire.version,
            payload,
        })
    }
}

fn decode_fixed<const N: usize>(b64: &str, field: &str, id: &str) -> VaultResult<[u8; N]> {
    let bytes = general_purpose::STANDARD
        .decode(b64)
        .map_err(|_| VaultError::Corrupted(format!("entry '{id}' {field} is not base64")))?;
    bytes.try_into().map_err(|_| {
        VaultError::Corrupted(format!("entry '{id}' {field} has the wrong length"))
    })
}
