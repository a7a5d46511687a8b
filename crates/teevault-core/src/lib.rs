//! Encrypted secret-storage core for TeeVault.
//!
//! A vault is a single file of secrets protected by a two-layer key
//! hierarchy: a 32-byte Vault Master Key (VMK) sealed at rest by a
//! key-protection backend, and per-entry keys derived from it with
//! HKDF-SHA256. The on-disk envelope carries the sealed VMK, the entry
//! list, and an HMAC-SHA256 tag over a canonical serialization of the
//! entries; writes are atomic (temp file + rename). While open, the VMK
//! lives in a single-slot in-memory holder with an auto-lock timer and
//! is scrubbed on lock, rotation, and exit.
//!
//! Entry payloads are opaque bytes. Entries may instead be resident in
//! an external hardware module, in which case the envelope stores only
//! an object identifier and retrieval is routed through the caller's
//! [`HsmAdapter`].

pub mod audit;
pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
mod harden;
pub mod keys;
pub mod ops;
pub mod passphrase;
pub mod primitives;
pub mod session;
pub mod store;
pub mod vault;

pub use audit::{AuditAction, AuditEvent, AuditSink, NullSink};
pub use backend::{BackendKind, HsmAdapter, KeyBackend};
pub use config::VaultConfig;
pub use envelope::{
    canonical_entries, compute_entries_hmac, touch_envelope, verify_entries_hmac, Envelope,
    EntryPayload, EntryType, VaultEntry, VaultMetadata, ENVELOPE_VERSION,
};
pub use error::{VaultError, VaultResult};
pub use keys::{derive_entry_key, Vmk, EEK_LEN, VMK_LEN};
pub use ops::{
    add_entry, delete_entry, list_entries, retrieve_entry, rotate_entry, rotate_master,
    EntryFilter, EntryInfo, NewEntry, NewEntryBody,
};
pub use passphrase::PassphraseBackend;
pub use primitives::SealedBox;
pub use session::{VaultSession, DEFAULT_AUTO_LOCK_TIMEOUT_MS};
pub use store::{VaultStore, VAULT_FILE};
pub use vault::Vault;
