//! The in-memory unlocked state: a single-slot holder of the VMK with
//! an auto-lock timer.
//!
//! The holder is the only shared mutable state in the core and is
//! guarded by a mutex. The auto-lock timer is a one-shot task that runs
//! the lock transition after a period of VMK inactivity; any access to
//! the VMK re-arms it. Timers are invalidated by a generation counter,
//! so a stale timer firing concurrently with re-unlock or re-arm is a
//! no-op.
//!
//! Arming the timer needs a tokio runtime. Outside one, the session
//! still works but auto-lock stays disarmed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::backend::BackendKind;
use crate::error::{VaultError, VaultResult};
use crate::keys::Vmk;

/// Default auto-lock timeout: five minutes of VMK inactivity.
pub const DEFAULT_AUTO_LOCK_TIMEOUT_MS: u64 = 300_000;

struct UnlockedState {
    vmk: Vmk,
    backend: BackendKind,
    unlocked_at: DateTime<Utc>,
}

struct SessionInner {
    slot: Option<UnlockedState>,
    timeout_ms: u64,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Process-local holder of the VMK while the vault is open.
pub struct VaultSession {
    inner: Arc<Mutex<SessionInner>>,
}

impl VaultSession {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                slot: None,
                timeout_ms,
                generation: 0,
                timer: None,
            })),
        }
    }

    fn guard(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a VMK into the slot. A previously unlocked state is scrubbed
    /// first. Arms the auto-lock timer.
    pub fn unlock(&self, vmk: Vmk, backend: BackendKind) {
        let mut inner = self.guard();
        if let Some(mut prev) = inner.slot.take() {
            prev.vmk.scrub();
        }
        inner.slot = Some(UnlockedState {
            vmk,
            backend,
            unlocked_at: Utc::now(),
        });
        Self::arm_timer(&mut inner, &self.inner);
        debug!(backend = %backend, "vault unlocked");
    }

    /// Scrub the VMK and release the slot. Cancels any pending timer.
    pub fn lock(&self) {
        let mut inner = self.guard();
        Self::disarm_timer(&mut inner);
        if let Some(mut state) = inner.slot.take() {
            state.vmk.scrub();
            debug!("vault locked");
        }
    }

    /// Observation only; does not reset the timer.
    pub fn is_unlocked(&self) -> bool {
        self.guard().slot.is_some()
    }

    /// Observation only; does not reset the timer.
    pub fn backend(&self) -> Option<BackendKind> {
        self.guard().slot.as_ref().map(|s| s.backend)
    }

    /// Observation only; does not reset the timer.
    pub fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        self.guard().slot.as_ref().map(|s| s.unlocked_at)
    }

    /// Run `f` with a borrow of the VMK. Fails with
    /// [`VaultError::Locked`] when the slot is empty. Every call resets
    /// the auto-lock timer to its full timeout.
    pub fn with_vmk<R>(&self, f: impl FnOnce(&Vmk) -> R) -> VaultResult<R> {
        let mut inner = self.guard();
        if inner.slot.is_none() {
            return Err(VaultError::Locked);
        }
        Self::arm_timer(&mut inner, &self.inner);
        let state = inner.slot.as_ref().expect("slot checked above");
        Ok(f(&state.vmk))
    }

    /// Change the timeout; `0` disables auto-lock. Re-arms from "now".
    pub fn set_auto_lock_timeout(&self, timeout_ms: u64) {
        let mut inner = self.guard();
        inner.timeout_ms = timeout_ms;
        Self::arm_timer(&mut inner, &self.inner);
    }

    pub fn auto_lock_timeout_ms(&self) -> u64 {
        self.guard().timeout_ms
    }

    fn disarm_timer(inner: &mut SessionInner) {
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(handle) = inner.timer.take() {
            handle.abort();
        }
    }

    fn arm_timer(inner: &mut SessionInner, shared: &Arc<Mutex<SessionInner>>) {
        Self::disarm_timer(inner);
        if inner.timeout_ms == 0 || inner.slot.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let generation = inner.generation;
        let timeout = Duration::from_millis(inner.timeout_ms);
        let shared = Arc::clone(shared);
        inner.timer = Some(handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.generation != generation {
                return; // re-armed or locked in the meantime
            }
            inner.timer = None;
            if let Some(mut state) = inner.slot.take() {
                state.vmk.scrub();
                debug!("vault auto-locked after inactivity");
            }
        }));
    }
}

impl Default for VaultSession {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_LOCK_TIMEOUT_MS)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(mut state) = self.slot.take() {
            state.vmk.scrub();
        }
    }
}
