//! Vault location and behavior knobs.

use std::path::PathBuf;

use crate::error::{VaultError, VaultResult};
use crate::session::DEFAULT_AUTO_LOCK_TIMEOUT_MS;

/// Default vault directory name under the state dir.
pub const DEFAULT_VAULT_DIR: &str = "default";

#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Root state directory, e.g. `~/.teevault`.
    pub state_dir: PathBuf,
    /// Vault directory name under `state_dir`; one vault per directory.
    pub vault_dir: String,
    /// Auto-lock timeout in milliseconds; `0` disables.
    pub auto_lock_timeout_ms: u64,
}

impl VaultConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            vault_dir: DEFAULT_VAULT_DIR.to_string(),
            auto_lock_timeout_ms: DEFAULT_AUTO_LOCK_TIMEOUT_MS,
        }
    }

    /// Resolve the per-user default state directory (`$HOME/.teevault`).
    pub fn default_paths() -> VaultResult<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            VaultError::InvalidArgument("cannot resolve the home directory".into())
        })?;
        Ok(Self::new(home.join(".teevault")))
    }

    pub fn with_vault_dir(mut self, vault_dir: impl Into<String>) -> Self {
        self.vault_dir = vault_dir.into();
        self
    }

    pub fn with_auto_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.auto_lock_timeout_ms = timeout_ms;
        self
    }

    /// Directory holding this vault's `vault.enc`.
    pub fn vault_path(&self) -> PathBuf {
        self.state_dir.join(&self.vault_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_path_joins_state_and_vault_dir() {
        let config = VaultConfig::new("/tmp/state").with_vault_dir("work");
        assert_eq!(config.vault_path(), PathBuf::from("/tmp/state/work"));
    }
}
