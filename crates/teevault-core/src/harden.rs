//! Process and filesystem hardening around the vault file.

use std::path::Path;

use crate::error::{VaultError, VaultResult};

/// Disable core dumps for the current process so the VMK never lands in
/// a kernel-written core file.
pub fn disable_core_dumps() -> VaultResult<()> {
    #[cfg(unix)]
    {
        use libc::{rlimit, setrlimit, RLIMIT_CORE};
        let rlim = rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        let result = unsafe { setrlimit(RLIMIT_CORE, &rlim) };
        if result == 0 {
            Ok(())
        } else {
            Err(VaultError::PrimitiveFailure(
                "failed to disable core dumps".into(),
            ))
        }
    }
    #[cfg(not(unix))]
    {
        Ok(())
    }
}

/// Restrict a file to its owner (0600).
pub fn secure_file_permissions(path: &Path) -> VaultResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Restrict a directory to its owner (0700).
pub fn secure_dir_permissions(path: &Path) -> VaultResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn file_and_dir_modes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();

        secure_dir_permissions(dir.path()).unwrap();
        secure_file_permissions(&file).unwrap();

        let dir_mode = std::fs::metadata(dir.path()).unwrap().permissions().mode();
        let file_mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
