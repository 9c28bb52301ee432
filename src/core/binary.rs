//! Scheduler binary availability checks.
//!
//! The scheduler ships as a plain file next to the bridge and occasionally
//! loses its execute bit (archives, copies across filesystems). Launching
//! makes one attempt to restore it before giving up.

use std::path::Path;

use tracing::{debug, warn};

use crate::core::error::{BridgeError, BridgeResult};

/// Permission bits applied when the binary is found without an execute bit.
pub const REPAIRED_MODE: u32 = 0o755;

/// Checks that `path` is a regular file with any execute bit set.
#[cfg(unix)]
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && (metadata.permissions().mode() & 0o111 != 0),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Ensures the scheduler binary exists and can be executed.
///
/// A present but non-executable file gets [`REPAIRED_MODE`] once; if it is
/// still not executable afterwards the binary is reported unavailable.
///
/// # Errors
///
/// Returns [`BridgeError::ProcessUnavailable`] if the file is missing or
/// cannot be made executable.
pub fn ensure_executable(path: &Path) -> BridgeResult<()> {
    if !path.is_file() {
        return Err(BridgeError::ProcessUnavailable(format!(
            "scheduler binary not found at {}",
            path.display()
        )));
    }

    if is_executable(path) {
        return Ok(());
    }

    debug!(path = %path.display(), "scheduler binary lacks execute bit; repairing");
    if let Err(err) = set_mode(path, REPAIRED_MODE) {
        warn!(path = %path.display(), error = %err, "could not change binary permissions");
    }

    if is_executable(path) {
        Ok(())
    } else {
        Err(BridgeError::ProcessUnavailable(format!(
            "scheduler binary at {} is not executable",
            path.display()
        )))
    }
}

/// Sets unix permission bits on `path`.
///
/// # Errors
///
/// Returns the underlying I/O error if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
