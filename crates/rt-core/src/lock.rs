//! Cross-process registry lock
//!
//! Registry mutations are serialized across independent revtun invocations
//! by an exclusive advisory lock on a well-known lock file. The lock is
//! advisory only: processes that bypass this module are not constrained.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::time::Duration;

use fs2::FileExt;

use crate::error::TunnelError;

/// Interval between lock acquisition attempts
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive lock over the registry, held for one critical section.
///
/// Acquired with a bounded wait; released when dropped, so error returns
/// inside the critical section still unlock.
pub struct RegistryLock {
    file: File,
}

impl RegistryLock {
    /// Acquire the lock at `path`, retrying once per second up to `timeout`.
    ///
    /// Creates the lock file (and its parent directory) if needed; the
    /// file's content is irrelevant, only the lock on it matters. Returns
    /// `TunnelError::LockTimeout` if the bounded wait expires.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, TunnelError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).write(true).open(path)?;

        let attempts = timeout.as_secs().max(1);
        for attempt in 0..attempts {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!("registry lock acquired after {} attempt(s)", attempt + 1);
                    return Ok(Self { file });
                }
                Err(e) => {
                    tracing::debug!("registry lock busy: {}", e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(RETRY_INTERVAL).await;
                    }
                }
            }
        }

        Err(TunnelError::LockTimeout(timeout))
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("failed to release registry lock: {}", e);
        }
    }
}
