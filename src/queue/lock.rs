//! Drain lock with the 30-second staleness protocol.
//!
//! The lock file holds `{ "pid": int, "timestamp": ms_since_epoch }`.
//! A missing lock is created; a lock younger than 30 s means another
//! drain is in flight and this attempt is abandoned; an older or corrupt
//! lock is treated as abandoned by a crashed supervisor and overwritten.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::queue::lock_path;

/// A lock older than this is stale and eligible for takeover.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
}

/// A held drain lock; released (deleted) on drop or explicit release.
#[derive(Debug)]
pub struct DrainLock {
    path: PathBuf,
    released: bool,
}

impl DrainLock {
    /// Try to acquire the lock for a queue directory.
    ///
    /// Returns `None` when a live lock (younger than 30 s) is present.
    pub fn try_acquire(queue_dir: &Path) -> Result<Option<Self>> {
        fs::create_dir_all(queue_dir)?;
        let path = lock_path(queue_dir);

        if let Ok(content) = fs::read_to_string(&path) {
            match serde_json::from_str::<LockContent>(&content) {
                Ok(existing) => {
                    let age_ms = chrono::Utc::now().timestamp_millis() - existing.timestamp;
                    if age_ms >= 0 && (age_ms as u128) < LOCK_STALE_AFTER.as_millis() {
                        debug!(holder = existing.pid, age_ms, "Drain lock busy");
                        return Ok(None);
                    }
                    warn!(
                        holder = existing.pid,
                        age_ms, "Overwriting stale drain lock"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Overwriting corrupt drain lock");
                }
            }
        }

        let content = LockContent {
            pid: std::process::id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        fs::write(&path, serde_json::to_string(&content)?)?;
        Ok(Some(Self {
            path,
            released: false,
        }))
    }

    /// Release the lock by deleting the file.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "Failed to remove drain lock");
                }
            }
        }
    }
}

impl Drop for DrainLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_creates_and_release_removes() {
        let tmp = TempDir::new().unwrap();
        let lock = DrainLock::try_acquire(tmp.path()).unwrap().unwrap();
        assert!(lock_path(tmp.path()).exists());

        let content = fs::read_to_string(lock_path(tmp.path())).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["pid"], u64::from(std::process::id()));
        assert!(parsed["timestamp"].is_i64());

        lock.release();
        assert!(!lock_path(tmp.path()).exists());
    }

    #[test]
    fn live_lock_blocks_second_acquire() {
        let tmp = TempDir::new().unwrap();
        let _held = DrainLock::try_acquire(tmp.path()).unwrap().unwrap();
        assert!(DrainLock::try_acquire(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn stale_lock_is_overwritten() {
        // Scenario D step 3: a dead supervisor's old lock is reaped.
        let tmp = TempDir::new().unwrap();
        let stale = LockContent {
            pid: 1,
            timestamp: chrono::Utc::now().timestamp_millis() - 31_000,
        };
        fs::write(
            lock_path(tmp.path()),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        let lock = DrainLock::try_acquire(tmp.path()).unwrap();
        assert!(lock.is_some(), "stale lock should be taken over");
    }

    #[test]
    fn corrupt_lock_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        fs::write(lock_path(tmp.path()), "not json at all").unwrap();
        assert!(DrainLock::try_acquire(tmp.path()).unwrap().is_some());
    }

    #[test]
    fn drop_releases_on_panic_paths() {
        let tmp = TempDir::new().unwrap();
        {
            let _lock = DrainLock::try_acquire(tmp.path()).unwrap().unwrap();
        }
        assert!(!lock_path(tmp.path()).exists());
    }
}
