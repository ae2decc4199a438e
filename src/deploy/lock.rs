// ABOUTME: Deploy lock preventing concurrent deploys into the same target directory.
// ABOUTME: Holder info is written as JSON and published atomically with a hard link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::remote::{RemoteErrorKind, RemoteOps, quote};

use super::DeployError;

/// Lock file name inside the target directory.
pub const LOCK_FILENAME: &str = ".skiff.lock";

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Target directory being deployed.
    pub directory: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(directory: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            directory: directory.to_string(),
        }
    }

    /// Check if this lock is stale (older than 1 hour).
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Path to the lock file for a target directory.
    pub fn lock_path(directory: &str) -> String {
        format!("{}/{}", directory.trim_end_matches('/'), LOCK_FILENAME)
    }
}

/// A held deploy lock. Release it with [`DeployLock::release`].
pub struct DeployLock<'a, R: RemoteOps + ?Sized> {
    remote: &'a R,
    directory: String,
}

impl<R: RemoteOps + ?Sized> std::fmt::Debug for DeployLock<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("directory", &self.directory)
            .finish()
    }
}

impl<'a, R: RemoteOps + ?Sized> DeployLock<'a, R> {
    /// Acquire the deploy lock for `directory`.
    ///
    /// The holder info is written to a private temp file first and published
    /// with `ln`, which fails when the lock exists. The lock file therefore
    /// never exists without its full contents. Fails immediately with
    /// [`DeployError::ConcurrentDeploy`] when a live lock exists. Stale locks
    /// (>1 hour) are broken with a warning, as are live ones when `force` is
    /// set. A lock whose holder cannot be read is never broken without `force`.
    pub async fn acquire(remote: &'a R, directory: &str, force: bool) -> Result<Self, DeployError> {
        let lock_path = LockInfo::lock_path(directory);

        let lock_info = LockInfo::new(directory);
        let lock_json = serde_json::to_string(&lock_info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;
        let acquire_cmd = publish_command(directory, &lock_path, &lock_json);

        match remote.run_command(&acquire_cmd).await {
            Ok(_) => {
                tracing::debug!("Acquired deploy lock {}", lock_path);
                return Ok(Self::held(remote, directory));
            }
            Err(e) if e.kind() == RemoteErrorKind::NonZeroExit => {}
            Err(e) => {
                return Err(DeployError::lock_error(format!(
                    "failed to acquire lock: {}",
                    e
                )));
            }
        }

        let existing = Self::read_existing(remote, &lock_path).await?;
        let should_break = match &existing {
            Some(existing) if force => {
                tracing::warn!(
                    "Breaking lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                true
            }
            Some(existing) if existing.is_stale() => {
                tracing::warn!(
                    "Auto-breaking stale lock held by {} (pid {}) since {}",
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
                true
            }
            Some(_) => false,
            None if force => {
                tracing::warn!("Breaking lock {} with unreadable holder info", lock_path);
                true
            }
            None => {
                return Err(DeployError::lock_error(format!(
                    "lock {} is held but its holder info is unreadable; use --force to break it",
                    lock_path
                )));
            }
        };

        if !should_break {
            let existing = existing.ok_or_else(|| {
                DeployError::lock_error("lock held by another process".to_string())
            })?;
            return Err(DeployError::ConcurrentDeploy {
                directory: directory.to_string(),
                holder: existing.holder,
                pid: existing.pid,
                started_at: existing.started_at,
            });
        }

        remote
            .run_command(&format!("rm -f {}", quote(&lock_path)))
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to break lock: {}", e)))?;

        remote.run_command(&acquire_cmd).await.map_err(|_| {
            DeployError::lock_error("lock acquired by another process during break".to_string())
        })?;

        Ok(Self::held(remote, directory))
    }

    /// Run `work` while holding the lock for `directory`.
    ///
    /// The lock is released exactly once after `work` finishes, whatever its
    /// result. A failed release is logged, not returned.
    pub async fn with_lock<T, E, F>(
        remote: &'a R,
        directory: &str,
        force: bool,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<DeployError>,
    {
        let lock = Self::acquire(remote, directory, force).await?;
        let result = work.await;
        if let Err(e) = lock.release().await {
            tracing::warn!("Failed to release deploy lock: {}", e);
        }
        result
    }

    fn held(remote: &'a R, directory: &str) -> Self {
        Self {
            remote,
            directory: directory.to_string(),
        }
    }

    /// Lock info of the current holder, or `None` when the file does not parse.
    async fn read_existing(remote: &R, lock_path: &str) -> Result<Option<LockInfo>, DeployError> {
        let output = remote
            .run_command(&format!("cat {}", quote(lock_path)))
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to read lock info: {}", e)))?;
        Ok(serde_json::from_str(output.trim()).ok())
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Release the lock.
    pub async fn release(self) -> Result<(), DeployError> {
        let lock_path = LockInfo::lock_path(&self.directory);
        self.remote
            .run_command(&format!("rm -f {}", quote(&lock_path)))
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to release lock: {}", e)))?;
        tracing::debug!("Released deploy lock {}", lock_path);
        Ok(())
    }
}

/// Shell command that writes `lock_json` to a fresh temp file and hard-links
/// it to `lock_path`. Exits 1 when the lock already exists.
fn publish_command(directory: &str, lock_path: &str, lock_json: &str) -> String {
    format!(
        "mkdir -p {dir} && tmp=$(mktemp {template}) && printf '%s' {json} > \"$tmp\" && \
         {{ ln \"$tmp\" {lock} 2>/dev/null; linked=$?; rm -f \"$tmp\"; exit $linked; }}",
        dir = quote(directory),
        template = quote(&format!("{}.XXXXXX", lock_path)),
        json = quote(lock_json),
        lock = quote(lock_path),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_info_creates_with_current_host_and_pid() {
        let info = LockInfo::new("/opt/shop");

        assert_eq!(info.directory, "/opt/shop");
        assert_eq!(info.pid, std::process::id());
        assert!(!info.holder.is_empty());
    }

    #[test]
    fn lock_path_lives_in_target_directory() {
        assert_eq!(LockInfo::lock_path("/opt/shop"), "/opt/shop/.skiff.lock");
        assert_eq!(LockInfo::lock_path("/opt/shop/"), "/opt/shop/.skiff.lock");
    }

    #[test]
    fn lock_is_published_by_hard_link() {
        let command = publish_command("/opt/shop", "/opt/shop/.skiff.lock", "{}");
        assert!(command.contains("mktemp /opt/shop/.skiff.lock.XXXXXX"));
        assert!(command.contains("ln \"$tmp\" /opt/shop/.skiff.lock"));
        assert!(command.ends_with("exit $linked; }"));
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        let info = LockInfo::new("/opt/shop");
        assert!(!info.is_stale());
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new("/opt/shop");
        // Set to 2 hours ago
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }
}
