use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One lock per output path, so two jobs never write the same file at once
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the parent directory so `a/../out.mp4` and `out.mp4` share a lock
    fn key(path: &Path) -> PathBuf {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        match (std::fs::canonicalize(parent), path.file_name()) {
            (Ok(dir), Some(name)) => dir.join(name),
            _ => path.to_path_buf(),
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries only the map still references belong to finished jobs
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(Self::key(path)).or_default())
    }

    /// Block the current (worker) thread until the path is free
    pub fn acquire_blocking(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.lock_for(path).blocking_lock_owned()
    }

    /// Wait asynchronously until the path is free
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.lock_for(path).lock_owned().await
    }

    /// Take the lock only if nobody holds it
    pub fn try_acquire(&self, path: &Path) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(path).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_path_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let locks = PathLocks::new();
        let out = dir.path().join("out.frames");

        let guard = locks.try_acquire(&out).unwrap();
        assert!(locks.try_acquire(&out).is_none());
        assert!(locks.try_acquire(&dir.path().join("other.frames")).is_some());

        drop(guard);
        assert!(locks.try_acquire(&out).is_some());
    }

    #[test]
    fn test_equivalent_paths_share_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let locks = PathLocks::new();

        let _guard = locks.try_acquire(&dir.path().join("out.wav")).unwrap();
        assert!(locks.try_acquire(&dir.path().join("sub").join("..").join("out.wav")).is_none());
    }

    #[tokio::test]
    async fn test_async_acquire_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let locks = PathLocks::new();
        let out = dir.path().join("out.frames");

        let guard = locks.acquire(&out).await;
        let waiter = {
            let locks = locks.clone();
            let out = out.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&out).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
