use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;
use uuid::Uuid;

/// Host-scoped mutual exclusion keyed by pool id. Backed by a single
/// advisory-locked file per pool — every worker process on a host contends
/// on the same inode regardless of how many reconciler tasks it runs.
pub struct PoolLock {
    dir: PathBuf,
}

/// A held lock. Dropping it releases the flock, so release happens on every
/// exit path of the reconciler — including panics — without the caller
/// needing a `finally` block.
pub struct PoolLockGuard {
    file: File,
}

impl Drop for PoolLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl PoolLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Non-blocking acquire. Returns `Ok(None)` immediately if another
    /// holder exists rather than blocking.
    pub fn try_acquire(&self, pool_id: Uuid) -> std::io::Result<Option<PoolLockGuard>> {
        let path = self.dir.join(format!("spotfleet.pool-{pool_id}.lck"));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(PoolLockGuard { file })),
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_pool_fails_while_first_is_held() {
        let dir = std::env::temp_dir();
        let lock = PoolLock::new(dir);
        let pool_id = Uuid::new_v4();
        let first = lock.try_acquire(pool_id).unwrap();
        assert!(first.is_some());
        let second = lock.try_acquire(pool_id).unwrap();
        assert!(second.is_none());
        drop(first);
        let third = lock.try_acquire(pool_id).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn different_pools_do_not_contend() {
        let dir = std::env::temp_dir();
        let lock = PoolLock::new(dir);
        let a = lock.try_acquire(Uuid::new_v4()).unwrap();
        let b = lock.try_acquire(Uuid::new_v4()).unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
