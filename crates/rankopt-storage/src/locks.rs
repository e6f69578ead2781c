//! Per-job mutual exclusion for read-modify-write sequences.
//!
//! RocksDB offers atomic batches but no row locks. Every mutation of a job
//! (and of the entity it owns) runs inside `JobLocks::with_lock` keyed by
//! the job id, so two commits for the same job serialize while commits for
//! different jobs proceed in parallel.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::StorageError;

/// Lock namespace. Job creation locks the entity (the job id does not exist
/// yet); every later mutation locks the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Job(String),
    Entity(String),
    Keyword(String),
}

impl LockKey {
    pub fn job(job_id: &str) -> Self {
        LockKey::Job(job_id.to_string())
    }

    pub fn entity(entity_id: &str) -> Self {
        LockKey::Entity(entity_id.to_string())
    }

    pub fn keyword(entity_id: &str, keyword: &str) -> Self {
        LockKey::Keyword(format!("{}:{}", entity_id, keyword))
    }
}

/// Lazily created mutex per key.
#[derive(Default)]
pub struct JobLocks {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The map shard is released before blocking on the key's mutex, so
    /// waiting on one job never blocks lock acquisition for others.
    pub fn with_lock<T, F>(&self, key: LockKey, f: F) -> Result<T, StorageError>
    where
        F: FnOnce() -> Result<T, StorageError>,
    {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = mutex
            .lock()
            .map_err(|_| StorageError::LockPoisoned(format!("{:?}", key)))?;
        f()
    }

    /// Drop the mutex for a key that no longer exists.
    ///
    /// The entry stays while any thread still holds or waits on it, so a
    /// waiter and a newcomer always end up on the same mutex. Call this
    /// only after leaving `with_lock` for the key.
    pub fn forget(&self, key: &LockKey) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    /// Number of keys that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_same_key_serializes() {
        let locks = Arc::new(JobLocks::new());
        let inside = Arc::new(AtomicU32::new(0));
        let max_inside = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    locks
                        .with_lock(LockKey::job("job-1"), || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(5));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_propagates_and_releases() {
        let locks = JobLocks::new();
        let result: Result<(), StorageError> = locks.with_lock(LockKey::job("j"), || {
            Err(StorageError::Conflict("boom".to_string()))
        });
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // Lock is free again
        assert!(locks.with_lock(LockKey::job("j"), || Ok(())).is_ok());
    }

    #[test]
    fn test_forget_removes_key() {
        let locks = JobLocks::new();
        locks.with_lock(LockKey::entity("vid"), || Ok(())).unwrap();
        assert_eq!(locks.len(), 1);
        locks.forget(&LockKey::entity("vid"));
        assert!(locks.is_empty());
    }

    #[test]
    fn test_forget_keeps_key_with_waiter() {
        let locks = Arc::new(JobLocks::new());
        let key = LockKey::keyword("vid", "tokio");
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let locks = locks.clone();
            let key = key.clone();
            thread::spawn(move || {
                locks
                    .with_lock(key, || {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok(())
                    })
                    .unwrap();
            })
        };
        entered_rx.recv().unwrap();

        // Held by another thread: the entry must survive
        locks.forget(&key);
        assert_eq!(locks.len(), 1);

        // A newcomer serializes behind the holder on the same mutex
        let inside = Arc::new(AtomicU32::new(0));
        let newcomer = {
            let locks = locks.clone();
            let key = key.clone();
            let inside = inside.clone();
            thread::spawn(move || {
                locks
                    .with_lock(key, || {
                        inside.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(inside.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        newcomer.join().unwrap();
        assert_eq!(inside.load(Ordering::SeqCst), 1);

        locks.forget(&key);
        assert!(locks.is_empty());
    }
}
