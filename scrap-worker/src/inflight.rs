use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The hashes of every scrap currently owned by a processing task.
///
/// Only the test-and-insert and the removal are serialized; processing itself
/// runs outside the lock.
#[derive(Debug, Default)]
pub struct InFlightSet {
    hashes: Mutex<HashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn hashes(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked: every operation is a single insert or remove.
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim `hash`. Returns false if another task already owns it.
    pub fn try_acquire(&self, hash: &str) -> bool {
        self.hashes().insert(hash.to_owned())
    }

    /// Give `hash` back. Releasing a hash that is not held is a no-op.
    pub fn release(&self, hash: &str) {
        self.hashes().remove(hash);
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes().contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ownership of one hash in an `InFlightSet`, released when dropped so that no
/// exit path of a processing task, panics included, can leave the hash stuck.
#[derive(Debug)]
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    hash: String,
}

impl InFlightGuard {
    pub fn acquire(set: &Arc<InFlightSet>, hash: &str) -> Option<Self> {
        if !set.try_acquire(hash) {
            return None;
        }

        Some(Self {
            set: set.clone(),
            hash: hash.to_owned(),
        })
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_of_the_same_hash_fails() {
        let set = InFlightSet::new();

        assert!(set.try_acquire("abc"));
        assert!(!set.try_acquire("abc"));
        assert!(set.try_acquire("def"));
        assert_eq!(set.len(), 2);

        set.release("abc");
        assert!(set.try_acquire("abc"));
    }

    #[test]
    fn release_is_idempotent() {
        let set = InFlightSet::new();
        set.release("missing");

        assert!(set.try_acquire("abc"));
        set.release("abc");
        set.release("abc");
        assert!(set.is_empty());
    }

    #[test]
    fn guard_releases_on_drop() {
        let set = Arc::new(InFlightSet::new());

        let guard = InFlightGuard::acquire(&set, "abc").expect("hash should be free");
        assert_eq!(guard.hash(), "abc");
        assert!(InFlightGuard::acquire(&set, "abc").is_none());

        drop(guard);
        assert!(!set.contains("abc"));
        assert!(InFlightGuard::acquire(&set, "abc").is_some());
    }

    #[test]
    fn guard_releases_when_its_task_panics() {
        let set = Arc::new(InFlightSet::new());
        let guard = InFlightGuard::acquire(&set, "abc").unwrap();

        let result = std::thread::spawn(move || {
            let _guard = guard;
            panic!("stage blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(set.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_concurrent_claim_wins() {
        let set = Arc::new(InFlightSet::new());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let set = set.clone();
                tokio::spawn(async move { set.try_acquire("same-content") })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
