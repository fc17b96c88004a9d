use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Caps how many scraps are processed at the same time across the whole worker.
///
/// Backed by a tokio `Semaphore`, which hands out permits in FIFO order. A slot is
/// freed when the permit returned by `acquire` is dropped.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait until a slot is free and take it.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore has been closed")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn saturation(&self) -> f64 {
        self.in_use() as f64 / self.capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let limiter = ConcurrencyLimiter::new(NonZeroUsize::new(2).unwrap());

        let first = limiter.acquire().await;
        let second = limiter.acquire().await;
        assert_eq!(limiter.in_use(), 2);
        assert_eq!(limiter.saturation(), 1.0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err(), "a third permit should not be available");

        drop(first);
        assert_eq!(limiter.in_use(), 1);
        let _third = limiter.acquire().await;

        drop(second);
        assert_eq!(limiter.in_use(), 1);
    }
}
