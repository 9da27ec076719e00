use crate::domain::lock::LockKey;
use crate::domain::ports::SharedLockService;
use crate::error::{LendingError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Locks held by one operation.
///
/// Keys are always taken in [`LockKey`] order and given back in reverse.
/// Every acquisition is a single non-blocking attempt; contention surfaces as
/// [`LendingError::LockUnavailable`] and whatever was already taken is
/// released before returning.
///
/// Call [`LockSet::release`] on every exit path. If a set is dropped while
/// still holding keys (e.g. the request future was cancelled) the release is
/// handed to the runtime instead.
pub struct LockSet {
    service: SharedLockService,
    ttl: Duration,
    held: Vec<LockKey>,
}

impl LockSet {
    pub async fn acquire(
        service: SharedLockService,
        ttl: Duration,
        keys: impl IntoIterator<Item = LockKey>,
    ) -> Result<Self> {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut set = Self {
            service,
            ttl,
            held: Vec::with_capacity(keys.len()),
        };
        for key in keys {
            if let Err(e) = set.take(key).await {
                set.release().await;
                return Err(e);
            }
        }
        Ok(set)
    }

    /// Takes one more key while already holding others.
    ///
    /// The caller is responsible for the ordering consequences; on failure the
    /// keys already held stay held.
    pub async fn extend(&mut self, key: LockKey) -> Result<()> {
        if self.holds(key) {
            return Ok(());
        }
        self.take(key).await
    }

    pub fn holds(&self, key: LockKey) -> bool {
        self.held.contains(&key)
    }

    async fn take(&mut self, key: LockKey) -> Result<()> {
        let name = key.to_string();
        if self.service.acquire(&name, self.ttl).await? {
            debug!(lock = %name, "lock acquired");
            self.held.push(key);
            Ok(())
        } else {
            debug!(lock = %name, "lock contended");
            Err(LendingError::LockUnavailable { key: name })
        }
    }

    pub async fn release(mut self) {
        let held = std::mem::take(&mut self.held);
        release_all(&self.service, held).await;
    }
}

async fn release_all(service: &SharedLockService, held: Vec<LockKey>) {
    for key in held.into_iter().rev() {
        let name = key.to_string();
        match service.release(&name).await {
            Ok(()) => debug!(lock = %name, "lock released"),
            // The TTL still bounds how long the key stays taken.
            Err(e) => warn!(lock = %name, error = %e, "failed to release lock"),
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.held);
        let service = self.service.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { release_all(&service, held).await });
            }
            Err(_) => warn!(locks = held.len(), "locks dropped outside a runtime; left to expire"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LockService;
    use crate::infrastructure::in_memory::InMemoryLockService;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = InMemoryLockService::new();
        let set = LockSet::acquire(
            Arc::new(locks.clone()),
            TTL,
            [LockKey::Installment(3), LockKey::Limit(7)],
        )
        .await
        .unwrap();

        assert!(set.holds(LockKey::Limit(7)));
        assert!(locks.is_held("limit:7").await);
        assert!(locks.is_held("installment:3").await);

        set.release().await;
        assert!(!locks.is_held("limit:7").await);
        assert!(!locks.is_held("installment:3").await);
    }

    #[tokio::test]
    async fn test_contention_releases_partial_set() {
        let locks = InMemoryLockService::new();
        locks.acquire("installment-group:5", TTL).await.unwrap();

        let result = LockSet::acquire(
            Arc::new(locks.clone()),
            TTL,
            [
                LockKey::Limit(7),
                LockKey::Loan(5),
                LockKey::InstallmentGroup(5),
            ],
        )
        .await;

        assert!(matches!(
            result,
            Err(LendingError::LockUnavailable { key }) if key == "installment-group:5"
        ));
        assert!(!locks.is_held("limit:7").await);
        assert!(!locks.is_held("loan:5").await);
    }

    #[tokio::test]
    async fn test_extend_is_a_single_attempt() {
        let locks = InMemoryLockService::new();
        let mut set = LockSet::acquire(Arc::new(locks.clone()), TTL, [LockKey::Installment(1)])
            .await
            .unwrap();
        locks.acquire("limit:7", TTL).await.unwrap();

        assert!(matches!(
            set.extend(LockKey::Limit(7)).await,
            Err(LendingError::LockUnavailable { .. })
        ));
        assert!(set.holds(LockKey::Installment(1)));

        locks.release("limit:7").await.unwrap();
        set.extend(LockKey::Limit(7)).await.unwrap();
        assert!(set.holds(LockKey::Limit(7)));
        set.release().await;
    }

    #[tokio::test]
    async fn test_dropped_set_releases_in_background() {
        let locks = InMemoryLockService::new();
        let set = LockSet::acquire(Arc::new(locks.clone()), TTL, [LockKey::Loan(9)])
            .await
            .unwrap();

        drop(set);
        tokio::task::yield_now().await;
        for _ in 0..10 {
            if !locks.is_held("loan:9").await {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(!locks.is_held("loan:9").await);
    }
}
