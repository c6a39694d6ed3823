//! Nonce allocator (spec §4.9): single-writer, monotonically increasing nonce
//! assignment for one solver instance, bootstrapped by a bounded on-chain scan.

use tokio::sync::Mutex;

use crate::types::Nonce;

/// Bound on the initial on-chain scan for the first unused nonce.
///
/// Heavy-volume deployments should persist the last-used nonce instead of
/// rescanning from zero on every restart; that persisted-cursor mode is not
/// built here.
pub const NONCE_SCAN_BOUND: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum NonceAllocatorError {
    #[error("exhausted the initial nonce scan window of {0} without finding a free nonce")]
    ScanExhausted(u64),
}

struct State {
    next: u64,
}

/// Single-writer nonce source: `next()` is the only mutator, serialized by the
/// internal mutex, so two concurrent callers can never observe the same value.
pub struct NonceAllocator {
    state: Mutex<State>,
}

impl NonceAllocator {
    /// Scans `is_used` from 0 up to [`NONCE_SCAN_BOUND`] for the first unused
    /// nonce, and starts allocation from there.
    pub async fn bootstrap<F>(mut is_used: F) -> Result<Self, NonceAllocatorError>
    where
        F: FnMut(u64) -> bool,
    {
        for n in 0..NONCE_SCAN_BOUND {
            if !is_used(n) {
                return Ok(NonceAllocator { state: Mutex::new(State { next: n }) });
            }
        }
        Err(NonceAllocatorError::ScanExhausted(NONCE_SCAN_BOUND))
    }

    pub async fn next(&self) -> Nonce {
        let mut state = self.state.lock().await;
        let n = state.next;
        state.next += 1;
        Nonce::from_u64(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_skips_used_nonces() {
        let allocator = NonceAllocator::bootstrap(|n| n < 3).await.unwrap();
        assert_eq!(allocator.next().await, Nonce::from_u64(3));
        assert_eq!(allocator.next().await, Nonce::from_u64(4));
    }

    #[tokio::test]
    async fn allocations_are_monotonic_under_concurrency() {
        let allocator = std::sync::Arc::new(NonceAllocator::bootstrap(|_| false).await.unwrap());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.next().await }));
        }
        let mut nonces: Vec<u64> = Vec::new();
        for handle in handles {
            nonces.push(handle.await.unwrap().0.to::<u64>());
        }
        nonces.sort_unstable();
        nonces.dedup();
        assert_eq!(nonces.len(), 16);
    }

    #[tokio::test]
    async fn bootstrap_fails_when_fully_saturated() {
        let err = NonceAllocator::bootstrap(|_| true).await.unwrap_err();
        assert!(matches!(err, NonceAllocatorError::ScanExhausted(_)));
    }
}
