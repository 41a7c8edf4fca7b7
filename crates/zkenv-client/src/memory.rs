//! In-process custodian
//!
//! Wraps a `TokenStore` behind the `TokenService` trait. Used by tests and by
//! anything that wants the full protocol without a network hop. Call counters
//! and an availability switch let tests observe and break the service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use zkenv_core::store::TokenStore;
use zkenv_core::{KnownHalf, Resolution, TokenPair, ZkenvError, ZkenvResult};

use crate::TokenService;

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Number of calls that reached the custodian, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub issue: usize,
    pub resolve: usize,
    pub delete: usize,
}

struct Inner {
    store: Mutex<TokenStore>,
    available: AtomicBool,
    ttl: Duration,
    issue_calls: AtomicUsize,
    resolve_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

/// Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct MemoryTokenService {
    inner: Arc<Inner>,
}

impl Default for MemoryTokenService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenService {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(TokenStore::new()),
                available: AtomicBool::new(true),
                ttl,
                issue_calls: AtomicUsize::new(0),
                resolve_calls: AtomicUsize::new(0),
                delete_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// While unavailable every call fails with `ServiceUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            issue: self.inner.issue_calls.load(Ordering::SeqCst),
            resolve: self.inner.resolve_calls.load(Ordering::SeqCst),
            delete: self.inner.delete_calls.load(Ordering::SeqCst),
        }
    }

    /// Number of pairs the custodian still holds.
    pub fn live_pairs(&self) -> usize {
        self.store().map(|s| s.len()).unwrap_or(0)
    }

    fn check_available(&self) -> ZkenvResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ZkenvError::ServiceUnavailable(
                "memory custodian switched off".into(),
            ))
        }
    }

    fn store(&self) -> ZkenvResult<MutexGuard<'_, TokenStore>> {
        self.inner
            .store
            .lock()
            .map_err(|_| ZkenvError::ServiceUnavailable("token store lock poisoned".into()))
    }
}

impl TokenService for MemoryTokenService {
    async fn issue(&self, multi_use: bool) -> ZkenvResult<TokenPair> {
        self.inner.issue_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.store()?.issue(multi_use, self.inner.ttl))
    }

    async fn resolve(&self, known: &KnownHalf) -> ZkenvResult<Resolution> {
        self.inner.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.store()?.resolve(known)
    }

    async fn delete(&self, token_b: &str) -> ZkenvResult<()> {
        self.inner.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.store()?.delete(token_b)
    }
}
