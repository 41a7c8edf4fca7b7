//! zkenv-client: talking to the token custodian
//!
//! The custodian issues token pairs, hands out the counterpart of a known
//! half, and forgets a pair on request. It never sees a key, a PIN or a value.

pub mod http;
pub mod memory;

use std::future::Future;

use zkenv_core::{KnownHalf, Resolution, TokenPair, ZkenvResult};

pub use http::HttpTokenService;
pub use memory::MemoryTokenService;

/// The three custodian calls the orchestrators depend on.
pub trait TokenService: Send + Sync {
    /// Request a fresh pair. `multi_use` keeps it resolvable after a successful decrypt.
    fn issue(&self, multi_use: bool) -> impl Future<Output = ZkenvResult<TokenPair>> + Send;

    /// Exchange a known half for its counterpart. Must not consume the pair.
    fn resolve(&self, known: &KnownHalf) -> impl Future<Output = ZkenvResult<Resolution>> + Send;

    /// Invalidate a pair. Only called after a decrypt with it has succeeded.
    fn delete(&self, token_b: &str) -> impl Future<Output = ZkenvResult<()>> + Send;
}
