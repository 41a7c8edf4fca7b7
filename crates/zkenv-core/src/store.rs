//! In-memory token custodian
//!
//! Holds issued pairs keyed by tokenB, with a SHA-256 index over tokenA for
//! the legacy resolve path. Resolving never consumes a pair; only `delete`
//! does, and callers issue it after they have decrypted successfully.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{ZkenvError, ZkenvResult};
use crate::types::{KnownHalf, Resolution, TokenPair};

/// Random bytes per token half
pub const TOKEN_BYTES: usize = 32;

#[derive(Clone)]
struct StoredPair {
    token_a: String,
    multi: bool,
    expires: Instant,
}

impl StoredPair {
    fn live(&self, now: Instant) -> bool {
        now < self.expires
    }
}

#[derive(Default)]
pub struct TokenStore {
    by_b: HashMap<String, StoredPair>,
    a_index: HashMap<String, String>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh pair that stays resolvable for `ttl`.
    pub fn issue(&mut self, multi: bool, ttl: Duration) -> TokenPair {
        let now = Instant::now();
        self.purge_expired(now);

        let token_a = random_token();
        let token_b = random_token();
        self.a_index.insert(hash_token(&token_a), token_b.clone());
        self.by_b.insert(
            token_b.clone(),
            StoredPair {
                token_a: token_a.clone(),
                multi,
                expires: now + ttl,
            },
        );
        TokenPair { token_a, token_b }
    }

    /// Exchange one half for the other without consuming the pair.
    pub fn resolve(&mut self, known: &KnownHalf) -> ZkenvResult<Resolution> {
        let now = Instant::now();
        self.purge_expired(now);

        match known {
            KnownHalf::TokenB(token_b) => {
                let stored = self.by_b.get(token_b).ok_or(ZkenvError::TokenNotFound)?;
                Ok(Resolution {
                    counterpart: stored.token_a.clone(),
                    token_b: token_b.clone(),
                    should_delete: !stored.multi,
                })
            }
            KnownHalf::TokenA(token_a) => {
                let token_b = self
                    .a_index
                    .get(&hash_token(token_a))
                    .ok_or(ZkenvError::TokenNotFound)?;
                let stored = self.by_b.get(token_b).ok_or(ZkenvError::TokenNotFound)?;
                Ok(Resolution {
                    counterpart: token_b.clone(),
                    token_b: token_b.clone(),
                    should_delete: !stored.multi,
                })
            }
        }
    }

    /// Invalidate a pair by its tokenB.
    pub fn delete(&mut self, token_b: &str) -> ZkenvResult<()> {
        self.purge_expired(Instant::now());
        let stored = self.by_b.remove(token_b).ok_or(ZkenvError::TokenNotFound)?;
        self.a_index.remove(&hash_token(&stored.token_a));
        Ok(())
    }

    /// Number of live pairs.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.by_b.values().filter(|p| p.live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .by_b
            .iter()
            .filter(|(_, p)| !p.live(now))
            .map(|(b, _)| b.clone())
            .collect();
        for token_b in expired {
            if let Some(p) = self.by_b.remove(&token_b) {
                self.a_index.remove(&hash_token(&p.token_a));
            }
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 of a token; used for indexing and audit lines.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn issued_tokens_are_distinct_base64url() {
        let mut store = TokenStore::new();
        let pair = store.issue(false, DAY);
        assert_ne!(pair.token_a, pair.token_b);
        assert_eq!(pair.token_a.len(), 43);
        assert!(pair
            .token_b
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn resolve_by_either_half_does_not_consume() {
        let mut store = TokenStore::new();
        let pair = store.issue(false, DAY);

        for _ in 0..3 {
            let by_b = store
                .resolve(&KnownHalf::TokenB(pair.token_b.clone()))
                .unwrap();
            assert_eq!(by_b.counterpart, pair.token_a);
            assert!(by_b.should_delete);

            let by_a = store
                .resolve(&KnownHalf::TokenA(pair.token_a.clone()))
                .unwrap();
            assert_eq!(by_a.counterpart, pair.token_b);
            assert_eq!(by_a.token_b, pair.token_b);
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn multi_use_pairs_do_not_ask_for_deletion() {
        let mut store = TokenStore::new();
        let pair = store.issue(true, DAY);
        let res = store.resolve(&KnownHalf::TokenB(pair.token_b)).unwrap();
        assert!(!res.should_delete);
    }

    #[test]
    fn delete_removes_both_lookups() {
        let mut store = TokenStore::new();
        let pair = store.issue(false, DAY);
        store.delete(&pair.token_b).unwrap();

        assert!(matches!(
            store.resolve(&KnownHalf::TokenB(pair.token_b.clone())),
            Err(ZkenvError::TokenNotFound)
        ));
        assert!(matches!(
            store.resolve(&KnownHalf::TokenA(pair.token_a)),
            Err(ZkenvError::TokenNotFound)
        ));
        assert!(matches!(
            store.delete(&pair.token_b),
            Err(ZkenvError::TokenNotFound)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn expired_pairs_are_invisible() {
        let mut store = TokenStore::new();
        let pair = store.issue(false, Duration::ZERO);
        assert!(matches!(
            store.resolve(&KnownHalf::TokenB(pair.token_b)),
            Err(ZkenvError::TokenNotFound)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn hash_token_is_hex_sha256() {
        // sha256("abc")
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
