//! zkenv-crypto: per-value envelope encryption keyed by a token pair
//!
//! Neither the file nor the custodian holds enough to decrypt on its own.
//! The file keeps one token half, the custodian keeps the other, and in the
//! PIN protocol a six-digit PIN known only to the operators is mixed in.
//!
//! ```text
//! pair (v1):  key = HKDF-SHA256(salt = tokenA,             info = "zkdotenv",     ikm = tokenB)
//! pin  (v2):  key = HKDF-SHA256(salt = "zkshare-pin-salt", info = "zkdotenv-pin", ikm = tokenA ‖ PIN)
//!
//! envelope:   base64url( nonce[12] ‖ AES-256-GCM(key, nonce, value) ‖ tag[16] ), no AAD
//! ```

pub mod envelope;
pub mod kdf;
pub mod pin;

pub use envelope::{open, seal, Envelope};
pub use kdf::{derive_key, derive_pair_key, derive_pin_key, DerivedKey, KeyMaterial};
pub use pin::Pin;

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
