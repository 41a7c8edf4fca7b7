pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ZkenvError, ZkenvResult};
pub use types::{KnownHalf, Protocol, Resolution, TokenPair};
