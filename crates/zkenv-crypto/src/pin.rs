//! Six-digit operator PIN

use secrecy::{ExposeSecret, SecretString};
use zkenv_core::{ZkenvError, ZkenvResult};

/// Number of decimal digits in a PIN
pub const PIN_LEN: usize = 6;

/// A validated PIN. Never sent to the custodian, never persisted.
pub struct Pin(SecretString);

impl Pin {
    /// Validate `input` (surrounding whitespace ignored) as exactly six ASCII digits.
    pub fn parse(input: &str) -> ZkenvResult<Self> {
        let trimmed = input.trim();
        if trimmed.len() == PIN_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(SecretString::from(trimmed.to_string())))
        } else {
            Err(ZkenvError::PinFormat)
        }
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::str::FromStr for Pin {
    type Err = ZkenvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Debug for Pin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Pin([REDACTED])")
    }
}
