//! Where a PIN comes from
//!
//! The orchestrators never prompt on their own; they ask a `PinSource` at most
//! once per run, and only when the records at hand need a PIN.

use zkenv_core::{ZkenvError, ZkenvResult};
use zkenv_crypto::Pin;

/// Attempts before an interactive prompt gives up.
pub const MAX_PROMPT_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPurpose {
    Encryption,
    Decryption,
}

impl std::fmt::Display for PinPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PinPurpose::Encryption => f.write_str("encryption"),
            PinPurpose::Decryption => f.write_str("decryption"),
        }
    }
}

pub trait PinSource: Send {
    fn pin(&mut self, purpose: PinPurpose) -> ZkenvResult<Pin>;
}

/// A PIN known up front (flag, environment, test).
pub struct FixedPin(Option<Pin>);

impl FixedPin {
    pub fn new(pin: Pin) -> Self {
        Self(Some(pin))
    }
}

impl PinSource for FixedPin {
    fn pin(&mut self, _purpose: PinPurpose) -> ZkenvResult<Pin> {
        self.0.take().ok_or(ZkenvError::PinRequired)
    }
}

/// Reads the PIN from the controlling terminal without echo.
#[derive(Debug, Default)]
pub struct TerminalPin;

impl PinSource for TerminalPin {
    fn pin(&mut self, purpose: PinPurpose) -> ZkenvResult<Pin> {
        let prompt = format!("Enter 6-digit PIN for {purpose}: ");
        prompt_until_valid(
            || Ok(rpassword::prompt_password(&prompt)?),
            || eprintln!("PIN must be exactly 6 digits."),
        )
    }
}

/// Call `read` until it yields a valid PIN, reporting each bad entry through `on_invalid`.
///
/// Read errors (closed stdin, no terminal) end the loop immediately.
pub fn prompt_until_valid(
    mut read: impl FnMut() -> ZkenvResult<String>,
    mut on_invalid: impl FnMut(),
) -> ZkenvResult<Pin> {
    for _ in 0..MAX_PROMPT_ATTEMPTS {
        match Pin::parse(&read()?) {
            Ok(pin) => return Ok(pin),
            Err(ZkenvError::PinFormat) => on_invalid(),
            Err(e) => return Err(e),
        }
    }
    Err(ZkenvError::PinFormat)
}

/// Resolve the PIN for a run: the one given, else the source, else nothing if none is needed.
pub fn acquire(
    required: bool,
    given: Option<Pin>,
    source: &mut dyn PinSource,
    purpose: PinPurpose,
) -> ZkenvResult<Option<Pin>> {
    if !required {
        return Ok(None);
    }
    match given {
        Some(pin) => Ok(Some(pin)),
        None => source.pin(purpose).map(Some),
    }
}
