//! zkenv-engine: encrypting and decrypting whole env files
//!
//! ```text
//! encrypt:  KEY=VALUE   ── issue ── derive ── seal ──▶  KEY_ENC=<ref>:<envelope>
//! decrypt:  KEY_ENC=…   ── resolve ── derive ── open ── (delete if single-use) ──▶  {KEY: VALUE}
//! ```
//!
//! The orchestrators are generic over [`TokenService`] and take the PIN as a
//! value; prompting lives in [`pin::PinSource`]. The free functions below wire
//! in the HTTP custodian and a terminal prompt.

pub mod decrypt;
pub mod encrypt;
pub mod envfile;
pub mod pin;
pub mod record;
pub mod report;

use std::path::Path;

use zkenv_client::{HttpTokenService, TokenService};
use zkenv_core::config::ServiceConfig;
use zkenv_core::ZkenvResult;
use zkenv_crypto::Pin;

pub use decrypt::{DecryptOptions, Decryptor};
pub use encrypt::{EncryptOptions, Encryptor};
pub use pin::{FixedPin, PinPurpose, PinSource, TerminalPin};
pub use record::{EncLine, EncryptedRecord};
pub use report::{DecryptReport, Deletion, EncryptReport, LineOutcome, RecordOutcome, ReportStatus};

/// Encrypt `source` into `dest` against the custodian at `config.api_base`.
///
/// Prompts for a PIN on the terminal when the protocol needs one and `pin` is `None`.
pub async fn encrypt_file(
    source: &Path,
    dest: &Path,
    config: &ServiceConfig,
    options: EncryptOptions,
    pin: Option<Pin>,
) -> ZkenvResult<EncryptReport> {
    let service = HttpTokenService::new(config)?;
    encrypt_file_with(service, source, dest, options, pin, &mut TerminalPin).await
}

/// Decrypt `path` against the custodian at `config.api_base`.
///
/// Prompts for a PIN on the terminal when the file holds PIN records and `pin` is `None`.
pub async fn decrypt_file(
    path: &Path,
    config: &ServiceConfig,
    options: DecryptOptions,
    pin: Option<Pin>,
) -> ZkenvResult<DecryptReport> {
    let service = HttpTokenService::new(config)?;
    decrypt_file_with(service, path, options, pin, &mut TerminalPin).await
}

/// [`encrypt_file`] with an explicit custodian and PIN source.
pub async fn encrypt_file_with<S: TokenService>(
    service: S,
    source: &Path,
    dest: &Path,
    options: EncryptOptions,
    pin: Option<Pin>,
    pin_source: &mut dyn PinSource,
) -> ZkenvResult<EncryptReport> {
    // Fail on an unreadable source before asking anyone for a PIN.
    tokio::fs::metadata(source).await?;
    let pin = pin::acquire(
        options.protocol.requires_pin(),
        pin,
        pin_source,
        PinPurpose::Encryption,
    )?;
    Encryptor::new(service, options)
        .encrypt_file(source, dest, pin.as_ref())
        .await
}

/// [`decrypt_file`] with an explicit custodian and PIN source.
pub async fn decrypt_file_with<S: TokenService>(
    service: S,
    path: &Path,
    options: DecryptOptions,
    pin: Option<Pin>,
    pin_source: &mut dyn PinSource,
) -> ZkenvResult<DecryptReport> {
    let contents = tokio::fs::read_to_string(path).await?;
    let parsed = record::parse_encrypted(&contents);
    let pin = pin::acquire(
        record::records_require_pin(&parsed),
        pin,
        pin_source,
        PinPurpose::Decryption,
    )?;
    let report = Decryptor::new(service, options)
        .decrypt_lines(parsed, pin.as_ref())
        .await;
    tracing::info!(
        path = %path.display(),
        recovered = report.recovered(),
        total = report.outcomes.len(),
        status = %report.status(),
        "decrypted env file"
    );
    Ok(report)
}
