//! Plaintext `.env` → `.zk.env`
//!
//! Each `KEY=VALUE` line gets its own freshly issued token pair and its own
//! envelope. Comments and blanks are copied through. A variable whose issue
//! call fails is replaced by an `# ERROR encrypting KEY` marker and the run
//! carries on. An assignment with no name becomes `# ERROR encrypting line N`;
//! its text is never copied out.

use std::path::Path;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use zkenv_client::TokenService;
use zkenv_core::config::EncryptConfig;
use zkenv_core::types::fingerprint;
use zkenv_core::{Protocol, ZkenvError, ZkenvResult};
use zkenv_crypto::{derive_key, seal, KeyMaterial, Pin};

use crate::envfile::{lines, parse_plain_line, write_atomic_async, PlainLine};
use crate::record::EncryptedRecord;
use crate::report::{EncryptReport, LineOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptOptions {
    pub protocol: Protocol,
    pub multi_use: bool,
    /// Issue calls in flight at once.
    pub concurrency: usize,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self {
            protocol: Protocol::PinV2,
            multi_use: false,
            concurrency: 4,
        }
    }
}

impl From<&EncryptConfig> for EncryptOptions {
    fn from(config: &EncryptConfig) -> Self {
        Self {
            protocol: config.protocol,
            multi_use: config.multi_use,
            concurrency: config.concurrency,
        }
    }
}

pub struct Encryptor<S> {
    service: S,
    options: EncryptOptions,
}

impl<S: TokenService> Encryptor<S> {
    pub fn new(service: S, options: EncryptOptions) -> Self {
        Self { service, options }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Encrypt file contents in memory. Output lines are in input order.
    ///
    /// Fails only if the protocol needs a PIN and none was given; per-variable
    /// failures are recorded in the report.
    pub async fn encrypt_str(
        &self,
        plaintext: &str,
        pin: Option<&Pin>,
    ) -> ZkenvResult<(String, EncryptReport)> {
        if self.options.protocol.requires_pin() && pin.is_none() {
            return Err(ZkenvError::PinRequired);
        }

        let parsed = lines(plaintext).map(parse_plain_line).enumerate();
        let results: Vec<(String, LineOutcome)> = stream::iter(parsed)
            .map(|(idx, line)| self.encrypt_line(idx + 1, line, pin))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut output = String::with_capacity(plaintext.len() * 2);
        let mut report = EncryptReport::default();
        for (text, outcome) in results {
            output.push_str(&text);
            report.lines.push(outcome);
        }
        Ok((output, report))
    }

    /// Read `source`, encrypt it, and atomically write the result to `dest`.
    ///
    /// `dest` is written even when some variables errored; it is left untouched
    /// if `source` cannot be read.
    pub async fn encrypt_file(
        &self,
        source: &Path,
        dest: &Path,
        pin: Option<&Pin>,
    ) -> ZkenvResult<EncryptReport> {
        let plaintext = tokio::fs::read_to_string(source).await?;
        let (output, report) = self.encrypt_str(&plaintext, pin).await?;
        write_atomic_async(dest, output).await?;

        info!(
            source = %source.display(),
            dest = %dest.display(),
            protocol = %self.options.protocol,
            emitted = report.emitted(),
            errored = report.errored().count(),
            "encrypted env file"
        );
        Ok(report)
    }

    async fn encrypt_line(
        &self,
        line_no: usize,
        line: PlainLine<'_>,
        pin: Option<&Pin>,
    ) -> (String, LineOutcome) {
        match line {
            PlainLine::Passthrough(raw) => (raw.to_string(), LineOutcome::Passthrough),
            PlainLine::MissingKey => {
                warn!(line = line_no, "assignment without a variable name, not copied");
                (
                    format!("# ERROR encrypting line {line_no}\n"),
                    LineOutcome::Errored {
                        name: format!("line {line_no}"),
                        error: ZkenvError::MalformedRecord(
                            "assignment without a variable name".into(),
                        ),
                    },
                )
            }
            PlainLine::Variable { key, value } => match self.seal_variable(key, value, pin).await {
                Ok(record) => {
                    debug!(
                        var = %key,
                        reference = %fingerprint(&record.reference),
                        "sealed variable"
                    );
                    (
                        format!("{record}\n"),
                        LineOutcome::Emitted {
                            name: key.to_string(),
                        },
                    )
                }
                Err(error) => {
                    warn!(var = %key, error = %error, "failed to encrypt variable");
                    (
                        format!("# ERROR encrypting {key}\n"),
                        LineOutcome::Errored {
                            name: key.to_string(),
                            error,
                        },
                    )
                }
            },
        }
    }

    async fn seal_variable(
        &self,
        name: &str,
        value: &str,
        pin: Option<&Pin>,
    ) -> ZkenvResult<EncryptedRecord> {
        let protocol = self.options.protocol;
        let pair = self.service.issue(self.options.multi_use).await?;

        let material = match protocol {
            Protocol::PairV1 => KeyMaterial::Pair {
                token_a: &pair.token_a,
                token_b: &pair.token_b,
            },
            Protocol::PinV2 => KeyMaterial::Pin {
                token_a: &pair.token_a,
                pin: pin.ok_or(ZkenvError::PinRequired)?,
            },
        };
        let key = derive_key(material)?;
        let envelope = seal(value.as_bytes(), &key)?;

        Ok(EncryptedRecord {
            name: name.to_string(),
            protocol,
            reference: protocol.reference_of(&pair).to_string(),
            envelope,
        })
    }
}
