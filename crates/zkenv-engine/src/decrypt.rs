//! `.zk.env` → recovered values
//!
//! Per record: resolve, derive, open, and only then delete. A resolve never
//! consumes a pair and a failed open never triggers a delete, so a wrong PIN
//! can be retried without losing the token.

use futures::future;
use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use tracing::{debug, warn};
use zkenv_client::TokenService;
use zkenv_core::types::fingerprint;
use zkenv_core::{Protocol, ZkenvError, ZkenvResult};
use zkenv_crypto::{derive_key, open, KeyMaterial, Pin};

use crate::record::{parse_encrypted, EncLine, EncryptedRecord};
use crate::report::{DecryptReport, Deletion, RecordOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptOptions {
    /// Resolve calls in flight at once.
    pub concurrency: usize,
}

impl Default for DecryptOptions {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

pub struct Decryptor<S> {
    service: S,
    options: DecryptOptions,
}

impl<S: TokenService> Decryptor<S> {
    pub fn new(service: S, options: DecryptOptions) -> Self {
        Self { service, options }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Decrypt every record in `contents`. Outcomes are in file order.
    pub async fn decrypt_str(&self, contents: &str, pin: Option<&Pin>) -> DecryptReport {
        self.decrypt_lines(parse_encrypted(contents), pin).await
    }

    /// Decrypt lines already parsed with [`parse_encrypted`].
    ///
    /// PIN records are marked `PinRequired` without touching the custodian when
    /// `pin` is `None`; pair-only records in the same file are still processed.
    pub async fn decrypt_lines(&self, parsed: Vec<EncLine>, pin: Option<&Pin>) -> DecryptReport {
        let outcomes = stream::iter(parsed)
            .map(|line| self.decrypt_line(line, pin))
            .buffered(self.options.concurrency.max(1))
            .filter_map(future::ready)
            .collect()
            .await;
        DecryptReport { outcomes }
    }

    async fn decrypt_line(&self, line: EncLine, pin: Option<&Pin>) -> Option<RecordOutcome> {
        let outcome = match line {
            EncLine::Record(record) => {
                let name = record.name.clone();
                match self.recover(&record, pin).await {
                    Ok((value, deletion)) => RecordOutcome::Recovered {
                        name,
                        value,
                        deletion,
                    },
                    Err(error) => {
                        warn!(
                            var = %name,
                            kind = error.kind(),
                            error = %error,
                            "skipping variable"
                        );
                        RecordOutcome::Failed { name, error }
                    }
                }
            }
            EncLine::Malformed { name, reason } => {
                warn!(var = %name, reason = %reason, "skipping malformed record");
                RecordOutcome::SkippedMalformed { name, reason }
            }
            EncLine::Ignored => return None,
        };
        Some(outcome)
    }

    async fn recover(
        &self,
        record: &EncryptedRecord,
        pin: Option<&Pin>,
    ) -> ZkenvResult<(SecretString, Deletion)> {
        if record.protocol.requires_pin() && pin.is_none() {
            return Err(ZkenvError::PinRequired);
        }

        let resolution = self
            .service
            .resolve(&record.protocol.known_half(&record.reference))
            .await?;

        let material = match (record.protocol, pin) {
            (Protocol::PairV1, _) => KeyMaterial::Pair {
                token_a: &record.reference,
                token_b: &resolution.counterpart,
            },
            (Protocol::PinV2, Some(pin)) => KeyMaterial::Pin {
                token_a: &resolution.counterpart,
                pin,
            },
            (Protocol::PinV2, None) => return Err(ZkenvError::PinRequired),
        };
        let key = derive_key(material)?;
        let plaintext = open(&record.envelope, &key)?;
        let value = String::from_utf8(plaintext).map_err(|_| {
            ZkenvError::MalformedRecord("decrypted value is not valid UTF-8".into())
        })?;

        let deletion = if resolution.should_delete {
            match self.service.delete(&resolution.token_b).await {
                Ok(()) => {
                    debug!(
                        var = %record.name,
                        token_b = %fingerprint(&resolution.token_b),
                        "consumed single-use pair"
                    );
                    Deletion::Deleted
                }
                Err(e) => {
                    warn!(
                        var = %record.name,
                        error = %e,
                        "value recovered but pair deletion failed"
                    );
                    Deletion::Failed(e)
                }
            }
        } else {
            Deletion::NotRequested
        };

        Ok((SecretString::from(value), deletion))
    }
}
