//! Encrypted record lines
//!
//! ```text
//! NAME_ENC=<tokenB>:<envelope>         PIN protocol (untagged)
//! NAME_ENC=v1.<tokenA>:<envelope>      pair-only protocol
//! ```
//!
//! Tokens are base64url, so a `.` before the first `:` can only be a version tag.

use zkenv_core::{Protocol, ZkenvError, ZkenvResult};
use zkenv_crypto::Envelope;

use crate::envfile::lines;

/// Suffix appended to a variable name in the encrypted file.
pub const ENC_SUFFIX: &str = "_ENC";

const PAIR_TAG: &str = "v1";
const PIN_TAG: &str = "v2";

/// One `NAME_ENC=` line, fully parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub name: String,
    pub protocol: Protocol,
    pub reference: String,
    pub envelope: Envelope,
}

impl std::fmt::Display for EncryptedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}=", self.name, ENC_SUFFIX)?;
        if self.protocol == Protocol::PairV1 {
            write!(f, "{PAIR_TAG}.")?;
        }
        write!(f, "{}:{}", self.reference, self.envelope)
    }
}

/// Classification of one line of an encrypted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncLine {
    Record(EncryptedRecord),
    /// Looked like a record (`NAME_ENC=`) but the value could not be parsed.
    Malformed { name: String, reason: String },
    /// Comments, blanks, and any variable without the `_ENC` suffix.
    Ignored,
}

pub fn parse_encrypted_line(line: &str) -> EncLine {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return EncLine::Ignored;
    }
    let Some((key, value)) = stripped.split_once('=') else {
        return EncLine::Ignored;
    };
    let Some(name) = key.trim().strip_suffix(ENC_SUFFIX) else {
        return EncLine::Ignored;
    };
    if name.is_empty() {
        return EncLine::Ignored;
    }

    match parse_record_value(value.trim()) {
        Ok((protocol, reference, envelope)) => EncLine::Record(EncryptedRecord {
            name: name.to_string(),
            protocol,
            reference: reference.to_string(),
            envelope,
        }),
        Err(e) => EncLine::Malformed {
            name: name.to_string(),
            reason: match e {
                ZkenvError::MalformedRecord(reason) => reason,
                other => other.to_string(),
            },
        },
    }
}

/// Parse every line of an encrypted file, dropping the ignored ones.
pub fn parse_encrypted(contents: &str) -> Vec<EncLine> {
    lines(contents)
        .map(parse_encrypted_line)
        .filter(|l| !matches!(l, EncLine::Ignored))
        .collect()
}

/// Whether decrypting these lines needs a PIN.
pub fn records_require_pin(parsed: &[EncLine]) -> bool {
    parsed
        .iter()
        .any(|l| matches!(l, EncLine::Record(r) if r.protocol.requires_pin()))
}

fn parse_record_value(value: &str) -> ZkenvResult<(Protocol, &str, Envelope)> {
    let (head, envelope_text) = value
        .split_once(':')
        .ok_or_else(|| ZkenvError::MalformedRecord("missing ':' separator".into()))?;

    let (protocol, reference) = match head.split_once('.') {
        None => (Protocol::PinV2, head),
        Some((PAIR_TAG, rest)) => (Protocol::PairV1, rest),
        Some((PIN_TAG, rest)) => (Protocol::PinV2, rest),
        Some((tag, _)) => {
            return Err(ZkenvError::MalformedRecord(format!(
                "unknown record version '{tag}'"
            )))
        }
    };

    if reference.is_empty() {
        return Err(ZkenvError::MalformedRecord("empty reference token".into()));
    }
    if !reference
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(ZkenvError::MalformedRecord(
            "reference token is not base64url".into(),
        ));
    }

    let envelope = Envelope::from_text(envelope_text)?;
    Ok((protocol, reference, envelope))
}
