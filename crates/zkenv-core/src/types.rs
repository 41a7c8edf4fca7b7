use serde::{Deserialize, Serialize};

/// A freshly issued token pair. Both halves are base64url (no padding).
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_a: String,
    pub token_b: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("token_a", &"[REDACTED]")
            .field("token_b", &fingerprint(&self.token_b))
            .finish()
    }
}

/// Key derivation and file layout variant of an encrypted record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// Pair-only derivation, tokenA stored in the file, tagged `v1.` on disk.
    #[serde(rename = "pair")]
    PairV1,
    /// tokenA‖PIN derivation, tokenB stored in the file, untagged on disk.
    #[serde(rename = "pin")]
    #[default]
    PinV2,
}

impl Protocol {
    pub fn requires_pin(self) -> bool {
        matches!(self, Protocol::PinV2)
    }

    /// Which half of an issued pair is written to the file.
    pub fn reference_of(self, pair: &TokenPair) -> &str {
        match self {
            Protocol::PairV1 => &pair.token_a,
            Protocol::PinV2 => &pair.token_b,
        }
    }

    /// The resolve call to make for a reference read back from the file.
    pub fn known_half(self, reference: &str) -> KnownHalf {
        match self {
            Protocol::PairV1 => KnownHalf::TokenA(reference.to_string()),
            Protocol::PinV2 => KnownHalf::TokenB(reference.to_string()),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::PairV1 => f.write_str("pair"),
            Protocol::PinV2 => f.write_str("pin"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pair" | "v1" => Ok(Protocol::PairV1),
            "pin" | "v2" => Ok(Protocol::PinV2),
            other => Err(format!("unknown protocol '{other}' (expected 'pin' or 'pair')")),
        }
    }
}

/// The half a caller holds when asking the custodian for the other one.
#[derive(Clone, PartialEq, Eq)]
pub enum KnownHalf {
    TokenA(String),
    TokenB(String),
}

impl KnownHalf {
    pub fn as_str(&self) -> &str {
        match self {
            KnownHalf::TokenA(t) | KnownHalf::TokenB(t) => t,
        }
    }
}

impl std::fmt::Debug for KnownHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnownHalf::TokenA(t) => write!(f, "TokenA({})", fingerprint(t)),
            KnownHalf::TokenB(t) => write!(f, "TokenB({})", fingerprint(t)),
        }
    }
}

/// Result of a resolve call.
///
/// `token_b` is always the deletion handle: in the legacy flow it is the
/// counterpart, in the PIN flow it is the reference the caller already had.
#[derive(Clone)]
pub struct Resolution {
    pub counterpart: String,
    pub token_b: String,
    pub should_delete: bool,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("counterpart", &"[REDACTED]")
            .field("token_b", &fingerprint(&self.token_b))
            .field("should_delete", &self.should_delete)
            .finish()
    }
}

/// First eight characters of a token, for log lines.
pub fn fingerprint(token: &str) -> String {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    format!("{}…", &token[..end])
}

// ── Wire types (custodian HTTP API) ──────────────────────────────────────────

/// `POST /tokens`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
}

/// `POST /tokens/get` and `POST /tokens/delete`
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenBRequest {
    pub token_b: String,
}

/// `POST /tokens/get` response
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenAResponse {
    pub token_a: String,
    #[serde(default)]
    pub should_delete: bool,
}

/// `POST /decrypt` (legacy pair-only resolve)
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenARequest {
    pub token_a: String,
}

/// `POST /decrypt` response
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenBResponse {
    pub token_b: String,
    #[serde(default)]
    pub should_delete: bool,
}
