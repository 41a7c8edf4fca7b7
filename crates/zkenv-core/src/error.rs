use thiserror::Error;

pub type ZkenvResult<T> = Result<T, ZkenvError>;

/// Failure taxonomy shared by the client, the orchestrators and the custodian.
///
/// Everything except `Io` and `Config` is scoped to a single variable: the
/// orchestrators record it against that variable and keep going.
#[derive(Debug, Error)]
pub enum ZkenvError {
    #[error("token service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("token service rate limit hit (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("token not found or already consumed")]
    TokenNotFound,

    #[error("authentication failed: wrong PIN, wrong token, or corrupted data")]
    Authentication,

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("PIN must be exactly 6 digits")]
    PinFormat,

    #[error("a PIN is required for PIN-protected records")]
    PinRequired,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ZkenvError {
    /// Short stable label, used in reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ZkenvError::ServiceUnavailable(_) => "service_unavailable",
            ZkenvError::RateLimited { .. } => "rate_limited",
            ZkenvError::TokenNotFound => "token_not_found",
            ZkenvError::Authentication => "authentication",
            ZkenvError::MalformedRecord(_) => "malformed_record",
            ZkenvError::PinFormat => "pin_format",
            ZkenvError::PinRequired => "pin_required",
            ZkenvError::Config(_) => "config",
            ZkenvError::Io(_) => "io",
            ZkenvError::Other(_) => "other",
        }
    }
}
