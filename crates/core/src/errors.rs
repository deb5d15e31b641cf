use thiserror::Error;

/// Unified error type for the entire folio-core library.
/// Every public function returns `Result<T, CoreError>`.
///
/// `Clone` is required: one deduplicated fetch outcome is handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Upstream / Parsing ──────────────────────────────────────────
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No fetcher configured for source: {0}")]
    NoProvider(String),

    // ── Store / File ────────────────────────────────────────────────
    #[error("Invalid store file: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported store version: {0}")]
    UnsupportedVersion(u16),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Price not available for {symbol} on {date}")]
    PriceNotAvailable { symbol: String, date: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Classification of an upstream provider failure. Callers never see raw
/// HTTP status codes, only one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpstreamErrorKind {
    RateLimited,
    NotFound,
    Timeout,
    HttpError,
    Malformed,
}

impl UpstreamErrorKind {
    /// Map an HTTP status to a failure kind; `None` for success.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(UpstreamErrorKind::RateLimited),
            404 => Some(UpstreamErrorKind::NotFound),
            _ => Some(UpstreamErrorKind::HttpError),
        }
    }
}

impl std::fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamErrorKind::RateLimited => write!(f, "rate limited"),
            UpstreamErrorKind::NotFound => write!(f, "not found"),
            UpstreamErrorKind::Timeout => write!(f, "timeout"),
            UpstreamErrorKind::HttpError => write!(f, "http error"),
            UpstreamErrorKind::Malformed => write!(f, "malformed response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{provider} {kind}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub provider: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(
        kind: UpstreamErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::RateLimited, provider, message)
    }

    pub fn not_found(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, provider, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Timeout, provider, message)
    }

    pub fn http(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::HttpError, provider, message)
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Malformed, provider, message)
    }

    /// Build an error from a transport-level failure, redacting query strings
    /// so API keys never end up in messages or logs.
    pub fn from_transport(provider: impl Into<String>, e: &reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if e.is_decode() {
            UpstreamErrorKind::Malformed
        } else {
            UpstreamErrorKind::HttpError
        };
        Self::new(kind, provider, redact_query(&e.to_string()))
    }
}

/// Failure to turn a provider payload into a `Quote`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("No series data for {0}")]
    NoSeriesData(String),

    #[error("No usable price field for {0}")]
    MissingPriceField(String),
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Upstream(UpstreamError::from_transport("http", &e))
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::Task(e.to_string())
    }
}

/// Strip everything after the first `?` of a message containing a URL.
pub(crate) fn redact_query(msg: &str) -> String {
    match msg.find('?') {
        Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
        None => msg.to_string(),
    }
}
