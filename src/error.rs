use serde::Serialize;
use thiserror::Error;

/// Failure of a single upstream adapter call.
///
/// Adapter errors never escape the sync orchestrator; they are folded into the
/// per-provider report. Messages must not carry credentials or raw upstream
/// bodies since they end up in API responses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// Connection refused, DNS failure, timeout.
    #[error("{provider} unreachable: {message}")]
    Unreachable { provider: String, message: String },

    /// The provider answered but the payload could not be used.
    #[error("{provider} returned a bad response: {message}")]
    BadResponse { provider: String, message: String },

    /// Quota exhausted or HTTP 429.
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    /// Missing, invalid or restricted access key.
    #[error("{provider} rejected credentials: {message}")]
    AuthRejected { provider: String, message: String },
}

impl AdapterError {
    pub fn unreachable(provider: &str, message: impl Into<String>) -> Self {
        Self::Unreachable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn bad_response(provider: &str, message: impl Into<String>) -> Self {
        Self::BadResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn auth_rejected(provider: &str, message: impl Into<String>) -> Self {
        Self::AuthRejected {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } => FailureKind::AdapterUnreachable,
            Self::BadResponse { .. } => FailureKind::AdapterBadResponse,
            Self::RateLimited { .. } => FailureKind::AdapterRateLimited,
            Self::AuthRejected { .. } => FailureKind::AdapterAuthRejected,
        }
    }

    /// The message without the provider prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Unreachable { message, .. }
            | Self::BadResponse { message, .. }
            | Self::RateLimited { message, .. }
            | Self::AuthRejected { message, .. } => message,
        }
    }
}

/// Kind of a per-provider failure as it appears in a sync report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    AdapterUnreachable,
    AdapterBadResponse,
    AdapterRateLimited,
    AdapterAuthRejected,
    /// The fetch succeeded but the run could not be written.
    Storage,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored rate for {currency} is not representable: {value}")]
    InvalidRate { currency: String, value: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    /// No provider in the priority order supplied any rate.
    #[error("no provider supplied rates")]
    EmptyProviderSet,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("no data available")]
    NoDataAvailable,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<MergeError> for QueryError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::EmptyProviderSet => QueryError::NoDataAvailable,
        }
    }
}
