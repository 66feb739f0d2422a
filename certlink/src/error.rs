//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// The upstream variants carry enough classification for the backoff
/// executor to decide whether another attempt is worthwhile.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (DNS, connect, TLS, timeout). Retryable.
    #[error("Connection error with {service}: {message}")]
    ConnectionFailure {
        service: &'static str,
        message: String,
    },

    /// 4xx response other than 429. Never retried.
    #[error("Error in {service}: HTTP {status}: {body}")]
    UpstreamClientError {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// HTTP 429 from the upstream. Retryable.
    #[error("Rate limited by {service}: {body}")]
    UpstreamRateLimited { service: &'static str, body: String },

    /// 5xx (or any other non-success status outside 4xx). Retryable.
    #[error("Error in {service}: HTTP {status}: {body}")]
    UpstreamServerError {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Event already processed: {event_id}")]
    DuplicateEvent { event_id: String },

    #[error("Error after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an HTTP status into the matching upstream variant.
    pub fn from_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::UpstreamRateLimited { service, body },
            400..=499 => Self::UpstreamClientError {
                service,
                status,
                body,
            },
            _ => Self::UpstreamServerError {
                service,
                status,
                body,
            },
        }
    }

    pub fn connection(service: &'static str, message: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            service,
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// HTTP status reported by the upstream, if this error came from a response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamClientError { status, .. } | Self::UpstreamServerError { status, .. } => {
                Some(*status)
            }
            Self::UpstreamRateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Response body reported by the upstream, if any.
    pub fn upstream_body(&self) -> Option<&str> {
        match self {
            Self::UpstreamClientError { body, .. }
            | Self::UpstreamServerError { body, .. }
            | Self::UpstreamRateLimited { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Whether the upstream rejected the credential (HTTP 401).
    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.upstream_status() == Some(401)
    }

    /// Errors the backoff executor classified itself: these are re-raised
    /// unchanged once attempts run out instead of being wrapped.
    #[inline]
    pub fn is_classified(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure { .. }
                | Self::UpstreamClientError { .. }
                | Self::UpstreamRateLimited { .. }
                | Self::UpstreamServerError { .. }
        )
    }

    /// Check if this error is transient and another attempt may succeed.
    ///
    /// 4xx client errors (excluding 429) and an exhausted credential
    /// fallback are terminal; everything else, including unclassified
    /// failures, is retried.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UpstreamClientError { .. } | Self::CredentialUnavailable(_)
        )
    }
}
