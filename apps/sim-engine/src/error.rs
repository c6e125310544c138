//! Error kinds raised by the simulation core.
//!
//! Every error carries a numeric wire code in the broker's error envelope
//! scheme:
//!
//! | Class | Meaning |
//! |-------|---------|
//! | 40010xxx | Bad request / validation |
//! | 40110xxx | Authentication |
//! | 40410000 | Not found |
//! | 42910000 | Rate limited |
//! | 5xx10000 | Server-side |

use thiserror::Error;

/// Errors raised by the simulation core and surfaced on the wire.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    /// Malformed or inconsistent input.
    #[error("{message}")]
    InvalidArgument {
        /// Human-readable description; joins all validator violations.
        message: String,
        /// First offending field, when known.
        field: Option<String>,
    },

    /// Missing or bad credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Unknown session, account, order, symbol, or bar.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation conflicts with current state (terminal order, exhausted
    /// clock, duplicate client order id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Buying-power check failed.
    #[error("insufficient buying power: {0}")]
    InsufficientFunds(String),

    /// Pattern-day-trader restriction hit.
    #[error("pattern day trading restriction: {0}")]
    PdtViolation(String),

    /// Declared but unsupported feature (trailing-stop fill, close-position).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Downstream store outage after retries.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SimError {
    /// Invalid argument without a field tag.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: None,
        }
    }

    /// Invalid argument tagged with the offending field.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Numeric code used in the wire error envelope.
    #[must_use]
    pub const fn wire_code(&self) -> u32 {
        match self {
            Self::InvalidArgument { .. } => 400_10001,
            Self::InsufficientFunds(_) => 400_10002,
            Self::PdtViolation(_) => 400_10003,
            Self::Conflict(_) => 400_10004,
            Self::Unauthenticated(_) => 401_10000,
            Self::NotFound(_) => 404_10000,
            Self::Internal(_) => 500_10000,
            Self::NotImplemented(_) => 501_10000,
            Self::Unavailable(_) => 503_10000,
        }
    }

    /// HTTP status this error surfaces as.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArgument { .. } | Self::InsufficientFunds(_) | Self::PdtViolation(_) => {
                400
            }
            Self::Unauthenticated(_) => 401,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Internal(_) => 500,
            Self::NotImplemented(_) => 501,
            Self::Unavailable(_) => 503,
        }
    }

    /// First offending field, for the envelope's optional `field` entry.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Only store outages are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
