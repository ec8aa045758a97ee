//! Collaborator failure taxonomy

use crate::limiter::RateExceeded;
use crate::records::FailureKind;
use thiserror::Error;

/// Why a collaborator call produced no records
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("rate limit exceeded")]
    RateExceeded,
    #[error("request timed out")]
    Timeout,
    #[error("not found")]
    NotFound,
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to parse response: {0}")]
    ParseError(String),
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Failure kind reported in assessment metadata.
    /// A cancelled call ran out of time, so it reports as a timeout.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateExceeded => FailureKind::RateExceeded,
            Self::Timeout | Self::Cancelled => FailureKind::Timeout,
            Self::NotFound => FailureKind::NotFound,
            Self::Unavailable(_) => FailureKind::Unavailable,
            Self::ParseError(_) => FailureKind::ParseError,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }

    pub fn parse(message: impl std::fmt::Display) -> Self {
        Self::ParseError(message.to_string())
    }
}

impl From<RateExceeded> for FetchError {
    fn from(_: RateExceeded) -> Self {
        Self::RateExceeded
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else if let Some(status) = err.status() {
            crate::network::classify_status(status.as_u16())
                .unwrap_or_else(|| Self::Unavailable(err.to_string()))
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_transience() {
        assert_eq!(FetchError::Cancelled.kind(), FailureKind::Timeout);
        assert_eq!(FetchError::parse("bad xml").kind(), FailureKind::ParseError);
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Unavailable("503".into()).is_transient());
        assert!(!FetchError::RateExceeded.is_transient());
        assert!(!FetchError::NotFound.is_transient());
    }
}
