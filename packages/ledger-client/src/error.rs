//! Error types for ledger operations.

use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failures reported by the ledger or the gateway in front of it.
///
/// Empty results (no proposals yet, no holders) are never errors; they come
/// back as empty collections or zero amounts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transport failure, timeout, or a gateway-side outage.
    #[error("network failure: {reason}")]
    NetworkFailure { reason: String },

    /// The transaction or call was rejected by the contract.
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The gateway throttled the request.
    #[error("rate limited: {reason}")]
    RateLimited { reason: String },

    /// The signer is connected to a different network than the contracts.
    #[error("unsupported network: expected {expected}, connected to {actual}")]
    UnsupportedNetwork { expected: String, actual: String },
}

impl LedgerError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::NetworkFailure {
            reason: reason.into(),
        }
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }

    pub fn rate_limited(reason: impl Into<String>) -> Self {
        Self::RateLimited {
            reason: reason.into(),
        }
    }

    /// Map a non-2xx gateway response onto the error taxonomy.
    ///
    /// 429 is throttling, other 4xx responses carry a contract rejection,
    /// everything else is treated as an outage.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let reason = if body.trim().is_empty() {
            format!("gateway returned HTTP {}", status)
        } else {
            body
        };
        match status {
            429 => Self::RateLimited { reason },
            400..=499 => Self::Reverted { reason },
            _ => Self::NetworkFailure { reason },
        }
    }

    /// Whether a read that failed this way is worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::RateLimited { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            Self::NetworkFailure { reason }
            | Self::Reverted { reason }
            | Self::RateLimited { reason } => reason.clone(),
            Self::UnsupportedNetwork { expected, actual } => {
                format!("expected {}, connected to {}", expected, actual)
            }
        }
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network(format!("request timed out: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}
