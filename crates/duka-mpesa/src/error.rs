//! Gateway error types.

use thiserror::Error;

/// Errors from talking to (or hearing from) the Daraja API.
///
/// ## What The Engine Does With Each
/// ```text
/// Rejected        → payment + sale marked failed, caller gets 502
/// Unreachable     → left pending for reconciliation, caller gets 504
/// Timeout         → same as Unreachable
/// Auth            → same as Unreachable (credentials are an operator problem)
/// InvalidResponse → same as Unreachable (we can't tell what happened)
/// InvalidRequest  → nothing was sent
/// BadCallback     → logged, acknowledged, nothing applied
/// Config          → startup failure
/// ```
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Daraja answered and said no.
    #[error("Gateway rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Network failure or a 5xx from Daraja.
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    /// No answer within the configured timeout.
    #[error("Gateway request timed out")]
    Timeout,

    /// OAuth token request failed.
    #[error("Gateway authentication failed: {0}")]
    Auth(String),

    /// Answer we couldn't make sense of.
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// Request failed local checks before being sent.
    #[error("Invalid gateway request: {0}")]
    InvalidRequest(String),

    /// Inbound callback body we couldn't parse.
    #[error("Malformed callback: {0}")]
    BadCallback(String),

    /// Misconfigured client.
    #[error("Gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// True when the outcome of the request is unknown, so the payment
    /// should stay pending rather than be marked failed.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            GatewayError::Unreachable(_)
                | GatewayError::Timeout
                | GatewayError::Auth(_)
                | GatewayError::InvalidResponse(_)
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Unreachable(err.to_string())
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indeterminate_errors() {
        assert!(GatewayError::Timeout.is_indeterminate());
        assert!(GatewayError::Unreachable("reset".into()).is_indeterminate());
        assert!(!GatewayError::Rejected {
            code: "400.002.02".into(),
            message: "Bad Request - Invalid PhoneNumber".into()
        }
        .is_indeterminate());
        assert!(!GatewayError::InvalidRequest("amount".into()).is_indeterminate());
    }
}
