use thiserror::Error;

/// Errors from the exchange boundary.
///
/// The split matters to the position lifecycle: a request that was
/// definitely never accepted can simply be abandoned, anything else might
/// have reached the matching engine and has to be treated as placed.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection never established; the request was not sent
    #[error("exchange unreachable: {0}")]
    Unreachable(String),

    /// Failure after the request left this process
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// Error body returned by the exchange
    #[error("exchange error (HTTP {status}) code {code}: {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// Response arrived but could not be understood
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Rejected locally before anything was sent
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ExchangeError {
    /// Parse a Binance error body (`{"code": -2019, "msg": "..."}`)
    pub fn from_response(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ApiErrorBody {
            code: i64,
            msg: String,
        }

        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(err) => Self::Api {
                status,
                code: err.code,
                message: err.msg,
            },
            Err(_) => Self::Api {
                status,
                code: 0,
                message: body.chars().take(200).collect(),
            },
        }
    }

    /// True only when the exchange cannot have acted on the request
    pub fn is_definitely_not_placed(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::InvalidRequest(_) => true,
            Self::Api { status, .. } => (400..500).contains(status) && *status != 408,
            _ => false,
        }
    }

    /// Transient failures worth retrying for idempotent reads
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Network(_) | Self::Timeout => true,
            Self::Api { status, code, .. } => {
                *status >= 500 || *status == 429 || *status == 408 || matches!(code, -1001 | -1003 | -1007)
            }
            Self::Decode(_) | Self::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_error() {
        let err = ExchangeError::from_response(400, r#"{"code":-2019,"msg":"Margin is insufficient."}"#);
        match &err {
            ExchangeError::Api { status, code, message } => {
                assert_eq!(*status, 400);
                assert_eq!(*code, -2019);
                assert_eq!(message, "Margin is insufficient.");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.is_definitely_not_placed());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_status_is_ambiguous() {
        let err = ExchangeError::from_response(
            503,
            r#"{"code":-1007,"msg":"Timeout waiting for response from backend server. Send status unknown; execution status unknown."}"#,
        );
        assert!(!err.is_definitely_not_placed());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unparseable_body() {
        let err = ExchangeError::from_response(502, "<html>Bad Gateway</html>");
        assert!(matches!(err, ExchangeError::Api { code: 0, .. }));
    }

    #[test]
    fn test_timeout_is_ambiguous() {
        assert!(!ExchangeError::Timeout.is_definitely_not_placed());
        assert!(ExchangeError::Timeout.is_retryable());
        assert!(ExchangeError::Unreachable("refused".into()).is_definitely_not_placed());
    }
}
