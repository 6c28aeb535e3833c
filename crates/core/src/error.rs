use std::fmt;

/// Why a remote fetch did not produce a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The request never completed (connect, timeout, body read).
    Network { detail: String },
    /// The backend answered with a non-2xx status.
    Server {
        status: u16,
        detail: Option<String>,
    },
    /// A 2xx body that does not match the expected contract.
    Decode { detail: String },
}

impl FetchError {
    pub fn network(err: impl fmt::Display) -> Self {
        Self::Network {
            detail: err.to_string(),
        }
    }

    pub fn decode(err: impl fmt::Display) -> Self {
        Self::Decode {
            detail: err.to_string(),
        }
    }

    /// The server-provided `detail` message, if any. Only this is shown to users;
    /// transport and decode details stay in the logs.
    pub fn user_detail(&self) -> Option<&str> {
        match self {
            Self::Server {
                detail: Some(detail),
                ..
            } if !detail.trim().is_empty() => Some(detail.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { detail } => write!(f, "network error: {detail}"),
            Self::Server {
                status,
                detail: Some(detail),
            } => write!(f, "server error (status={status}): {detail}"),
            Self::Server {
                status,
                detail: None,
            } => write!(f, "server error (status={status})"),
            Self::Decode { detail } => write!(f, "invalid response body: {detail}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// A numeric input outside the domain a pure transform accepts (NaN, infinity).
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidInputError {
    pub field: String,
    pub value: f64,
}

impl InvalidInputError {
    pub fn new(field: impl Into<String>, value: f64) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

impl fmt::Display for InvalidInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid numeric input (field={}): {} is not finite",
            self.field, self.value
        )
    }
}

impl std::error::Error for InvalidInputError {}

pub(crate) fn ensure_finite(field: &str, value: f64) -> Result<f64, InvalidInputError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InvalidInputError::new(field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_detail_only_exposes_server_detail() {
        let server = FetchError::Server {
            status: 404,
            detail: Some("No score found for ticker 'ZZZZ'.".to_string()),
        };
        assert_eq!(server.user_detail(), Some("No score found for ticker 'ZZZZ'."));

        let blank = FetchError::Server {
            status: 500,
            detail: Some("  ".to_string()),
        };
        assert_eq!(blank.user_detail(), None);

        assert_eq!(FetchError::network("connection refused").user_detail(), None);
        assert_eq!(FetchError::decode("missing field").user_detail(), None);
    }

    #[test]
    fn ensure_finite_rejects_nan_and_infinity() {
        assert_eq!(ensure_finite("x", 1.5), Ok(1.5));
        assert!(ensure_finite("x", f64::NAN).is_err());
        let err = ensure_finite("delta", f64::INFINITY).unwrap_err();
        assert_eq!(err.field, "delta");
    }
}
