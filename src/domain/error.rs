use thiserror::Error;

/// Caller input that cannot be turned into a render request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid option `{key}`: {reason}")]
    InvalidOption { key: &'static str, reason: String },
    #[error("malformed query string: {0}")]
    Query(String),
    #[error("malformed request body: {0}")]
    Body(String),
    #[error("{submitted} pages submitted; at most {limit} are accepted")]
    TooManyPages { submitted: usize, limit: usize },
}

impl RequestError {
    pub fn invalid_option(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            key,
            reason: reason.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }
}
