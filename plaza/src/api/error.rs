use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The server answered, but not with the shape this endpoint promises
    #[error("Unexpected response from {endpoint}: {reason}")]
    Schema { endpoint: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// Map a failed HTTP status and its extracted message onto a variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => ApiError::BadRequest(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            _ => ApiError::Api { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Short text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(e) if e.is_timeout() => {
                "The server took too long to respond".to_string()
            }
            ApiError::Network(e) if e.is_connect() => {
                "Cannot reach the server. Is it running?".to_string()
            }
            ApiError::Network(_) => "Network error, please try again".to_string(),
            ApiError::Schema { .. } => "The server sent an unexpected response".to_string(),
            ApiError::Api { message, .. }
            | ApiError::NotFound(message)
            | ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::BadRequest(message) => message.clone(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
