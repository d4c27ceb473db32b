use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True only for user-initiated cancellation; timeouts and network
    /// failures are ordinary errors.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Connection(_) | Error::Timeout(_) | Error::Stream(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::api(500, "session not found");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("session not found"));
        assert_eq!(Error::Cancelled.to_string(), "Request cancelled");
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Timeout("send".into()).is_cancelled());
        assert!(!Error::network("reset").is_cancelled());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::network("timeout").is_retryable());
        assert!(Error::connection("feed closed").is_retryable());
        assert!(!Error::api(400, "bad").is_retryable());
    }
}
