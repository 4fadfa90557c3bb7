//! Error types for bosun

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for bosun
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider error (network, parse, process)
    #[error("Provider error in '{provider}': {message}")]
    Provider {
        /// Provider type selector
        provider: String,
        /// Error message
        message: String,
    },

    /// Operation not supported by this provider or backend
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Plugin could not be resolved by any backend
    #[error("Plugin is not known by repo resolver(s): {0}")]
    NotResolved(String),

    /// Resolved source kind is not one the runtime can fetch
    #[error("Plugin source type is not supported: {0}")]
    UnsupportedSource(String),

    /// Change payload has the wrong shape
    #[error("Malformed change payload: {0}")]
    MalformedPayload(String),

    /// Host plugin store or module manager failure
    #[error("Host error: {0}")]
    Host(String),

    /// Process control error
    #[error("Process error: {0}")]
    Process(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a host error
    pub fn host(message: impl std::fmt::Display) -> Self {
        Error::Host(message.to_string())
    }

    /// Create a configuration error
    pub fn config(message: impl std::fmt::Display) -> Self {
        Error::Config(message.to_string())
    }

    /// Whether the error is a lookup miss rather than a failure
    pub fn is_miss(&self) -> bool {
        matches!(self, Error::NotResolved(_) | Error::UnsupportedSource(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error() {
        let err = Error::provider("http", "status 404");
        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(err.to_string(), "Provider error in 'http': status 404");
    }

    #[test]
    fn test_miss_classification() {
        assert!(Error::NotResolved("demo".to_string()).is_miss());
        assert!(Error::UnsupportedSource("svn".to_string()).is_miss());
        assert!(!Error::host("store offline").is_miss());
    }
}
