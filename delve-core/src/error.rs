//! Error types for the Delve research engine.
//!
//! Uses `thiserror` for public API error types. Provider failures are
//! structured so the orchestrator can distinguish transport faults from
//! breaker rejections and malformed payloads; under normal operation none
//! of them escape a research run.

/// Top-level error type for the Delve core library.
#[derive(Debug, thiserror::Error)]
pub enum DelveError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Research query must not be empty")]
    EmptyQuery,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from external provider interactions (planner, search, writer,
/// generative model, similarity index).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Request to {provider} failed: {message}")]
    Http { provider: String, message: String },

    #[error("{provider} connection failed: {message}")]
    Connection { provider: String, message: String },

    #[error("{provider} timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("Rate limited by {provider}, retry after {retry_after_secs}s")]
    RateLimited {
        provider: String,
        retry_after_secs: u64,
    },

    #[error("{provider} returned a malformed payload: {message}")]
    MalformedPayload { provider: String, message: String },

    /// Raised by the circuit breaker itself when it refuses a call; never
    /// produced by a provider.
    #[error("Circuit breaker open for {provider}")]
    CircuitOpen { provider: String },
}

impl ProviderError {
    /// The provider name this error is attributed to.
    pub fn provider(&self) -> &str {
        match self {
            Self::Http { provider, .. }
            | Self::Connection { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::MalformedPayload { provider, .. }
            | Self::CircuitOpen { provider } => provider,
        }
    }

    /// Whether this error is a breaker rejection rather than a provider
    /// fault. Breaker rejections must not feed back into the failure count.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: std::path::PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, DelveError>;
