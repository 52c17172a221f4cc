//! Error taxonomy for drone-deploy.
//!
//! Two families with different blast radii:
//! - [`ConfigError`]: fatal. Raised before any network activity.
//! - [`FetchError`]: scoped to one repository. The walker and report builder
//!   record it and move on to the next repository.

use thiserror::Error;

/// Fatal misconfiguration: missing environment, malformed config document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// The configuration document does not have the expected shape.
    #[error("invalid config at '{path}': {reason}")]
    InvalidConfig { path: String, reason: String },

    /// The configuration document is not valid YAML.
    #[error("config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Reading or writing the configuration document failed.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The deploy target string is empty.
    #[error("deploy target must not be empty")]
    EmptyDeployTarget,
}

impl ConfigError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to retrieve data for a single repository.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP client could not be constructed.
    #[error("http client error: {0}")]
    Client(String),

    /// The request never produced a response (DNS, TLS, connect, timeout).
    #[error("request to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    /// The server answered with something other than 200.
    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body was not the JSON shape we expected.
    #[error("could not decode response from {url}: {detail}")]
    Decode { url: String, detail: String },

    /// The overall walk deadline passed before this repository was fetched.
    #[error("deadline exceeded before the request completed")]
    DeadlineExceeded,
}

/// Umbrella error for callers that only need to propagate.
#[derive(Debug, Error)]
pub enum DroneError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Result type for drone-deploy operations.
pub type Result<T> = std::result::Result<T, DroneError>;
