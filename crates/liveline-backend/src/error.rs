use liveline_bridge::BridgeError;
use liveline_core::config::ConfigError;
use thiserror::Error;

/// The error type returned by server app methods.
#[derive(Error, Debug)]
pub enum ServerAppError {
    /// failed to parse queries.
    #[error("failed to parse queries")]
    Queries(#[from] serde_urlencoded::de::Error),

    /// failed to read from the bridge.
    #[error("failed to resolve queries of the request")]
    Bridge(#[from] BridgeError),

    /// the backend is not configured.
    #[error("failed to configure the backend")]
    Config(#[from] ConfigError),

    /// failed to write the html document.
    #[error("failed to render html")]
    Html(#[from] lol_html::errors::RewritingError),
}

/// The result type returned by server app methods.
pub type ServerAppResult<T> = Result<T, ServerAppError>;
