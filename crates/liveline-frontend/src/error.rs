use liveline_bridge::BridgeError;
use thiserror::Error;

/// An error that can occur while starting a client scope.
#[derive(Error, Debug)]
pub enum FrontendError {
    /// The bridge failed, or the state of the page could not be decoded.
    #[error("failed to start client scope")]
    Bridge(#[from] BridgeError),

    /// The page could not be read.
    #[error("failed to read page")]
    Html(#[from] lol_html::errors::RewritingError),
}

/// A result type that may contain a [`FrontendError`].
pub type FrontendResult<T> = Result<T, FrontendError>;
