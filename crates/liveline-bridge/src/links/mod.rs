//! The links used to reach a reactive backend.
//!
//! A link exposes the two primitives the bridge depends on: a live subscription that delivers a
//! stream of values and a one-shot call. For server-sided scopes, a new link should be created
//! for each request.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use liveline_core::config::Endpoint;
use serde_json::Value;
use thiserror::Error;

use crate::error::RemotePayload;
use crate::key::Descriptor;
use crate::{BridgeError, BridgeResult};

mod local_link;

pub use local_link::LocalLink;

/// An event delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The current value of the subscribed operation.
    Value(Value),
    /// The backend failed to produce a value.
    Error(RemotePayload),
}

/// The error type returned by links.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// The backend rejected the operation. This is not retried.
    #[error("operation rejected: {0}")]
    Rejected(RemotePayload),

    /// The channel to the backend is unavailable. This is retried with backoff.
    #[error("channel disconnected: {0}")]
    Disconnected(String),
}

impl From<LinkError> for BridgeError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Rejected(m) => Self::RemoteOperation(m),
            LinkError::Disconnected(m) => Self::ChannelDisconnect(m),
        }
    }
}

/// The result type returned by links.
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Common methods across all links.
#[async_trait]
pub trait Link: 'static + Send + Sync {
    /// Opens a subscription.
    ///
    /// The stream delivers the current value of the operation first and every change after it.
    /// A stream that ends is treated as a disconnect.
    async fn subscribe(&self, descriptor: &Descriptor)
        -> LinkResult<BoxStream<'static, LinkEvent>>;

    /// Executes a one-shot call.
    async fn call(&self, descriptor: &Descriptor) -> LinkResult<Value>;
}

/// Opens links to a backend endpoint.
#[async_trait]
pub trait Connector: 'static + Send + Sync {
    /// Connects to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> BridgeResult<Arc<dyn Link>>;
}
