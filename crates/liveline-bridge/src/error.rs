use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// An error payload reported by the backend.
///
/// This is returned when the backend rejects an operation, e.g. the operation does not exist or
/// the arguments are invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePayload {
    /// A machine readable error code.
    pub code: String,
    /// A human readable message.
    pub message: String,
    /// Additional data attached by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemotePayload {
    /// The code used when an operation is not known to the backend.
    pub const UNKNOWN_OPERATION: &'static str = "UnknownOperation";
    /// The code used when the backend rejects the arguments of an operation.
    pub const INVALID_ARGUMENTS: &'static str = "InvalidArguments";
    /// The code used when the backend failed to process an operation.
    pub const INTERNAL: &'static str = "InternalError";

    /// Creates a payload.
    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches additional data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Creates a payload for an operation unknown to the backend.
    pub fn unknown_operation(operation: &str) -> Self {
        Self::new(
            Self::UNKNOWN_OPERATION,
            format!("operation `{operation}` does not exist"),
        )
    }

    /// Creates a payload for rejected arguments.
    pub fn invalid_arguments<E>(operation: &str, reason: E) -> Self
    where
        E: fmt::Display,
    {
        Self::new(
            Self::INVALID_ARGUMENTS,
            format!("arguments of `{operation}` were rejected: {reason}"),
        )
    }
}

impl fmt::Display for RemotePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// The error type used by the bridge.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// The descriptor is malformed.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// The backend rejected the operation.
    #[error("remote operation failed: {0}")]
    RemoteOperation(RemotePayload),

    /// The bridge or the cache is already bound to a different counterpart.
    #[error(
        "bridge #{bridge} cannot be bound to cache #{cache}: one of them is already bound to a \
         different counterpart, create a new pair for each scope instead"
    )]
    AlreadyBound {
        /// The id of the bridge.
        bridge: usize,
        /// The id of the cache.
        cache: usize,
    },

    /// A read was issued against a cache that has no fetch strategy.
    #[error(
        "cache #{cache} has no fetch strategy for `{operation}`, call \
         `ConnectionRegistry::bind(&bridge, &cache)` (or use `BoundPair::connect`) before \
         issuing reads"
    )]
    UnboundCache {
        /// The id of the cache.
        cache: usize,
        /// The operation that was read.
        operation: String,
    },

    /// The channel to the backend is disconnected and could not be re-established.
    #[error("backend channel disconnected: {0}")]
    ChannelDisconnect(String),

    /// Failed to encode or decode a value.
    #[error("failed to encode / decode content")]
    Encoding(#[source] Arc<serde_json::Error>),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.into())
    }
}

/// The result type used by the bridge.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
