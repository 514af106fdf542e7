//! Live subscriptions bridged into a pull-based query cache.
//!
//! This crate connects a push-based reactive backend to a [`QueryCache`] that resolves values on
//! demand. Reads are pulled through the cache as usual; the values they resolve with are backed
//! by live subscriptions, and every value the backend pushes afterwards replaces the cached one
//! without another read.
//!
//! A scope (a request on the server or an application instance on the client) owns exactly one
//! [`BoundPair`]: a cache and the [`SubscriptionBridge`] bound to it with
//! [`ConnectionRegistry::bind`]. Reading from a cache that was never bound fails immediately
//! with [`BridgeError::UnboundCache`].
//!
//! ```
//! # use std::sync::Arc;
//! # use serde_json::json;
//! # use liveline_bridge::links::LocalLink;
//! # use liveline_bridge::registry::ResolverRegistry;
//! # use liveline_bridge::{BoundPair, BridgeOptions, Descriptor};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let link: LocalLink = LocalLink::builder()
//!     .resolvers(
//!         ResolverRegistry::builder()
//!             .add_query_fn("todos:list", |_ctx, _args| async { Ok(json!(["a", "b"])) })
//!             .build(),
//!     )
//!     .context(())
//!     .build();
//!
//! let pair = BoundPair::connect(Arc::new(link.clone()), BridgeOptions::default());
//! let todos = Descriptor::unit("todos:list").unwrap();
//!
//! let value = pair.cache().read_or_fetch(&todos).await.unwrap();
//! assert_eq!(*value, json!(["a", "b"]));
//! # }
//! ```
//!
//! Queries and mutations can also be declared as types with [`LiveQuery`](types::LiveQuery) and
//! [`LiveMutation`](types::LiveMutation), and served in-process by a
//! [`LocalLink`](links::LocalLink) with their [resolvers](resolvers).

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

mod adapter;
mod bridge;
pub mod cache;
mod error;
mod finite;
mod key;
pub mod links;
pub mod registry;
pub mod resolvers;
mod snapshot;
mod state;
pub mod types;

pub use adapter::FetchAdapter;
pub use bridge::{BackoffOptions, BridgeOptions, FetchMode, SubscriptionBridge};
pub use cache::QueryCache;
pub use error::{BridgeError, BridgeResult, RemotePayload};
pub use key::{CacheKey, Descriptor, KeyCodec};
pub use registry::ConnectionRegistry;
pub use snapshot::{Snapshot, SnapshotEntry};
pub use state::BoundPair;
