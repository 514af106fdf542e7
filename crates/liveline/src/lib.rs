//! Live subscriptions for pull-based query caches.
//!
//! Liveline lets an application read from a push-based backend as if it were a plain query
//! cache:
//!
//! 1. Reads are pulled through a cache and resolve once.
//! 2. Every value the backend pushes afterwards replaces the cached one.
//! 3. Pages rendered on the server carry their cache to the client.
//!
//! # Components
//!
//! 1. [liveline-bridge](liveline_bridge): The cache, the subscription bridge and the links to
//!   the backend.
//! 2. [liveline-backend](liveline_backend): Per-request scopes and server-side rendering.
//! 3. [liveline-frontend](liveline_frontend): Client scopes hydrated from rendered pages.
//! 4. [liveline-core](liveline_core): Configuration shared by the other components, re-exported
//!   as [`config`].

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]

#[doc(inline)]
pub use liveline_backend as backend;
#[doc(inline)]
pub use liveline_bridge as bridge;
#[doc(inline)]
pub use liveline_core::config;
#[doc(inline)]
pub use liveline_frontend as frontend;
