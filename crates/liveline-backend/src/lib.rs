//! Liveline Backend
//!
//! This crate creates the per-request scopes of a server and renders their pages.
//!
//! A [`ServerApp`] lives for the whole process and creates a fresh
//! [`BoundPair`](liveline_bridge::BoundPair) for every request. The loaders of the request read
//! through that pair with [`ServerAppProps`], and the [`ServerRenderer`] writes the entries they
//! populated into the page for the client to hydrate from.

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

mod app;
mod error;
mod html;
mod props;
mod renderer;
mod request;
pub mod trace;

pub use app::ServerApp;
pub use error::{ServerAppError, ServerAppResult};
pub use props::ServerAppProps;
pub use renderer::ServerRenderer;
pub use request::{RenderRequest, Request, ServerRequest};
