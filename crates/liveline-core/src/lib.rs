//! The core component of Liveline, shared between other crates.
//!
//! This crate holds the configuration used to reach the reactive backend. The endpoint is an
//! opaque connection string supplied by the surrounding application, usually through an
//! environment variable or an `.env` file.

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

pub mod config;
mod env_file;

pub use env_file::EnvFile;

/// The id of the script element that carries the cache snapshot of a server-rendered page.
pub const STATE_ELEMENT_ID: &str = "liveline-state";

/// The name of the meta element that tells the client how a page was rendered.
pub const MODE_META_NAME: &str = "liveline-mode";
