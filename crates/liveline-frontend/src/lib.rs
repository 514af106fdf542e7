//! Liveline Frontend.
//!
//! This crate starts the client scope of an application.
//!
//! A page rendered by `liveline-backend` carries the entries its loaders resolved. The
//! [`Renderer`] reads them from the page and seeds the cache of the client with them before any
//! reader runs, so the first reads of the client resolve without another round trip to the
//! backend.

#![deny(clippy::all)]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]
#![deny(non_snake_case)]
#![deny(clippy::cognitive_complexity)]
#![deny(missing_docs)]
#![cfg_attr(documenting, feature(doc_cfg))]
#![cfg_attr(documenting, feature(doc_auto_cfg))]
#![cfg_attr(any(releasing, not(debug_assertions)), deny(dead_code, unused_imports))]

use std::fmt;
use std::sync::Arc;

use liveline_bridge::links::{Connector, Link};
use liveline_bridge::{BoundPair, BridgeOptions, BridgeResult, Snapshot};
use liveline_core::config::Endpoint;

mod document;
mod error;

pub use error::{FrontendError, FrontendResult};

/// How the page of the application was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// The page was not rendered on the server, the client resolves everything itself.
    #[default]
    Render,
    /// The page was rendered on the server and carries the entries its loaders resolved.
    Hydrate,
}

/// The Liveline Frontend Renderer.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use liveline_bridge::links::LocalLink;
/// # use liveline_bridge::registry::ResolverRegistry;
/// # use liveline_frontend::{RenderMode, Renderer};
/// let link: LocalLink = LocalLink::builder()
///     .resolvers(ResolverRegistry::builder().build())
///     .context(())
///     .build();
///
/// let renderer = Renderer::new(Arc::new(link))
///     .from_document(r#"<html><head><meta name="liveline-mode" content="render"></head></html>"#)
///     .unwrap();
/// assert_eq!(renderer.mode(), RenderMode::Render);
///
/// let pair = renderer.render().unwrap();
/// assert!(pair.cache().is_bound());
/// ```
#[derive(Clone)]
pub struct Renderer {
    link: Arc<dyn Link>,
    options: BridgeOptions,
    mode: RenderMode,
    state: Option<Snapshot>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("options", &self.options)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Creates a Renderer that reaches the backend through `link`.
    pub fn new(link: Arc<dyn Link>) -> Self {
        Self {
            link,
            options: BridgeOptions::default(),
            mode: RenderMode::Render,
            state: None,
        }
    }

    /// Creates a Renderer with a link opened by `connector`.
    pub async fn with_connector<C>(connector: &C, endpoint: &Endpoint) -> BridgeResult<Self>
    where
        C: Connector + ?Sized,
    {
        Ok(Self::new(connector.connect(endpoint).await?))
    }

    /// Sets the options of the bridge.
    pub fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;

        self
    }

    /// Hydrates the cache from a snapshot.
    pub fn state(mut self, snapshot: Snapshot) -> Self {
        self.mode = RenderMode::Hydrate;
        self.state = Some(snapshot);

        self
    }

    /// Hydrates the cache from the JSON of a snapshot.
    pub fn hydrate_from(self, json_s: &str) -> FrontendResult<Self> {
        Ok(self.state(Snapshot::from_json(json_s)?))
    }

    /// Reads the render mode and the state from the html of a page.
    ///
    /// The state is only used if the page was rendered on the server.
    pub fn from_document(mut self, html_s: &str) -> FrontendResult<Self> {
        let page = document::read_page(html_s)?;

        match (page.mode, page.state) {
            (RenderMode::Hydrate, Some(m)) => self.hydrate_from(&m),
            (RenderMode::Hydrate, None) => {
                tracing::warn!("page was rendered on the server but carries no state");
                self.mode = RenderMode::Hydrate;
                self.state = None;

                Ok(self)
            }
            (RenderMode::Render, _) => {
                self.mode = RenderMode::Render;
                self.state = None;

                Ok(self)
            }
        }
    }

    /// Returns how the page was produced.
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Creates the bound pair of the client.
    ///
    /// If the page was rendered on the server, the cache is hydrated before the pair is
    /// returned.
    pub fn render(self) -> FrontendResult<BoundPair> {
        let Self {
            link,
            options,
            mode,
            state,
        } = self;

        let pair = BoundPair::connect(link, options);

        let seeded = match state {
            Some(ref m) => pair.cache().hydrate(m)?,
            None => 0,
        };

        tracing::debug!(
            cache = pair.cache().id(),
            bridge = pair.bridge().id(),
            ?mode,
            seeded,
            "started client scope"
        );

        Ok(pair)
    }
}
