use std::fmt;
use std::sync::Arc;

use liveline_bridge::links::Connector;
use liveline_bridge::{BoundPair, BridgeOptions};
use liveline_core::config::{BackendConfig, Endpoint};
use typed_builder::TypedBuilder;

use crate::{RenderRequest, ServerAppResult, ServerRenderer};

/// A server application.
///
/// The application lives for the whole process. Each inbound request gets its own
/// [`BoundPair`], so no cache entry or subscription is ever shared between two requests.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use liveline_backend::ServerApp;
/// # use liveline_bridge::links::LocalLink;
/// # use liveline_bridge::registry::ResolverRegistry;
/// # use liveline_core::config::Endpoint;
/// let link: LocalLink = LocalLink::builder()
///     .resolvers(ResolverRegistry::builder().build())
///     .context(())
///     .build();
///
/// let app = ServerApp::builder()
///     .connector(Arc::new(link))
///     .endpoint(Endpoint::new("local://").unwrap())
///     .build();
/// ```
#[derive(TypedBuilder, Clone)]
pub struct ServerApp {
    /// Opens a link to the backend for each request.
    connector: Arc<dyn Connector>,
    /// The endpoint of the backend.
    endpoint: Endpoint,
    /// The options of the bridge of each request.
    #[builder(default)]
    options: BridgeOptions,
}

impl fmt::Debug for ServerApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerApp")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ServerApp {
    /// Creates an application that connects to the endpoint of `config`.
    pub fn from_config(
        connector: Arc<dyn Connector>,
        config: &BackendConfig,
        options: BridgeOptions,
    ) -> Self {
        Self::builder()
            .connector(connector)
            .endpoint(config.endpoint().clone())
            .options(options)
            .build()
    }

    /// Returns the options of the bridge of each request.
    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Returns the endpoint of the backend.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Creates the bound pair of a new request.
    pub async fn scope(&self) -> ServerAppResult<BoundPair> {
        let pair = BoundPair::connect_with(
            self.connector.as_ref(),
            &self.endpoint,
            self.options.clone(),
        )
        .await?;

        tracing::debug!(
            cache = pair.cache().id(),
            bridge = pair.bridge().id(),
            "created request scope"
        );

        Ok(pair)
    }

    /// Creates a renderer for a request with a new bound pair.
    pub async fn renderer<REQ>(&self, request: REQ) -> ServerAppResult<ServerRenderer<REQ>>
    where
        REQ: 'static + RenderRequest,
    {
        Ok(ServerRenderer::new(request, self.scope().await?))
    }
}
