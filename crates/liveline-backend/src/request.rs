use std::sync::Arc;

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::ServerAppResult;

/// A trait that describes a request received by the backend.
pub trait Request {
    /// A request context that can be used to provide other information.
    type Context;

    /// Returns the path of current request.
    fn path(&self) -> &str;

    /// Returns queries as a raw string.
    fn raw_queries(&self) -> &str;

    /// Returns the headers of current request.
    fn headers(&self) -> &HeaderMap;

    /// Returns queries of current request.
    fn queries<Q>(&self) -> ServerAppResult<Q>
    where
        Q: Serialize + for<'de> Deserialize<'de>,
    {
        Ok(serde_urlencoded::from_str(self.raw_queries())?)
    }

    /// Returns the current request context.
    fn context(&self) -> &Self::Context;
}

/// A trait that describes a request for server-side rendering.
pub trait RenderRequest: Request {
    /// Returns the template of the html file.
    fn template(&self) -> &str;

    /// Returns true if this request should be rendered at the client side.
    fn is_client_only(&self) -> bool {
        false
    }
}

/// A request to be rendered by a [`ServerRenderer`](crate::ServerRenderer).
#[derive(Debug)]
pub struct ServerRequest<CTX = ()> {
    path: Arc<str>,
    raw_queries: Arc<str>,
    headers: HeaderMap,
    context: Arc<CTX>,
    template: Arc<str>,
    client_only: bool,
}

impl<CTX> Clone for ServerRequest<CTX> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            raw_queries: self.raw_queries.clone(),
            headers: self.headers.clone(),
            context: self.context.clone(),
            template: self.template.clone(),
            client_only: self.client_only,
        }
    }
}

impl ServerRequest<()> {
    /// Creates a request from the parts of an http request.
    pub fn from_http<B, T>(request: &http::Request<B>, template: T) -> Self
    where
        T: Into<Arc<str>>,
    {
        let uri = request.uri();

        Self {
            path: uri.path().into(),
            raw_queries: uri.query().unwrap_or_default().into(),
            headers: request.headers().clone(),
            context: Arc::new(()),
            template: template.into(),
            client_only: false,
        }
    }
}

impl<CTX> ServerRequest<CTX> {
    /// Appends a context to the request, passed to everything rendering it.
    pub fn with_context<C>(self, context: C) -> ServerRequest<C> {
        ServerRequest {
            path: self.path,
            raw_queries: self.raw_queries,
            headers: self.headers,
            context: context.into(),
            template: self.template,
            client_only: self.client_only,
        }
    }

    /// Marks the request to be rendered at the client side.
    pub fn client_only(mut self, client_only: bool) -> Self {
        self.client_only = client_only;
        self
    }
}

impl<CTX> Request for ServerRequest<CTX> {
    type Context = CTX;

    fn path(&self) -> &str {
        &self.path
    }

    fn raw_queries(&self) -> &str {
        &self.raw_queries
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn context(&self) -> &Self::Context {
        &self.context
    }
}

impl<CTX> RenderRequest for ServerRequest<CTX> {
    fn template(&self) -> &str {
        &self.template
    }

    fn is_client_only(&self) -> bool {
        self.client_only
    }
}
