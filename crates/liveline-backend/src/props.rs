use std::fmt;
use std::sync::Arc;

use liveline_bridge::types::{LiveMutation, LiveQuery};
use liveline_bridge::{BoundPair, BridgeResult, Descriptor, QueryCache, SubscriptionBridge};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServerAppResult;
use crate::Request;

/// The Properties provided to a server app.
///
/// Every loader of a request receives the same bound pair through these properties.
pub struct ServerAppProps<REQ> {
    request: Arc<REQ>,
    pair: BoundPair,
}

impl<REQ> fmt::Debug for ServerAppProps<REQ> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAppProps")
            .field("pair", &self.pair)
            .finish_non_exhaustive()
    }
}

impl<REQ> ServerAppProps<REQ>
where
    REQ: Request,
{
    /// Returns the path of current request.
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Returns queries of current request.
    pub fn queries<Q>(&self) -> ServerAppResult<Q>
    where
        Q: Serialize + for<'de> Deserialize<'de>,
    {
        self.request.queries()
    }

    /// Returns queries as a raw string.
    pub fn raw_queries(&self) -> &str {
        self.request.raw_queries()
    }

    /// Returns the current request context.
    pub fn context(&self) -> &REQ::Context {
        self.request.context()
    }

    /// Returns the request.
    pub fn request(&self) -> &REQ {
        &self.request
    }
}

impl<REQ> ServerAppProps<REQ> {
    pub(crate) fn new(request: Arc<REQ>, pair: BoundPair) -> Self {
        Self { request, pair }
    }

    /// Returns the bound pair of the request.
    pub fn pair(&self) -> &BoundPair {
        &self.pair
    }

    /// Returns the cache of the request.
    pub fn cache(&self) -> &QueryCache {
        self.pair.cache()
    }

    /// Returns the bridge of the request.
    pub fn bridge(&self) -> &SubscriptionBridge {
        self.pair.bridge()
    }

    /// Reads a descriptor through the cache of the request.
    pub async fn read_or_fetch(&self, descriptor: &Descriptor) -> BridgeResult<Arc<Value>> {
        self.cache().read_or_fetch(descriptor).await
    }

    /// Reads a typed query through the cache of the request.
    pub async fn read<Q>(&self, args: &Q::Args) -> BridgeResult<Q::Output>
    where
        Q: LiveQuery,
    {
        self.cache().read::<Q>(args).await
    }

    /// Executes a typed mutation.
    pub async fn mutate<M>(&self, args: &M::Args) -> BridgeResult<M::Output>
    where
        M: LiveMutation,
    {
        self.bridge().mutate::<M>(args).await
    }
}

impl<REQ> PartialEq for ServerAppProps<REQ> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.request, &other.request) && self.pair == other.pair
    }
}

impl<REQ> Clone for ServerAppProps<REQ> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            pair: self.pair.clone(),
        }
    }
}
