use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RemotePayload;
use crate::key::Descriptor;
use crate::resolvers::{MutationResolver, QueryResolver};

pub(crate) type Resolver<CTX> = Arc<
    dyn Send + Sync + Fn(Arc<CTX>, &Descriptor) -> BoxFuture<'static, Result<Value, RemotePayload>>,
>;

/// The Registry Builder for Resolver Registry
pub struct ResolverRegistryBuilder<CTX = ()> {
    queries: HashMap<String, Resolver<CTX>>,
    mutations: HashMap<String, Resolver<CTX>>,
}

impl<CTX> fmt::Debug for ResolverRegistryBuilder<CTX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistryBuilder")
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<CTX> Default for ResolverRegistryBuilder<CTX> {
    fn default() -> Self {
        Self {
            queries: HashMap::new(),
            mutations: HashMap::new(),
        }
    }
}

impl<CTX> ResolverRegistryBuilder<CTX>
where
    CTX: 'static + Send + Sync,
{
    /// Creates a registry builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry.
    pub fn build(self) -> ResolverRegistry<CTX> {
        ResolverRegistry {
            inner: Arc::new(self),
        }
    }

    /// Adds a Query Resolver
    pub fn add_query<T>(mut self) -> Self
    where
        T: 'static + QueryResolver<Context = CTX>,
    {
        let resolver: Resolver<CTX> = Arc::new(|ctx: Arc<CTX>, descriptor: &Descriptor| {
            let args = match decode_args::<T::Args>(descriptor) {
                Ok(m) => m,
                Err(e) => return future::err(e).boxed(),
            };

            async move { encode_output(T::resolve(&ctx, &args).await?) }.boxed()
        });

        self.queries.insert(T::NAME.to_owned(), resolver);
        self
    }

    /// Adds a Mutation Resolver
    pub fn add_mutation<T>(mut self) -> Self
    where
        T: 'static + MutationResolver<Context = CTX>,
    {
        let resolver: Resolver<CTX> = Arc::new(|ctx: Arc<CTX>, descriptor: &Descriptor| {
            let args = match decode_args::<T::Args>(descriptor) {
                Ok(m) => m,
                Err(e) => return future::err(e).boxed(),
            };

            async move { encode_output(T::resolve(&ctx, &args).await?) }.boxed()
        });

        self.mutations.insert(T::NAME.to_owned(), resolver);
        self
    }

    /// Adds an untyped query resolver.
    ///
    /// The resolver receives the arguments of the descriptor as a JSON object.
    pub fn add_query_fn<N, F, Fut>(mut self, name: N, f: F) -> Self
    where
        N: Into<String>,
        F: 'static + Send + Sync + Fn(Arc<CTX>, Value) -> Fut,
        Fut: 'static + Send + Future<Output = Result<Value, RemotePayload>>,
    {
        self.queries.insert(name.into(), untyped(f));
        self
    }

    /// Adds an untyped mutation resolver.
    ///
    /// The resolver receives the arguments of the descriptor as a JSON object.
    pub fn add_mutation_fn<N, F, Fut>(mut self, name: N, f: F) -> Self
    where
        N: Into<String>,
        F: 'static + Send + Sync + Fn(Arc<CTX>, Value) -> Fut,
        Fut: 'static + Send + Future<Output = Result<Value, RemotePayload>>,
    {
        self.mutations.insert(name.into(), untyped(f));
        self
    }
}

fn untyped<CTX, F, Fut>(f: F) -> Resolver<CTX>
where
    CTX: 'static + Send + Sync,
    F: 'static + Send + Sync + Fn(Arc<CTX>, Value) -> Fut,
    Fut: 'static + Send + Future<Output = Result<Value, RemotePayload>>,
{
    Arc::new(move |ctx: Arc<CTX>, descriptor: &Descriptor| {
        f(ctx, descriptor.arguments_value()).boxed()
    })
}

// Operations without arguments may be declared with unit arguments.
fn decode_args<T>(descriptor: &Descriptor) -> Result<T, RemotePayload>
where
    T: DeserializeOwned,
{
    let args = descriptor.arguments_value();
    match serde_json::from_value(args) {
        Ok(m) => Ok(m),
        Err(_) if descriptor.arguments().is_empty() => serde_json::from_value(Value::Null)
            .map_err(|e| RemotePayload::invalid_arguments(descriptor.operation(), e)),
        Err(e) => Err(RemotePayload::invalid_arguments(descriptor.operation(), e)),
    }
}

fn encode_output<T>(output: T) -> Result<Value, RemotePayload>
where
    T: Serialize,
{
    serde_json::to_value(output)
        .map_err(|e| RemotePayload::new(RemotePayload::INTERNAL, e.to_string()))
}

/// The Registry that holds available query and mutation resolvers.
pub struct ResolverRegistry<CTX = ()> {
    inner: Arc<ResolverRegistryBuilder<CTX>>,
}

impl<CTX> fmt::Debug for ResolverRegistry<CTX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResolverRegistry").field(&self.inner).finish()
    }
}

impl<CTX> Clone for ResolverRegistry<CTX> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<CTX> ResolverRegistry<CTX>
where
    CTX: 'static + Send + Sync,
{
    /// Creates a Builder for a resolver registry.
    pub fn builder() -> ResolverRegistryBuilder<CTX> {
        ResolverRegistryBuilder::new()
    }

    /// Returns `true` if a query resolver is registered for `operation`.
    pub fn has_query(&self, operation: &str) -> bool {
        self.inner.queries.contains_key(operation)
    }

    /// Returns `true` if a mutation resolver is registered for `operation`.
    pub fn has_mutation(&self, operation: &str) -> bool {
        self.inner.mutations.contains_key(operation)
    }

    /// Resolves a query.
    pub async fn resolve_query(
        &self,
        ctx: &Arc<CTX>,
        descriptor: &Descriptor,
    ) -> Result<Value, RemotePayload> {
        let resolver = self
            .inner
            .queries
            .get(descriptor.operation())
            .ok_or_else(|| RemotePayload::unknown_operation(descriptor.operation()))?;

        resolver(ctx.clone(), descriptor).await
    }

    /// Resolves a mutation.
    pub async fn resolve_mutation(
        &self,
        ctx: &Arc<CTX>,
        descriptor: &Descriptor,
    ) -> Result<Value, RemotePayload> {
        let resolver = self
            .inner
            .mutations
            .get(descriptor.operation())
            .ok_or_else(|| RemotePayload::unknown_operation(descriptor.operation()))?;

        resolver(ctx.clone(), descriptor).await
    }
}
