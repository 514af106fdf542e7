use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use liveline_core::config::Endpoint;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use typed_builder::TypedBuilder;

use super::{Connector, Link, LinkError, LinkEvent, LinkResult};
use crate::error::RemotePayload;
use crate::key::Descriptor;
use crate::registry::ResolverRegistry;
use crate::BridgeResult;

struct Subscriber {
    descriptor: Descriptor,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

#[derive(Default)]
struct LinkState {
    subscribers: Mutex<Vec<Subscriber>>,
    opened: AtomicUsize,
    // serializes mutations with the values they cause subscriptions to deliver.
    writes: tokio::sync::Mutex<()>,
}

impl LinkState {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        let mut subscribers = self.subscribers.lock().expect("link subscribers poisoned");
        subscribers.retain(|m| !m.tx.is_closed());

        subscribers
    }
}

/// A Link that resolves operations with local resolvers.
///
/// This is an in-process reactive backend. Every subscription re-runs its query resolver after
/// a mutation succeeds on the same link and pushes the new result. Clones share the same
/// subscriptions.
///
/// # Example
///
/// ```
/// # use serde_json::json;
/// # use liveline_bridge::links::LocalLink;
/// # use liveline_bridge::registry::ResolverRegistry;
/// let link: LocalLink = LocalLink::builder()
///     .resolvers(
///         ResolverRegistry::builder()
///             .add_query_fn("todos:list", |_ctx, _args| async { Ok(json!(["a", "b"])) })
///             .build(),
///     )
///     .context(())
///     .build();
/// ```
#[derive(TypedBuilder)]
pub struct LocalLink<CTX = ()> {
    /// The registry of all registered resolvers.
    resolvers: ResolverRegistry<CTX>,

    /// The link context, passed to every resolver.
    #[builder(setter(into))]
    context: Arc<CTX>,

    #[builder(setter(skip), default)]
    state: Arc<LinkState>,
}

impl<CTX> fmt::Debug for LocalLink<CTX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalLink")
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

impl<CTX> Clone for LocalLink<CTX> {
    fn clone(&self) -> Self {
        Self {
            resolvers: self.resolvers.clone(),
            context: self.context.clone(),
            state: self.state.clone(),
        }
    }
}

impl<CTX> PartialEq for LocalLink<CTX> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<CTX> LocalLink<CTX>
where
    CTX: 'static + Send + Sync,
{
    /// Pushes a value to every subscriber of `descriptor`.
    ///
    /// Returns the number of subscribers the value was delivered to.
    pub fn publish(&self, descriptor: &Descriptor, value: Value) -> usize {
        self.push(descriptor, LinkEvent::Value(value))
    }

    /// Pushes an error to every subscriber of `descriptor`.
    pub fn publish_error(&self, descriptor: &Descriptor, error: RemotePayload) -> usize {
        self.push(descriptor, LinkEvent::Error(error))
    }

    fn push(&self, descriptor: &Descriptor, event: LinkEvent) -> usize {
        self.state
            .subscribers()
            .iter()
            .filter(|m| &m.descriptor == descriptor)
            .filter(|m| m.tx.send(event.clone()).is_ok())
            .count()
    }

    /// Ends every open subscription.
    pub fn disconnect_all(&self) {
        let closed = std::mem::take(&mut *self.state.subscribers());
        tracing::debug!(subscriptions = closed.len(), "disconnecting local subscriptions");
    }

    /// Returns the number of subscriptions opened on this link so far.
    pub fn subscribe_count(&self) -> usize {
        self.state.opened.load(Ordering::Acquire)
    }

    /// Returns the number of subscriptions that are currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.state.subscribers().len()
    }

    /// Re-runs the resolver of every open subscription and pushes the results.
    async fn refresh(&self) {
        let mut descriptors: Vec<Descriptor> = Vec::new();
        for m in self.state.subscribers().iter() {
            if !descriptors.contains(&m.descriptor) {
                descriptors.push(m.descriptor.clone());
            }
        }

        for descriptor in descriptors {
            let event = match self.resolvers.resolve_query(&self.context, &descriptor).await {
                Ok(m) => LinkEvent::Value(m),
                Err(e) => LinkEvent::Error(e),
            };
            self.push(&descriptor, event);
        }
    }
}

#[async_trait]
impl<CTX> Link for LocalLink<CTX>
where
    CTX: 'static + Send + Sync,
{
    async fn subscribe(
        &self,
        descriptor: &Descriptor,
    ) -> LinkResult<BoxStream<'static, LinkEvent>> {
        let _guard = self.state.writes.lock().await;

        let value = self
            .resolvers
            .resolve_query(&self.context, descriptor)
            .await
            .map_err(LinkError::Rejected)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(LinkEvent::Value(value))
            .map_err(|_| LinkError::Disconnected("subscription dropped while opening".into()))?;

        self.state.subscribers().push(Subscriber {
            descriptor: descriptor.clone(),
            tx,
        });
        self.state.opened.fetch_add(1, Ordering::AcqRel);

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn call(&self, descriptor: &Descriptor) -> LinkResult<Value> {
        let operation = descriptor.operation();

        if self.resolvers.has_query(operation) {
            return self
                .resolvers
                .resolve_query(&self.context, descriptor)
                .await
                .map_err(LinkError::Rejected);
        }

        if !self.resolvers.has_mutation(operation) {
            return Err(LinkError::Rejected(RemotePayload::unknown_operation(operation)));
        }

        let _guard = self.state.writes.lock().await;
        let output = self
            .resolvers
            .resolve_mutation(&self.context, descriptor)
            .await
            .map_err(LinkError::Rejected)?;

        tracing::debug!(operation, "mutation executed, refreshing subscriptions");
        self.refresh().await;

        Ok(output)
    }
}

#[async_trait]
impl<CTX> Connector for LocalLink<CTX>
where
    CTX: 'static + Send + Sync,
{
    async fn connect(&self, endpoint: &Endpoint) -> BridgeResult<Arc<dyn Link>> {
        tracing::trace!(?endpoint, "connecting local link");

        Ok(Arc::new(self.clone()))
    }
}
