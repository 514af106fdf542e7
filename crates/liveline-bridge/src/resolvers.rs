//! Resolvers of queries and mutations served by a [`LocalLink`](crate::links::LocalLink).

use async_trait::async_trait;

use crate::error::RemotePayload;
use crate::types::{LiveMutation, LiveQuery};

/// The resolver of a live query.
///
/// The resolver is run once when a subscription is opened and again after every mutation
/// executed on the same link.
#[async_trait]
pub trait QueryResolver: LiveQuery {
    /// The context type.
    ///
    /// This type needs to match the `CTX` type parameter of the link it is added to.
    type Context: 'static + Send + Sync;

    /// Resolves the current query.
    async fn resolve(
        ctx: &Self::Context,
        args: &Self::Args,
    ) -> Result<Self::Output, RemotePayload>;
}

/// The resolver of a live mutation.
#[async_trait]
pub trait MutationResolver: LiveMutation {
    /// The context type.
    ///
    /// This type needs to match the `CTX` type parameter of the link it is added to.
    type Context: 'static + Send + Sync;

    /// Resolves the current mutation.
    async fn resolve(
        ctx: &Self::Context,
        args: &Self::Args,
    ) -> Result<Self::Output, RemotePayload>;
}
