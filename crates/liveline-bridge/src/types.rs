//! Typed queries and mutations.
//!
//! Operations can always be addressed by name with a [`Descriptor`]. These traits bind a name
//! to its argument and output types so reads and mutations can be issued with Rust values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::key::Descriptor;
use crate::BridgeResult;

/// A query served by a live subscription.
pub trait LiveQuery {
    /// The operation name, e.g. `todos:list`.
    const NAME: &'static str;

    /// The arguments of the query.
    ///
    /// This type must serialize into an object, or into unit for a query without arguments.
    type Args: 'static + Serialize + DeserializeOwned + Send + Sync;

    /// The value delivered by the query.
    type Output: 'static + Serialize + DeserializeOwned + Send + Sync;

    /// Returns the descriptor of this query for `args`.
    fn descriptor(args: &Self::Args) -> BridgeResult<Descriptor> {
        Descriptor::new(Self::NAME, args)
    }
}

/// A mutation executed with a one-shot call.
pub trait LiveMutation {
    /// The operation name, e.g. `todos:add`.
    const NAME: &'static str;

    /// The arguments of the mutation.
    type Args: 'static + Serialize + DeserializeOwned + Send + Sync;

    /// The value returned by the mutation.
    type Output: 'static + Serialize + DeserializeOwned + Send + Sync;

    /// Returns the descriptor of this mutation for `args`.
    fn descriptor(args: &Self::Args) -> BridgeResult<Descriptor> {
        Descriptor::new(Self::NAME, args)
    }
}
