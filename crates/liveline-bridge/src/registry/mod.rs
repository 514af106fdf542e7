//! Registries for bridge bindings and resolvers.

use std::sync::Arc;

mod resolver;
pub use resolver::*;

use crate::adapter::FetchAdapter;
use crate::bridge::{CacheSink, SubscriptionBridge};
use crate::cache::QueryCache;
use crate::key::KeyCodec;
use crate::{BridgeError, BridgeResult};

/// Binds bridges to caches.
///
/// A bridge and a cache are bound to each other exactly once. Binding installs
/// [`KeyCodec::canonicalize`] as the key hash strategy and the bridge's [`FetchAdapter`] as the
/// fetch strategy of the cache, and makes the cache the destination of the bridge's pushes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionRegistry;

impl ConnectionRegistry {
    /// Binds `bridge` to `cache`.
    ///
    /// Binding the same pair again is a no-op. Fails with [`BridgeError::AlreadyBound`] if either
    /// of them is already bound to a different counterpart.
    pub fn bind(bridge: &SubscriptionBridge, cache: &QueryCache) -> BridgeResult<()> {
        let mut sink = bridge.inner.shared.sink();
        let mut hooks = cache.inner.hooks();

        match (sink.as_ref().map(|m| m.cache_id), hooks.bridge) {
            (None, None) => {
                hooks.install(
                    bridge.id(),
                    Arc::new(KeyCodec::canonicalize),
                    FetchAdapter::new(bridge.clone()).into_strategy(),
                );
                *sink = Some(CacheSink {
                    cache_id: cache.id(),
                    cache: Arc::downgrade(&cache.inner),
                });

                tracing::debug!(bridge = bridge.id(), cache = cache.id(), "bridge bound to cache");

                Ok(())
            }
            (Some(cache_id), Some(bridge_id))
                if cache_id == cache.id() && bridge_id == bridge.id() =>
            {
                Ok(())
            }
            _ => Err(BridgeError::AlreadyBound {
                bridge: bridge.id(),
                cache: cache.id(),
            }),
        }
    }

    /// Returns `true` if `bridge` is bound to `cache`.
    pub fn is_bound(bridge: &SubscriptionBridge, cache: &QueryCache) -> bool {
        let sink = bridge.inner.shared.sink();

        sink.as_ref().map(|m| m.cache_id) == Some(cache.id())
            && cache.inner.hooks().bridge == Some(bridge.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::{LocalLink, Link};
    use crate::{BridgeOptions, Descriptor};

    fn bridge() -> SubscriptionBridge {
        let link: Arc<dyn Link> = Arc::new(
            LocalLink::<()>::builder()
                .resolvers(ResolverRegistry::builder().build())
                .context(())
                .build(),
        );

        SubscriptionBridge::new(link, BridgeOptions::default())
    }

    #[test]
    fn bind_is_idempotent() {
        let bridge = bridge();
        let cache = QueryCache::new();

        ConnectionRegistry::bind(&bridge, &cache).unwrap();
        ConnectionRegistry::bind(&bridge, &cache).unwrap();

        assert!(ConnectionRegistry::is_bound(&bridge, &cache));
        assert!(bridge.is_bound());
        assert!(cache.is_bound());
    }

    #[test]
    fn bind_to_other_counterpart_fails() {
        let bridge = bridge();
        let cache = QueryCache::new();
        let other_cache = QueryCache::new();
        let other_bridge = self::bridge();

        bridge.connect(&cache).unwrap();

        assert!(matches!(
            ConnectionRegistry::bind(&bridge, &other_cache),
            Err(BridgeError::AlreadyBound { .. })
        ));
        assert!(matches!(
            ConnectionRegistry::bind(&other_bridge, &cache),
            Err(BridgeError::AlreadyBound { .. })
        ));

        // failed binds leave both sides untouched.
        assert!(!other_cache.is_bound());
        assert!(!other_bridge.is_bound());
        assert!(ConnectionRegistry::is_bound(&bridge, &cache));
    }

    #[test]
    fn bind_installs_key_codec() {
        let bridge = bridge();
        let cache = QueryCache::new();
        bridge.connect(&cache).unwrap();

        let descriptor = Descriptor::unit("todos:list").unwrap();
        assert_eq!(
            cache.key_of(&descriptor).unwrap(),
            KeyCodec::canonicalize(&descriptor).unwrap()
        );
    }
}
