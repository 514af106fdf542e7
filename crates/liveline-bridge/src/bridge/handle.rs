use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::options::BackoffOptions;
use super::{BridgeInner, Shared};
use crate::cache::EntryUpdate;
use crate::error::RemotePayload;
use crate::key::{CacheKey, Descriptor};
use crate::links::{LinkError, LinkEvent};

/// The latest event observed by a subscription pump.
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub seq: u64,
    pub kind: DeliveryKind,
}

#[derive(Debug, Clone)]
pub(crate) enum DeliveryKind {
    Connecting,
    Value(Arc<Value>),
    Rejected(RemotePayload),
    Disconnected,
    Exhausted(String),
}

impl DeliveryKind {
    /// Returns `true` if the pump will not deliver anything else on its own.
    fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Exhausted(_))
    }
}

/// A live subscription shared by every reader of a key.
pub(crate) struct HandleSlot {
    pub id: usize,
    pub descriptor: Descriptor,
    pub refcount: usize,
    pub latest: watch::Receiver<Delivery>,
    pump: JoinHandle<()>,
    pub teardown: Option<JoinHandle<()>>,
}

impl HandleSlot {
    pub fn open(
        shared: &Arc<Shared>,
        key: &CacheKey,
        descriptor: &Descriptor,
        backoff: &BackoffOptions,
    ) -> Self {
        static ID: AtomicUsize = AtomicUsize::new(0);

        let (latest, pump) = Pump::spawn(shared, key, descriptor, backoff);

        Self {
            id: ID.fetch_add(1, Ordering::AcqRel),
            descriptor: descriptor.clone(),
            refcount: 0,
            latest,
            pump,
            teardown: None,
        }
    }

    /// Re-opens the subscription if the backend rejected it or reconnection gave up.
    pub fn restart_if_failed(
        &mut self,
        shared: &Arc<Shared>,
        key: &CacheKey,
        backoff: &BackoffOptions,
    ) {
        if !self.latest.borrow().kind.is_failure() {
            return;
        }

        tracing::debug!(
            key = %key.hash(),
            operation = self.descriptor.operation(),
            "re-opening failed subscription"
        );
        self.pump.abort();
        (self.latest, self.pump) = Pump::spawn(shared, key, &self.descriptor, backoff);
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        self.pump.abort();
        if let Some(m) = self.teardown.take() {
            m.abort();
        }
    }
}

/// A reader's interest in a [`HandleSlot`].
///
/// Dropping the lease decrements the refcount of the slot it was issued by.
pub(crate) struct Lease {
    bridge: Weak<BridgeInner>,
    key: CacheKey,
    slot: usize,
}

impl Lease {
    pub fn new(bridge: Weak<BridgeInner>, key: CacheKey, slot: usize) -> Self {
        Self { bridge, key, slot }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(m) = self.bridge.upgrade() {
            m.release(&self.key, self.slot);
        }
    }
}

/// Forwards the events of a backend subscription into the cache.
struct Pump {
    shared: Arc<Shared>,
    key: CacheKey,
    descriptor: Descriptor,
    backoff: BackoffOptions,
    tx: watch::Sender<Delivery>,
}

impl Pump {
    fn spawn(
        shared: &Arc<Shared>,
        key: &CacheKey,
        descriptor: &Descriptor,
        backoff: &BackoffOptions,
    ) -> (watch::Receiver<Delivery>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(Delivery {
            seq: 0,
            kind: DeliveryKind::Connecting,
        });

        let pump = Self {
            shared: shared.clone(),
            key: key.clone(),
            descriptor: descriptor.clone(),
            backoff: backoff.clone(),
            tx,
        };

        (rx, tokio::spawn(pump.run()))
    }

    fn deliver(&self, update: EntryUpdate, kind: DeliveryKind) {
        let seq = self.shared.write(&self.key, update);
        self.tx.send_replace(Delivery { seq, kind });
    }

    async fn run(self) {
        let mut attempt = 0;

        loop {
            let reason = match self.shared.link.subscribe(&self.descriptor).await {
                Ok(mut events) => {
                    attempt = 0;
                    tracing::debug!(
                        key = %self.key.hash(),
                        operation = self.descriptor.operation(),
                        "subscription opened"
                    );

                    while let Some(event) = events.next().await {
                        match event {
                            LinkEvent::Value(m) => {
                                let m = Arc::new(m);
                                self.deliver(EntryUpdate::Value(m.clone()), DeliveryKind::Value(m));
                            }
                            LinkEvent::Error(m) => {
                                tracing::debug!(
                                    key = %self.key.hash(),
                                    error = %m,
                                    "subscription delivered an error"
                                );
                                self.deliver(
                                    EntryUpdate::Error(m.clone()),
                                    DeliveryKind::Rejected(m),
                                );
                            }
                        }
                    }

                    "subscription stream ended".to_string()
                }
                Err(LinkError::Rejected(m)) => {
                    tracing::debug!(key = %self.key.hash(), error = %m, "subscription rejected");
                    self.deliver(EntryUpdate::Error(m.clone()), DeliveryKind::Rejected(m));

                    return;
                }
                Err(LinkError::Disconnected(m)) => m,
            };

            if !self.backoff.allows(attempt) {
                tracing::warn!(
                    key = %self.key.hash(),
                    attempts = attempt,
                    %reason,
                    "giving up reconnecting subscription"
                );
                self.deliver(EntryUpdate::Stale, DeliveryKind::Exhausted(reason));

                return;
            }

            let delay = self.backoff.delay(attempt);
            tracing::warn!(
                key = %self.key.hash(),
                attempt,
                ?delay,
                %reason,
                "subscription disconnected, reconnecting"
            );
            self.deliver(EntryUpdate::Stale, DeliveryKind::Disconnected);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
