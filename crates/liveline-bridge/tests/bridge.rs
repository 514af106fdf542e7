use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use liveline_bridge::cache::{CacheEntry, EntryState};
use liveline_bridge::links::{Link, LinkError, LinkEvent, LinkResult, LocalLink};
use liveline_bridge::registry::ResolverRegistry;
use liveline_bridge::resolvers::{MutationResolver, QueryResolver};
use liveline_bridge::types::{LiveMutation, LiveQuery};
use liveline_bridge::{
    BackoffOptions, BoundPair, BridgeError, BridgeOptions, Descriptor, FetchMode, QueryCache,
    RemotePayload,
};
use serde_json::{json, Value};
use tokio::sync::{watch, Notify};

fn todos() -> Descriptor {
    Descriptor::unit("todos:list").unwrap()
}

fn ready(value: Value) -> EntryState {
    EntryState::Ready(Arc::new(value))
}

fn static_link(value: Value) -> LocalLink {
    LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query_fn("todos:list", move |_, _| {
                    let value = value.clone();
                    async move { Ok(value) }
                })
                .build(),
        )
        .context(())
        .build()
}

fn connect(link: &LocalLink, options: BridgeOptions) -> BoundPair {
    BoundPair::connect(Arc::new(link.clone()), options)
}

async fn wait_for_state(rx: &mut watch::Receiver<CacheEntry>, state: EntryState) {
    tokio::time::timeout(
        Duration::from_secs(30),
        rx.wait_for(|m| m.state() == &state),
    )
    .await
    .expect("timed out waiting for entry")
    .expect("cache dropped");
}

#[tokio::test]
async fn end_to_end_push_updates_entry() {
    let link = static_link(json!(["a", "b"]));
    let pair = connect(&link, BridgeOptions::default());

    let value = pair.cache().read_or_fetch(&todos()).await.unwrap();
    assert_eq!(*value, json!(["a", "b"]));

    let mut entry = pair.cache().observe(&todos()).unwrap();
    assert_eq!(link.publish(&todos(), json!(["a", "b", "c"])), 1);

    wait_for_state(&mut entry, ready(json!(["a", "b", "c"]))).await;
    assert_eq!(link.subscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn observed_entries_receive_pushes_after_grace_period() {
    let link = static_link(json!(["a", "b"]));
    let options = BridgeOptions::default();
    let grace_period = options.grace_period;
    let pair = connect(&link, options);

    let value = pair.cache().read_or_fetch(&todos()).await.unwrap();
    assert_eq!(*value, json!(["a", "b"]));

    let mut entry = pair.cache().observe(&todos()).unwrap();
    tokio::time::sleep(grace_period + Duration::from_secs(1)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 1);

    assert_eq!(link.publish(&todos(), json!(["a", "b", "c"])), 1);
    wait_for_state(&mut entry, ready(json!(["a", "b", "c"]))).await;
    assert_eq!(link.subscribe_count(), 1);

    // the last observer releases the subscription.
    drop(entry);
    tokio::time::sleep(grace_period + Duration::from_secs(1)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 0);
}

#[tokio::test]
async fn unbound_read_fails_immediately() {
    let cache = QueryCache::new();

    let err = cache.read_or_fetch(&todos()).await.unwrap_err();
    assert!(matches!(err, BridgeError::UnboundCache { .. }));
}

#[tokio::test]
async fn concurrent_reads_share_one_subscription() {
    let gate = Arc::new(Notify::new());
    let link: LocalLink = LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query_fn("todos:list", {
                    let gate = gate.clone();
                    move |_, _| {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok(json!(["a"]))
                        }
                    }
                })
                .build(),
        )
        .context(())
        .build();
    let pair = connect(&link, BridgeOptions::default());
    let key = pair.cache().key_of(&todos()).unwrap();

    let reads = (0..2)
        .map(|_| {
            let pair = pair.clone();
            tokio::spawn(async move { pair.cache().read_or_fetch(&todos()).await })
        })
        .collect::<Vec<_>>();

    while pair.bridge().refcount(&key) < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(pair.bridge().live_subscriptions(), 1);

    gate.notify_one();
    for read in reads {
        assert_eq!(*read.await.unwrap().unwrap(), json!(["a"]));
    }
    assert_eq!(link.subscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropped_reads_release_their_interest() {
    let gate = Arc::new(Notify::new());
    let link: LocalLink = LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query_fn("todos:list", {
                    let gate = gate.clone();
                    move |_, _| {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Ok(json!(["a"]))
                        }
                    }
                })
                .build(),
        )
        .context(())
        .build();
    let options = BridgeOptions::builder()
        .grace_period(Duration::from_secs(1))
        .build();
    let pair = connect(&link, options);
    let key = pair.cache().key_of(&todos()).unwrap();

    let read = {
        let pair = pair.clone();
        tokio::spawn(async move { pair.cache().read_or_fetch(&todos()).await })
    };
    while pair.bridge().refcount(&key) < 1 {
        tokio::task::yield_now().await;
    }

    read.abort();
    assert!(read.await.unwrap_err().is_cancelled());
    assert_eq!(pair.bridge().refcount(&key), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 0);
    assert_eq!(link.active_subscriptions(), 0);
}

#[tokio::test]
async fn error_pushes_fail_the_entry() {
    let link = static_link(json!(["a"]));
    let pair = connect(&link, BridgeOptions::default());

    let mut handle = pair.cache().subscribe(&todos()).unwrap();
    assert_eq!(*handle.value().await.unwrap(), json!(["a"]));

    let error = RemotePayload::new("Boom", "the list is gone");
    assert_eq!(link.publish_error(&todos(), error.clone()), 1);

    let entry = handle.changed().await.unwrap();
    assert_eq!(entry.state(), &EntryState::Failed(error.clone()));
    assert!(entry.state().value().is_none());
    assert!(matches!(
        handle.value().await,
        Err(BridgeError::RemoteOperation(ref m)) if m == &error
    ));
}

#[tokio::test]
async fn pushes_apply_in_delivery_order() {
    let link = static_link(json!(0));
    let pair = connect(&link, BridgeOptions::default());
    pair.cache().read_or_fetch(&todos()).await.unwrap();

    let mut entry = pair.cache().observe(&todos()).unwrap();
    link.publish(&todos(), json!("v1"));
    link.publish(&todos(), json!("v2"));

    wait_for_state(&mut entry, ready(json!("v2"))).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(entry.borrow().state(), &ready(json!("v2")));
}

#[tokio::test(start_paused = true)]
async fn resubscribing_within_grace_period_reuses_subscription() {
    let link = static_link(json!(["a"]));
    let options = BridgeOptions::builder()
        .grace_period(Duration::from_secs(1))
        .build();
    let pair = connect(&link, options);

    let mut first = pair.cache().subscribe(&todos()).unwrap();
    first.value().await.unwrap();
    drop(first);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let mut second = pair.cache().subscribe(&todos()).unwrap();
    assert_eq!(*second.value().await.unwrap(), json!(["a"]));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 1);
    assert_eq!(link.subscribe_count(), 1);

    drop(second);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_after_grace_period_evicts_unobserved_entry() {
    let link = static_link(json!(["a"]));
    let options = BridgeOptions::builder()
        .grace_period(Duration::from_secs(1))
        .build();
    let pair = connect(&link, options);

    pair.cache().read_or_fetch(&todos()).await.unwrap();
    assert_eq!(pair.bridge().live_subscriptions(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 0);
    assert_eq!(link.active_subscriptions(), 0);
    assert!(pair.cache().peek(&todos()).unwrap().is_none());
    assert!(pair.cache().is_empty());

    pair.cache().read_or_fetch(&todos()).await.unwrap();
    assert_eq!(link.subscribe_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn teardown_marks_late_observed_entry_stale() {
    let link = static_link(json!(["a"]));
    let options = BridgeOptions::builder()
        .grace_period(Duration::from_secs(1))
        .build();
    let pair = connect(&link, options);
    let key = pair.cache().key_of(&todos()).unwrap();

    pair.cache().read_or_fetch(&todos()).await.unwrap();
    while pair.bridge().refcount(&key) > 0 {
        tokio::task::yield_now().await;
    }

    // observed only after the read released its interest.
    let entry = pair.cache().observe(&todos()).unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(pair.bridge().live_subscriptions(), 0);
    assert_eq!(
        entry.borrow().state(),
        &EntryState::Stale(Some(Arc::new(json!(["a"]))))
    );

    // a stale entry is fetched again.
    pair.cache().read_or_fetch(&todos()).await.unwrap();
    assert_eq!(link.subscribe_count(), 2);
    assert!(entry.borrow().state().is_ready());
}

#[tokio::test]
async fn rejections_are_recorded_and_retried() {
    let rejected = Arc::new(AtomicBool::new(true));
    let link: LocalLink = LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query_fn("todos:get", {
                    let rejected = rejected.clone();
                    move |_, args| {
                        let rejected = rejected.load(Ordering::SeqCst);
                        async move {
                            if rejected {
                                return Err(RemotePayload::invalid_arguments(
                                    "todos:get",
                                    "id must be positive",
                                ));
                            }
                            Ok(json!({ "id": args["id"], "title": "a" }))
                        }
                    }
                })
                .build(),
        )
        .context(())
        .build();
    let pair = connect(&link, BridgeOptions::default());
    let get = Descriptor::new("todos:get", json!({ "id": -1 })).unwrap();

    let err = pair.cache().read_or_fetch(&get).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RemoteOperation(ref m) if m.code == RemotePayload::INVALID_ARGUMENTS
    ));
    let entry = pair.cache().peek(&get).unwrap().unwrap();
    assert!(matches!(entry.state(), EntryState::Failed(_)));
    assert!(entry.state().value().is_none());

    rejected.store(false, Ordering::SeqCst);
    let value = pair.cache().read_or_fetch(&get).await.unwrap();
    assert_eq!(*value, json!({ "id": -1, "title": "a" }));
}

#[tokio::test]
async fn unknown_operations_fail_the_entry() {
    let link = static_link(json!([]));
    let pair = connect(&link, BridgeOptions::default());
    let missing = Descriptor::unit("todos:archive").unwrap();

    let err = pair.cache().read_or_fetch(&missing).await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RemoteOperation(ref m) if m.code == RemotePayload::UNKNOWN_OPERATION
    ));
    assert!(matches!(
        pair.cache().peek(&missing).unwrap().unwrap().state(),
        EntryState::Failed(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn disconnected_subscriptions_reconnect() {
    let link: LocalLink<AtomicU64> = LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query_fn("todos:count", |ctx: Arc<AtomicU64>, _| async move {
                    Ok(json!(ctx.fetch_add(1, Ordering::SeqCst)))
                })
                .build(),
        )
        .context(AtomicU64::new(0))
        .build();
    let pair = BoundPair::connect(Arc::new(link.clone()), BridgeOptions::default());
    let count = Descriptor::unit("todos:count").unwrap();

    let mut handle = pair.cache().subscribe(&count).unwrap();
    assert_eq!(*handle.value().await.unwrap(), json!(0));

    let mut entry = pair.cache().observe(&count).unwrap();
    link.disconnect_all();

    wait_for_state(&mut entry, EntryState::Stale(Some(Arc::new(json!(0))))).await;
    wait_for_state(&mut entry, ready(json!(1))).await;
    assert_eq!(link.subscribe_count(), 2);
    assert_eq!(pair.bridge().live_subscriptions(), 1);
}

#[derive(Debug, Default)]
struct UnreachableLink {
    attempts: AtomicU64,
}

#[async_trait]
impl Link for UnreachableLink {
    async fn subscribe(
        &self,
        _descriptor: &Descriptor,
    ) -> LinkResult<BoxStream<'static, LinkEvent>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(LinkError::Disconnected("connection refused".into()))
    }

    async fn call(&self, _descriptor: &Descriptor) -> LinkResult<Value> {
        Err(LinkError::Disconnected("connection refused".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_surface_channel_disconnect() {
    let link = Arc::new(UnreachableLink::default());
    let options = BridgeOptions::builder()
        .backoff(BackoffOptions::builder().max_retries(Some(2)).build())
        .build();
    let pair = BoundPair::connect(link.clone(), options);

    let err = pair.cache().read_or_fetch(&todos()).await.unwrap_err();
    assert!(matches!(err, BridgeError::ChannelDisconnect(_)));
    assert_eq!(link.attempts.load(Ordering::SeqCst), 3);

    // the entry is retryable rather than failed.
    let entry = pair.cache().peek(&todos()).unwrap().unwrap();
    assert_eq!(entry.state(), &EntryState::Stale(None));

    // a new read restarts the subscription.
    pair.cache().read_or_fetch(&todos()).await.unwrap_err();
    assert_eq!(link.attempts.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn call_mode_does_not_subscribe() {
    let link = static_link(json!(["a"]));
    let options = BridgeOptions::builder().fetch_mode(FetchMode::Call).build();
    let pair = connect(&link, options);

    assert_eq!(*pair.cache().read_or_fetch(&todos()).await.unwrap(), json!(["a"]));
    assert_eq!(link.subscribe_count(), 0);
    assert_eq!(pair.bridge().live_subscriptions(), 0);
}

#[tokio::test]
async fn snapshot_hydrates_without_subscribing() {
    let server_link = static_link(json!(["a", "b"]));
    let server = connect(&server_link, BridgeOptions::default());
    server.cache().read_or_fetch(&todos()).await.unwrap();
    let snapshot = server.cache().dehydrate();

    let client_link = static_link(json!("never"));
    let client = connect(&client_link, BridgeOptions::default());
    assert_eq!(client.cache().hydrate(&snapshot).unwrap(), 1);

    assert_eq!(
        *client.cache().read_or_fetch(&todos()).await.unwrap(),
        json!(["a", "b"])
    );
    assert_eq!(client_link.subscribe_count(), 0);
}

#[derive(Debug, Default)]
struct Todos {
    items: Mutex<Vec<String>>,
}

struct ListTodos;

impl LiveQuery for ListTodos {
    type Args = ();
    type Output = Vec<String>;

    const NAME: &'static str = "todos:list";
}

#[async_trait]
impl QueryResolver for ListTodos {
    type Context = Todos;

    async fn resolve(ctx: &Todos, _args: &()) -> Result<Vec<String>, RemotePayload> {
        Ok(ctx.items.lock().unwrap().clone())
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct AddTodoArgs {
    title: String,
}

struct AddTodo;

impl LiveMutation for AddTodo {
    type Args = AddTodoArgs;
    type Output = usize;

    const NAME: &'static str = "todos:add";
}

#[async_trait]
impl MutationResolver for AddTodo {
    type Context = Todos;

    async fn resolve(ctx: &Todos, args: &AddTodoArgs) -> Result<usize, RemotePayload> {
        let mut items = ctx.items.lock().unwrap();
        items.push(args.title.clone());

        Ok(items.len())
    }
}

#[tokio::test]
async fn mutations_push_to_typed_readers() {
    let link: LocalLink<Todos> = LocalLink::builder()
        .resolvers(
            ResolverRegistry::builder()
                .add_query::<ListTodos>()
                .add_mutation::<AddTodo>()
                .build(),
        )
        .context(Todos::default())
        .build();
    let pair = BoundPair::connect(Arc::new(link), BridgeOptions::default());

    let mut handle = pair.cache().subscribe(&ListTodos::descriptor(&()).unwrap()).unwrap();
    assert_eq!(*handle.value().await.unwrap(), json!([]));

    let len = pair
        .bridge()
        .mutate::<AddTodo>(&AddTodoArgs { title: "a".into() })
        .await
        .unwrap();
    assert_eq!(len, 1);

    let entry = handle.changed().await.unwrap();
    assert_eq!(entry.state(), &ready(json!(["a"])));
    assert_eq!(pair.cache().read::<ListTodos>(&()).await.unwrap(), vec!["a".to_string()]);
}
