//! Consumer and interactive provider talking over the in-memory transport

use access::{
    Closure, DispatchOutcome, Handle, ItemState, OmmConsumer, OmmConsumerClient, OmmConsumerEvent,
    OmmErrorKind, OmmError, OmmProvider, OmmProviderClient, OmmProviderEvent, ChannelState,
};
use network::MemoryRegistry;
use omm_config::{ConsumerConfig, DictionarySource, IProviderConfig, OperationModel, ServiceConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use types::{
    AckMsg, CloseMsg, DataState, DomainType, PostMsg, RefreshMsg, ReqMsg, State, StatusMsg, StreamState,
    UpdateMsg,
};

const WAIT: Duration = Duration::from_secs(5);

fn eventually(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

/// Answers logins and item requests; names in `held` get no automatic refresh
#[derive(Default)]
struct Feed {
    held: HashSet<String>,
    items: Mutex<HashMap<String, Handle>>,
    closes: AtomicUsize,
}

impl Feed {
    fn holding(names: &[&str]) -> Self {
        Self {
            held: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    fn handle(&self, name: &str) -> Option<Handle> {
        self.items.lock().get(name).copied()
    }
}

fn refresh_for(name: &str) -> RefreshMsg {
    RefreshMsg::new()
        .name(name)
        .state(State::open_ok("All is well"))
        .solicited(true)
        .complete(true)
}

impl OmmProviderClient for Feed {
    fn on_req(&self, request: &ReqMsg, event: &OmmProviderEvent<'_>) {
        let name = request.key.name.clone().unwrap_or_default();
        if request.domain == DomainType::LOGIN {
            let refresh = RefreshMsg::new()
                .domain(DomainType::LOGIN)
                .name(name)
                .state(State::open_ok("Login accepted"))
                .solicited(true)
                .complete(true);
            event.submit(refresh).unwrap();
            return;
        }
        if !self.held.contains(&name) {
            event.submit(refresh_for(&name)).unwrap();
        }
        self.items.lock().insert(name, event.handle());
    }

    fn on_close(&self, _close: &CloseMsg, _event: &OmmProviderEvent<'_>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_post(&self, post: &PostMsg, event: &OmmProviderEvent<'_>) {
        if post.ack_requested {
            let ack = AckMsg::new().ack_id(post.post_id.unwrap_or_default());
            event.submit(ack).unwrap();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Refresh { handle: Handle, parent: Option<Handle> },
    Update { handle: Handle, seq: u32 },
    Status { handle: Handle, state: Option<State> },
    Ack { handle: Handle, id: u32 },
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }

    fn updates(&self, handle: Handle) -> Vec<u32> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Update { handle: h, seq } if h == handle => Some(seq),
                _ => None,
            })
            .collect()
    }

    fn refreshed(&self, handle: Handle) -> bool {
        self.seen()
            .iter()
            .any(|s| matches!(s, Seen::Refresh { handle: h, .. } if *h == handle))
    }
}

impl OmmConsumerClient for Recorder {
    fn on_refresh(&self, _refresh: &RefreshMsg, event: &OmmConsumerEvent<'_>) {
        self.seen.lock().push(Seen::Refresh {
            handle: event.handle(),
            parent: event.parent_handle(),
        });
    }

    fn on_update(&self, update: &UpdateMsg, event: &OmmConsumerEvent<'_>) {
        self.seen.lock().push(Seen::Update {
            handle: event.handle(),
            seq: update.seq_num.unwrap_or_default(),
        });
    }

    fn on_status(&self, status: &StatusMsg, event: &OmmConsumerEvent<'_>) {
        self.seen.lock().push(Seen::Status {
            handle: event.handle(),
            state: status.state.clone(),
        });
    }

    fn on_ack(&self, ack: &AckMsg, event: &OmmConsumerEvent<'_>) {
        self.seen.lock().push(Seen::Ack {
            handle: event.handle(),
            id: ack.ack_id,
        });
    }
}

struct Pair {
    consumer: OmmConsumer,
    provider: OmmProvider,
    feed: Arc<Feed>,
}

fn provider(memory: &MemoryRegistry, endpoint: &str, feed: Arc<Feed>) -> OmmProvider {
    let config = IProviderConfig::builder()
        .bind(&format!("memory://{endpoint}"))
        .unwrap()
        .service(ServiceConfig::new(1, "DIRECT_FEED").unwrap())
        .unwrap()
        .build()
        .unwrap();
    OmmProvider::interactive(config, feed)
        .memory(memory.clone())
        .build()
        .unwrap()
}

fn consumer_config(endpoint: &str, model: OperationModel) -> ConsumerConfig {
    ConsumerConfig::builder()
        .host(&format!("memory://{endpoint}"))
        .unwrap()
        .user_name("user")
        .unwrap()
        .dictionary(DictionarySource::Disabled)
        .operation_model(model)
        .build()
        .unwrap()
}

fn pair(endpoint: &str, feed: Feed, model: OperationModel) -> Pair {
    let memory = MemoryRegistry::new();
    let feed = Arc::new(feed);
    let provider = provider(&memory, endpoint, Arc::clone(&feed));
    let consumer = OmmConsumer::builder(consumer_config(endpoint, model))
        .memory(memory)
        .build()
        .unwrap();
    Pair {
        consumer,
        provider,
        feed,
    }
}

fn item(name: &str) -> ReqMsg {
    ReqMsg::new().service_name("DIRECT_FEED").name(name)
}

fn publish_updates(provider: &OmmProvider, handle: Handle, count: u32) {
    for seq in 1..=count {
        provider.submit(UpdateMsg::new().seq_num(seq), handle.raw()).unwrap();
    }
}

#[test_log::test]
fn refresh_then_updates_arrive_in_order() {
    let Pair { consumer, provider, feed } = pair("ordered", Feed::default(), OperationModel::ApiDispatch);
    let recorder = Arc::new(Recorder::default());
    let handle = consumer
        .register_client(item("IBM.N"), recorder.clone(), Closure::none())
        .unwrap();

    assert!(eventually(|| recorder.refreshed(handle)));
    assert_eq!(consumer.item_state(handle), Some(ItemState::Open));
    let published = feed.handle("IBM.N").unwrap();
    publish_updates(&provider, published, 20);

    assert!(eventually(|| recorder.updates(handle).len() == 20));
    assert_eq!(recorder.updates(handle), (1..=20).collect::<Vec<_>>());
    assert!(matches!(recorder.seen()[0], Seen::Refresh { .. }));
}

#[test_log::test]
fn closure_comes_back_with_every_callback() {
    struct Tagged(Mutex<Vec<String>>);

    impl OmmConsumerClient for Tagged {
        fn on_all(&self, _msg: &types::Msg, event: &OmmConsumerEvent<'_>) {
            let tag = event.closure().downcast_ref::<String>().cloned().unwrap_or_default();
            self.0.lock().push(tag);
        }
    }

    let Pair { consumer, provider: _provider, feed: _feed } = pair("closure", Feed::default(), OperationModel::ApiDispatch);
    let tagged = Arc::new(Tagged(Mutex::new(Vec::new())));
    consumer
        .register_client(item("IBM.N"), tagged.clone(), Closure::new("ibm".to_string()))
        .unwrap();
    assert!(eventually(|| !tagged.0.lock().is_empty()));
    assert_eq!(tagged.0.lock()[0], "ibm");
}

#[test_log::test]
fn batch_is_open_once_every_member_refreshed() {
    let Pair { consumer, provider, feed } = pair("batch", Feed::holding(&["C"]), OperationModel::ApiDispatch);
    let recorder = Arc::new(Recorder::default());
    let request = ReqMsg::new()
        .service_name("DIRECT_FEED")
        .batch_names(["A", "B", "C"])
        .unwrap();
    let batch = consumer
        .register_client(request, recorder.clone(), Closure::none())
        .unwrap();

    assert!(eventually(|| feed.handle("C").is_some()));
    assert!(eventually(|| recorder.seen().len() == 2));
    assert_ne!(consumer.item_state(batch), Some(ItemState::Open));

    provider
        .submit(refresh_for("C"), feed.handle("C").unwrap().raw())
        .unwrap();
    assert!(eventually(|| recorder.seen().len() == 3));
    assert!(eventually(|| consumer.item_state(batch) == Some(ItemState::Open)));

    let members: HashSet<Handle> = recorder
        .seen()
        .into_iter()
        .map(|s| match s {
            Seen::Refresh { handle, parent } => {
                assert_eq!(parent, Some(batch));
                handle
            }
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(members.len(), 3);
    assert!(!members.contains(&batch));
}

#[test_log::test]
fn unregister_inside_a_callback_stops_delivery() {
    struct OneShot {
        updates: AtomicUsize,
    }

    impl OmmConsumerClient for OneShot {
        fn on_update(&self, _update: &UpdateMsg, event: &OmmConsumerEvent<'_>) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            event.unregister(event.handle()).unwrap();
        }
    }

    let Pair { consumer, provider, feed } = pair("oneshot", Feed::default(), OperationModel::ApiDispatch);
    let client = Arc::new(OneShot {
        updates: AtomicUsize::new(0),
    });
    let handle = consumer
        .register_client(item("IBM.N"), client.clone(), Closure::none())
        .unwrap();
    assert!(eventually(|| feed.handle("IBM.N").is_some()));
    publish_updates(&provider, feed.handle("IBM.N").unwrap(), 10);

    assert!(eventually(|| feed.closes.load(Ordering::SeqCst) == 1));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(client.updates.load(Ordering::SeqCst), 1);
    assert_eq!(consumer.item_state(handle), None);

    let err = consumer.unregister(handle).unwrap_err();
    assert_eq!(err.kind(), OmmErrorKind::InvalidHandle);
}

#[test_log::test]
fn unregister_from_the_application_thread_is_final() {
    let Pair { consumer, provider, feed } = pair("final", Feed::default(), OperationModel::ApiDispatch);
    let recorder = Arc::new(Recorder::default());
    let handle = consumer
        .register_client(item("IBM.N"), recorder.clone(), Closure::none())
        .unwrap();
    assert!(eventually(|| recorder.refreshed(handle)));

    consumer.unregister(handle).unwrap();
    let seen = recorder.seen().len();
    let published = feed.handle("IBM.N").unwrap();
    let _ = provider.submit(UpdateMsg::new().seq_num(1), published.raw());
    thread::sleep(Duration::from_millis(200));
    assert_eq!(recorder.seen().len(), seen);
}

#[test_log::test]
fn domain_types_above_255_never_reach_the_wire() {
    let error: OmmError = ReqMsg::new().domain_type(300).unwrap_err().into();
    assert_eq!(error.kind(), OmmErrorKind::UnsupportedDomainType);
    assert!(ReqMsg::new().domain_type(255).is_ok());
}

#[test_log::test]
fn posts_are_acknowledged_on_the_item_stream() {
    let Pair { consumer, provider: _provider, feed: _feed } = pair("post", Feed::default(), OperationModel::ApiDispatch);
    let recorder = Arc::new(Recorder::default());
    let handle = consumer
        .register_client(item("IBM.N"), recorder.clone(), Closure::none())
        .unwrap();
    assert!(eventually(|| recorder.refreshed(handle)));

    let post = PostMsg::new().post_id(7).solicit_ack(true).complete(true);
    consumer.submit_post(handle, post).unwrap();
    assert!(eventually(|| recorder
        .seen()
        .contains(&Seen::Ack { handle, id: 7 })));
}

#[test_log::test]
fn user_dispatch_runs_callbacks_on_the_calling_thread() {
    let Pair { consumer, provider: _provider, feed: _feed } = pair("user", Feed::default(), OperationModel::UserDispatch);
    let recorder = Arc::new(Recorder::default());
    let handle = consumer
        .register_client(item("IBM.N"), recorder.clone(), Closure::none())
        .unwrap();

    let deadline = Instant::now() + WAIT;
    while !recorder.refreshed(handle) && Instant::now() < deadline {
        consumer.dispatch(Duration::from_millis(50)).unwrap();
    }
    assert!(recorder.refreshed(handle));
    assert_eq!(consumer.dispatch(Duration::from_millis(20)).unwrap(), DispatchOutcome::TimedOut);
}

#[test_log::test]
fn dispatch_is_rejected_when_the_api_owns_the_thread() {
    let Pair { consumer, provider: _provider, feed: _feed } = pair("api", Feed::default(), OperationModel::ApiDispatch);
    let err = consumer.dispatch(Duration::from_millis(10)).unwrap_err();
    assert_eq!(err.kind(), OmmErrorKind::InvalidUsage);
}

#[test_log::test]
fn channel_information_reports_the_ready_channel() {
    let Pair { consumer, provider, .. } = pair("info", Feed::default(), OperationModel::ApiDispatch);
    let channels = consumer.channel_information();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].state, ChannelState::Ready);
    assert_eq!(channels[0].host.as_deref(), Some("memory://info"));
    assert!(provider.endpoint().is_some());
}

#[test_log::test]
fn provider_loss_marks_open_items_suspect() {
    let Pair { consumer, provider, .. } = pair("loss", Feed::default(), OperationModel::ApiDispatch);
    let recorder = Arc::new(Recorder::default());
    let handle = consumer
        .register_client(item("IBM.N"), recorder.clone(), Closure::none())
        .unwrap();
    assert!(eventually(|| recorder.refreshed(handle)));

    provider.uninitialize();
    assert!(eventually(|| recorder.seen().iter().any(|s| matches!(
        s,
        Seen::Status { handle: h, state: Some(state) }
            if *h == handle
                && state.stream_state == StreamState::Open
                && state.data_state == DataState::Suspect
    ))));
    assert_eq!(consumer.item_state(handle), Some(ItemState::Suspect));
}

#[test_log::test]
fn calls_after_uninitialize_fail_with_shutdown() {
    let Pair { consumer, provider: _provider, feed: _feed } = pair("shutdown", Feed::default(), OperationModel::ApiDispatch);
    consumer.uninitialize();
    let err = consumer
        .register_client(item("IBM.N"), Arc::new(Recorder::default()), Closure::none())
        .unwrap_err();
    assert_eq!(err.kind(), OmmErrorKind::Shutdown);
}
