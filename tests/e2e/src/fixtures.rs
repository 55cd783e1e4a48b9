//! Provider and consumer clients shared by the scenarios

use access::{Handle, OmmConsumerClient, OmmConsumerEvent, OmmProviderClient, OmmProviderEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};
use types::{
    AckMsg, CloseMsg, DomainType, FieldList, PostMsg, RefreshMsg, ReqMsg, State, StatusMsg, UpdateMsg,
};

/// Field id of the last trade price in the test payloads
pub const TRDPRC_1: i16 = 6;

/// Interactive provider serving every item of its service
///
/// Logins are accepted, items are answered with a refresh unless held, and
/// posts asking for an acknowledgement get one.
#[derive(Default)]
pub struct FeedProvider {
    held: Mutex<HashSet<String>>,
    items: Mutex<HashMap<String, Handle>>,
    requests: AtomicUsize,
    closes: AtomicUsize,
    posts: AtomicUsize,
}

impl FeedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave the refresh of `name` to the scenario
    pub fn hold(&self, name: &str) {
        self.held.lock().insert(name.to_string());
    }

    /// Provider handle of the latest request for `name`
    pub fn handle(&self, name: &str) -> Option<Handle> {
        self.items.lock().get(name).copied()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

/// Solicited, complete Open/Ok refresh with a one-field payload
pub fn item_refresh(name: &str, price: i64) -> RefreshMsg {
    RefreshMsg::new()
        .name(name)
        .state(State::open_ok("All is well"))
        .solicited(true)
        .complete(true)
        .payload(price_fields(price))
}

/// Update numbered `seq` so the consumer side can check ordering
pub fn item_update(seq: u32, price: i64) -> UpdateMsg {
    UpdateMsg::new().seq_num(seq).payload(price_fields(price))
}

fn price_fields(price: i64) -> FieldList {
    let mut fields = FieldList::new();
    if fields.add_int(TRDPRC_1, price).is_err() || fields.complete().is_err() {
        warn!("Test payload could not be built");
    }
    fields
}

impl OmmProviderClient for FeedProvider {
    fn on_req(&self, request: &ReqMsg, event: &OmmProviderEvent<'_>) {
        let name = request.key.name.clone().unwrap_or_default();
        if request.domain == DomainType::LOGIN {
            let refresh = RefreshMsg::new()
                .domain(DomainType::LOGIN)
                .name(name)
                .state(State::open_ok("Login accepted"))
                .solicited(true)
                .complete(true);
            if let Err(error) = event.submit(refresh) {
                warn!(%error, "Login refresh not sent");
            }
            return;
        }
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.held.lock().contains(&name) {
            if let Err(error) = event.submit(item_refresh(&name, 100)) {
                warn!(%error, item = %name, "Refresh not sent");
            }
        }
        debug!(item = %name, handle = %event.handle(), "Item requested");
        self.items.lock().insert(name, event.handle());
    }

    fn on_close(&self, close: &CloseMsg, _event: &OmmProviderEvent<'_>) {
        debug!(stream_id = close.stream_id, "Item closed");
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_post(&self, post: &PostMsg, event: &OmmProviderEvent<'_>) {
        self.posts.fetch_add(1, Ordering::SeqCst);
        if !post.ack_requested {
            return;
        }
        let ack = AckMsg::new().ack_id(post.post_id.unwrap_or_default());
        if let Err(error) = event.submit(ack) {
            warn!(%error, "Ack not sent");
        }
    }
}

/// What a consumer client saw, in callback order
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Refresh { handle: Handle, parent: Option<Handle>, state: State },
    Update { handle: Handle, seq: u32 },
    Status { handle: Handle, state: Option<State> },
    Ack { handle: Handle, id: u32 },
}

impl Observed {
    pub fn handle(&self) -> Handle {
        match self {
            Observed::Refresh { handle, .. }
            | Observed::Update { handle, .. }
            | Observed::Status { handle, .. }
            | Observed::Ack { handle, .. } => *handle,
        }
    }
}

/// Consumer client recording every callback
#[derive(Default)]
pub struct RecordingClient {
    observed: Mutex<Vec<Observed>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().clone()
    }

    pub fn for_handle(&self, handle: Handle) -> Vec<Observed> {
        self.observed
            .lock()
            .iter()
            .filter(|o| o.handle() == handle)
            .cloned()
            .collect()
    }

    pub fn count(&self, mut matches: impl FnMut(&Observed) -> bool) -> usize {
        self.observed.lock().iter().filter(|o| matches(o)).count()
    }
}

impl OmmConsumerClient for RecordingClient {
    fn on_refresh(&self, refresh: &RefreshMsg, event: &OmmConsumerEvent<'_>) {
        self.observed.lock().push(Observed::Refresh {
            handle: event.handle(),
            parent: event.parent_handle(),
            state: refresh.state.clone(),
        });
    }

    fn on_update(&self, update: &UpdateMsg, event: &OmmConsumerEvent<'_>) {
        self.observed.lock().push(Observed::Update {
            handle: event.handle(),
            seq: update.seq_num.unwrap_or_default(),
        });
    }

    fn on_status(&self, status: &StatusMsg, event: &OmmConsumerEvent<'_>) {
        self.observed.lock().push(Observed::Status {
            handle: event.handle(),
            state: status.state.clone(),
        });
    }

    fn on_ack(&self, ack: &AckMsg, event: &OmmConsumerEvent<'_>) {
        self.observed.lock().push(Observed::Ack {
            handle: event.handle(),
            id: ack.ack_id,
        });
    }
}
