//! Session control plane: login, directory and dictionary download

use super::{
    ConsumerWatchlist, Kind, Route, Stream, DIRECTORY_STREAM_ID, DOWNLOADED_DICTIONARY,
    ENUM_DICTIONARY_STREAM_ID, FIELD_DICTIONARY_STREAM_ID, FIRST_ITEM_STREAM_ID, LOGIN_STREAM_ID,
};
use crate::effects::{Delivery, Effects};
use crate::handle::Handle;
use crate::services::{Availability, ServiceCache, ServiceChange};
use crate::state::ItemState;
use codec::{DataDictionary, DictionaryKind, Verbosity, ENUM_DICTIONARY_NAME, FIELD_DICTIONARY_NAME};
use network::ChannelId;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use types::rdm::directory::{self, filter_mask};
use types::rdm::login::{LoginRtt, LoginSupport};
use types::{
    CloseMsg, DomainType, GenericMsg, MapAction, Msg, RefreshMsg, ReqMsg, State, StatusCode, StatusMsg,
    StreamState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Channel not connected
    Down,
    LoginPending,
    DirectoryPending,
    DictionaryPending,
    /// Items may be routed here
    Ready,
    /// The provider rejected the login; the session stays idle until the channel is recycled
    LoginDenied,
    Closed,
}

impl SessionPhase {
    /// The channel is up and logged in or logging in
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SessionPhase::LoginPending
                | SessionPhase::DirectoryPending
                | SessionPhase::DictionaryPending
                | SessionPhase::Ready
        )
    }
}

/// Dictionary parts downloaded so far
#[derive(Default)]
pub(crate) struct DictionaryDownload {
    pub dictionary: DataDictionary,
    pub fields_done: bool,
    pub enums_done: bool,
}

pub(crate) struct Session {
    pub channel: ChannelId,
    pub name: String,
    pub phase: SessionPhase,
    pub services: ServiceCache,
    pub login_refresh: Option<RefreshMsg>,
    pub support: LoginSupport,
    /// Wire stream id to owning registration
    pub streams: HashMap<i32, Handle>,
    pub next_stream_id: i32,
    pub download: Option<DictionaryDownload>,
}

impl Session {
    pub fn new(channel: ChannelId, name: String) -> Self {
        Self {
            channel,
            name,
            phase: SessionPhase::Down,
            services: ServiceCache::new(),
            login_refresh: None,
            support: LoginSupport::default(),
            streams: HashMap::new(),
            next_stream_id: FIRST_ITEM_STREAM_ID,
            download: None,
        }
    }

    pub fn allocate_stream_id(&mut self) -> i32 {
        let id = self.next_stream_id;
        self.next_stream_id = if id == i32::MAX { FIRST_ITEM_STREAM_ID } else { id + 1 };
        id
    }
}

fn directory_request() -> ReqMsg {
    ReqMsg::new()
        .stream_id(DIRECTORY_STREAM_ID)
        .domain(DomainType::SOURCE)
        .filter(filter_mask::WATCHLIST)
}

fn dictionary_request(stream_id: i32, name: &str, service_id: u16) -> ReqMsg {
    ReqMsg::new()
        .stream_id(stream_id)
        .domain(DomainType::DICTIONARY)
        .name(name)
        .service_id(service_id)
        .filter(Verbosity::Normal.filter())
        .interest_after_refresh(false)
}

impl ConsumerWatchlist {
    /// The channel of a session connected; starts the login
    pub fn channel_up(&mut self, channel: ChannelId) -> Effects {
        let mut effects = Effects::new();
        let login = self.login_request.clone();
        let Some(session) = self.session_mut(channel) else {
            warn!(channel = %channel, "Channel up for an unknown session");
            return effects;
        };
        session.phase = SessionPhase::LoginPending;
        session.next_stream_id = FIRST_ITEM_STREAM_ID;
        info!(session = %session.name, channel = %channel, "Channel up, logging in");
        effects.send(channel, login);
        effects
    }

    /// The channel of a session went away
    ///
    /// With `reconnecting` false and no other connected session left, items
    /// are closed instead of suspended.
    pub fn channel_down(&mut self, channel: ChannelId, reconnecting: bool, reason: &str) -> Effects {
        let mut effects = Effects::new();
        let Some(session) = self.session_mut(channel) else {
            return effects;
        };
        session.phase = if reconnecting { SessionPhase::Down } else { SessionPhase::Closed };
        session.services.clear();
        session.streams.clear();
        session.login_refresh = None;
        session.download = None;
        warn!(channel = %channel, reconnecting, reason, "Channel down");

        let others_alive = self
            .sessions
            .iter()
            .any(|s| s.channel != channel && s.phase.is_connected());
        let recoverable = reconnecting || others_alive;

        let affected: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| match s.kind {
                Kind::Login => s.route.is_some_and(|r| r.channel == channel),
                Kind::Sub { .. } | Kind::Batch { .. } | Kind::Directory { .. } => false,
                _ => s.route.is_some_and(|r| r.channel == channel) || !recoverable,
            })
            .map(|(handle, _)| handle)
            .collect();

        for handle in affected {
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            let private = stream.request.private_stream || matches!(stream.kind, Kind::Tunnel { .. });
            match stream.kind {
                Kind::Login => {
                    let status = StatusMsg::new()
                        .stream_id(LOGIN_STREAM_ID)
                        .domain(DomainType::LOGIN)
                        .state(State::open_suspect(StatusCode::NONE, reason));
                    stream.state = ItemState::Suspect;
                    effects.deliver(stream.delivery(handle, status));
                    stream.route = None;
                }
                _ if recoverable && !private => {
                    stream.state = ItemState::Suspect;
                    stream.awaiting_refresh = false;
                    stream.notified = false;
                    let status = stream.status(State::open_suspect(StatusCode::NONE, reason));
                    effects.deliver(stream.delivery(handle, status));
                    stream.route = None;
                }
                _ => {
                    let status = stream.status(State::closed(StatusCode::NONE, reason));
                    effects.deliver(stream.delivery(handle, status).retiring());
                    self.retire(handle, &mut effects);
                }
            }
        }
        effects
    }

    /// Inbound message from a session's channel
    pub fn on_message(&mut self, channel: ChannelId, msg: Msg, now: Instant) -> Effects {
        let mut effects = Effects::new();
        match msg.stream_id() {
            LOGIN_STREAM_ID => self.on_login(channel, msg, now, &mut effects),
            DIRECTORY_STREAM_ID => self.on_directory(channel, msg, now, &mut effects),
            FIELD_DICTIONARY_STREAM_ID | ENUM_DICTIONARY_STREAM_ID => {
                self.on_dictionary(channel, msg, now, &mut effects)
            }
            _ => self.on_item(channel, msg, now, &mut effects),
        }
        effects
    }

    fn login_clients(&self) -> Vec<Handle> {
        self.streams
            .iter()
            .filter(|(_, s)| matches!(s.kind, Kind::Login))
            .map(|(handle, _)| handle)
            .collect()
    }

    fn deliver_to_login_clients(&mut self, channel: ChannelId, msg: &Msg, state: Option<ItemState>, effects: &mut Effects) {
        for handle in self.login_clients() {
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            stream.route = Some(Route {
                channel,
                stream_id: LOGIN_STREAM_ID,
            });
            if let Some(state) = state {
                stream.state = state;
            }
            effects.deliver(stream.delivery(handle, msg.clone()));
        }
    }

    fn on_login(&mut self, channel: ChannelId, msg: Msg, now: Instant, effects: &mut Effects) {
        let support_rtt = self.settings.login.support_rtt;
        let Some(session) = self.session_mut(channel) else { return };
        match &msg {
            Msg::Refresh(refresh) => {
                let open = refresh.state.stream_state == StreamState::Open;
                if !open {
                    session.phase = SessionPhase::LoginDenied;
                    warn!(channel = %channel, state = %refresh.state, "Login refresh not open");
                    self.deliver_to_login_clients(channel, &msg, Some(ItemState::Closed), effects);
                    return;
                }
                session.support = LoginSupport::from_refresh(refresh);
                session.login_refresh = Some(refresh.clone());
                let first = session.phase == SessionPhase::LoginPending;
                if first {
                    session.phase = SessionPhase::DirectoryPending;
                    info!(session = %session.name, "Login accepted, requesting directory");
                    effects.send(channel, directory_request());
                }
                self.deliver_to_login_clients(channel, &msg, Some(ItemState::Open), effects);
                if !first {
                    self.route_pending(now, effects);
                }
            }
            Msg::Status(status) => {
                let closed = status
                    .state
                    .as_ref()
                    .is_some_and(|s| matches!(s.stream_state, StreamState::Closed | StreamState::ClosedRecover));
                if closed {
                    session.phase = SessionPhase::LoginDenied;
                    warn!(channel = %channel, "Login stream closed by provider");
                }
                let state = closed.then_some(ItemState::Closed);
                self.deliver_to_login_clients(channel, &msg, state, effects);
            }
            Msg::Generic(generic) => {
                if let (true, Some(rtt)) = (support_rtt, LoginRtt::from_generic(generic)) {
                    debug!(channel = %channel, ticks = rtt.ticks, "Echoing RTT probe");
                    let mut echo: GenericMsg = generic.clone();
                    echo.stream_id = LOGIN_STREAM_ID;
                    effects.send(channel, echo);
                }
                self.deliver_to_login_clients(channel, &msg, None, effects);
            }
            Msg::Ack(ack) => {
                let owner = self.pending_posts.remove(&(channel, LOGIN_STREAM_ID, ack.ack_id));
                if let Some(handle) = owner {
                    if let Some(stream) = self.streams.get(handle) {
                        effects.deliver(stream.delivery(handle, msg.clone()));
                    }
                } else {
                    self.deliver_to_login_clients(channel, &msg, None, effects);
                }
            }
            Msg::Close(_) => {
                session.phase = SessionPhase::LoginDenied;
                self.deliver_to_login_clients(channel, &msg, Some(ItemState::Closed), effects);
            }
            other => debug!(class = ?other.class(), "Ignoring message on login stream"),
        }
    }

    fn on_directory(&mut self, channel: ChannelId, msg: Msg, now: Instant, effects: &mut Effects) {
        let payload = match &msg {
            Msg::Refresh(refresh) => &refresh.payload,
            Msg::Update(update) => &update.payload,
            Msg::Status(_) => return,
            other => {
                debug!(class = ?other.class(), "Ignoring message on directory stream");
                return;
            }
        };
        let entries = match directory::decode(payload) {
            Ok(entries) => entries,
            Err(e) => {
                error!(channel = %channel, error = %e, "Undecodable directory payload");
                return;
            }
        };
        let Some(session) = self.session_mut(channel) else { return };
        let changes = session.services.apply(entries.clone());
        let first = matches!(msg, Msg::Refresh(_)) && session.phase == SessionPhase::DirectoryPending;
        debug!(channel = %channel, services = session.services.len(), changes = changes.len(), "Directory applied");

        self.fan_out_directory(channel, &msg, &entries, effects);
        for change in &changes {
            self.on_service_change(channel, change, now, effects);
        }
        self.on_item_groups(channel, &entries, now, effects);

        if first {
            self.start_dictionary_download(channel, now, effects);
        } else if !changes.is_empty() {
            self.route_pending(now, effects);
        }
    }

    /// Forward a directory message to matching directory registrations
    fn fan_out_directory(&mut self, channel: ChannelId, msg: &Msg, entries: &[directory::ServiceEntry], effects: &mut Effects) {
        let clients: Vec<(Handle, Option<String>, u32)> = self
            .streams
            .iter()
            .filter_map(|(handle, s)| match &s.kind {
                Kind::Directory { service } => Some((
                    handle,
                    service.clone(),
                    s.request.key.filter.unwrap_or(filter_mask::INFO_STATE),
                )),
                _ => None,
            })
            .collect();
        let Some(session) = self.sessions.iter().find(|s| s.channel == channel) else { return };
        for (handle, service, filter) in clients {
            let selected: Vec<directory::ServiceEntry> = entries
                .iter()
                .filter(|e| carries_filter(e, filter))
                .filter(|e| match &service {
                    None => true,
                    Some(name) => session.services.name_of(e.id) == Some(name.as_str())
                        || e.info.as_ref().is_some_and(|i| &i.name == name),
                })
                .cloned()
                .collect();
            if selected.is_empty() {
                continue;
            }
            let payload = match directory::encode(&selected, filter) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "Directory re-encode failed");
                    continue;
                }
            };
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            let was_open = stream.state.is_open();
            let out: Msg = match msg {
                Msg::Refresh(refresh) if !was_open => {
                    let mut refresh = refresh.clone();
                    refresh.payload = payload;
                    refresh.solicited = true;
                    Msg::Refresh(refresh)
                }
                Msg::Refresh(refresh) => {
                    let mut update = types::UpdateMsg::new()
                        .domain(DomainType::SOURCE)
                        .filter(filter)
                        .payload(payload);
                    update.stream_id = refresh.stream_id;
                    Msg::Update(update)
                }
                Msg::Update(update) => {
                    let mut update = update.clone();
                    update.payload = payload;
                    Msg::Update(update)
                }
                _ => continue,
            };
            stream.state = ItemState::Open;
            stream.route = Some(Route {
                channel,
                stream_id: DIRECTORY_STREAM_ID,
            });
            effects.deliver(stream.delivery(handle, out));
        }
    }

    fn on_service_change(&mut self, channel: ChannelId, change: &ServiceChange, now: Instant, effects: &mut Effects) {
        if change.now == Availability::Available {
            info!(service = %change.name, channel = %channel, "Service available");
            return;
        }
        warn!(service = %change.name, channel = %channel, availability = ?change.now, "Service lost");
        let affected: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| {
                s.routable()
                    && s.route.is_some_and(|r| r.channel == channel)
                    && s.request.key.service_id == Some(change.id)
            })
            .map(|(handle, _)| handle)
            .collect();
        for handle in affected {
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            let route = stream.route.take();
            let text = match change.now {
                Availability::Deleted => "Service deleted",
                _ => "Service down",
            };
            if stream.request.private_stream || matches!(stream.kind, Kind::Tunnel { .. }) {
                let domain = stream.request.domain;
                let status = stream.status(State::closed(StatusCode::NONE, text));
                effects.deliver(stream.delivery(handle, status).retiring());
                self.retire(handle, effects);
                if let Some(route) = route {
                    effects.send(route.channel, CloseMsg::new(route.stream_id, domain));
                }
                continue;
            }
            stream.state = ItemState::Suspect;
            stream.awaiting_refresh = false;
            stream.notified = true;
            let status = stream.status(State::open_suspect(StatusCode::NONE, text));
            effects.deliver(stream.delivery(handle, status));
            if let Some(route) = route {
                let domain = stream.request.domain;
                if change.now == Availability::Unavailable {
                    effects.send(route.channel, CloseMsg::new(route.stream_id, domain));
                }
                if let Some(session) = self.session_mut(route.channel) {
                    session.streams.remove(&route.stream_id);
                }
            }
            self.try_route(handle, now, effects);
        }
    }

    fn start_dictionary_download(&mut self, channel: ChannelId, now: Instant, effects: &mut Effects) {
        let wanted = self.settings.download_dictionary && !self.registry.contains(DOWNLOADED_DICTIONARY);
        let Some(session) = self.session_mut(channel) else { return };
        if wanted {
            let field = session.services.dictionary_provider(FIELD_DICTIONARY_NAME);
            let enums = session.services.dictionary_provider(ENUM_DICTIONARY_NAME);
            if let (Some(field), Some(enums)) = (field, enums) {
                session.phase = SessionPhase::DictionaryPending;
                session.download = Some(DictionaryDownload::default());
                info!(session = %session.name, "Downloading dictionary");
                effects.send(channel, dictionary_request(FIELD_DICTIONARY_STREAM_ID, FIELD_DICTIONARY_NAME, field));
                effects.send(channel, dictionary_request(ENUM_DICTIONARY_STREAM_ID, ENUM_DICTIONARY_NAME, enums));
                return;
            }
            warn!(session = %session.name, "No service provides the dictionary, continuing without it");
        }
        self.session_ready(channel, now, effects);
    }

    fn on_dictionary(&mut self, channel: ChannelId, msg: Msg, now: Instant, effects: &mut Effects) {
        let Some(session) = self.session_mut(channel) else { return };
        let Some(download) = session.download.as_mut() else {
            debug!(channel = %channel, "Dictionary message without a download in progress");
            return;
        };
        match &msg {
            Msg::Refresh(refresh) => match codec::apply_payload(&mut download.dictionary, &refresh.payload) {
                Ok(kind) => {
                    if refresh.complete {
                        match kind {
                            DictionaryKind::FieldDefinitions => download.fields_done = true,
                            DictionaryKind::EnumTables => download.enums_done = true,
                        }
                    }
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Dictionary download failed");
                    session.download = None;
                    self.session_ready(channel, now, effects);
                    return;
                }
            },
            Msg::Status(status) => {
                if status.state.as_ref().is_some_and(|s| s.stream_state != StreamState::Open) {
                    warn!(channel = %channel, "Dictionary stream closed before completion");
                    session.download = None;
                    self.session_ready(channel, now, effects);
                }
                return;
            }
            _ => return,
        }
        let done = session
            .download
            .as_ref()
            .is_some_and(|d| d.fields_done && d.enums_done);
        if done {
            if let Some(download) = session.download.take() {
                info!(fields = download.dictionary.field_count(), "Dictionary downloaded");
                self.registry.insert(DOWNLOADED_DICTIONARY, download.dictionary);
            }
            self.session_ready(channel, now, effects);
        }
    }

    fn session_ready(&mut self, channel: ChannelId, now: Instant, effects: &mut Effects) {
        let Some(session) = self.session_mut(channel) else { return };
        session.phase = SessionPhase::Ready;
        info!(session = %session.name, channel = %channel, "Session ready");
        // Directory registrations made while no session was ready
        let waiting: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| matches!(s.kind, Kind::Directory { .. }) && s.state == ItemState::Pending)
            .map(|(handle, _)| handle)
            .collect();
        for handle in waiting {
            let refresh = match self.directory_refresh(handle) {
                Ok(refresh) => refresh,
                Err(e) => {
                    error!(handle = %handle, error = %e, "Directory refresh encode failed");
                    continue;
                }
            };
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            stream.state = ItemState::Open;
            stream.route = Some(Route {
                channel,
                stream_id: DIRECTORY_STREAM_ID,
            });
            effects.deliver(stream.delivery(handle, refresh));
        }
        self.route_pending(now, effects);
    }

    /// Remove a registration after its final delivery
    pub(crate) fn retire(&mut self, handle: Handle, effects: &mut Effects) {
        let Some(stream) = self.streams.remove(handle) else { return };
        if let Some(route) = stream.route {
            if let Some(session) = self.session_mut(route.channel) {
                session.streams.remove(&route.stream_id);
            }
        }
        match stream.kind {
            Kind::Tunnel { subs, .. } => {
                for sub in subs.into_values() {
                    if let Some(sub_stream) = self.streams.remove(sub) {
                        let status = sub_stream.status(State::closed(StatusCode::NONE, "Tunnel closed"));
                        effects.deliver(Delivery::message(sub, Some(handle), None, status.into()).retiring());
                    }
                }
            }
            Kind::Sub { tunnel, inner, .. } => {
                if let Some(Stream {
                    kind: Kind::Tunnel { subs, .. },
                    ..
                }) = self.streams.get_mut(tunnel)
                {
                    subs.remove(&inner);
                }
            }
            Kind::Item => {
                if let Some(parent) = stream.parent {
                    self.leave_batch(parent, handle);
                }
            }
            _ => {}
        }
    }
}

/// Whether `entry` still says something once reduced to `filter`
fn carries_filter(entry: &directory::ServiceEntry, filter: u32) -> bool {
    entry.action != MapAction::Update
        || (entry.info.is_some() && filter & filter_mask::INFO != 0)
        || (entry.state.is_some() && filter & filter_mask::STATE != 0)
        || (!entry.groups.is_empty() && filter & filter_mask::GROUP != 0)
}
