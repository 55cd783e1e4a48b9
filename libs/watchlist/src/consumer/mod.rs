//! Consumer watchlist
//!
//! ## Purpose
//!
//! Owns every stream a consumer opened: item streams, batch parents, tunnels
//! and their sub-streams, plus the application's login and directory
//! registrations. It runs the control plane of each session (login, then
//! directory, then optional dictionary download) and only routes item
//! requests to a session once that session is ready.
//!
//! ## Architecture Role
//!
//! ```text
//!  register / reissue / unregister / submit ──┐
//!                                              ▼
//!  reactor events ──→ channel_up / channel_down / on_message / tick
//!                                              │
//!                                              ▼
//!                          Effects { outbound, deliveries, violations }
//! ```
//!
//! ## Recovery
//!
//! When a channel goes down every item routed over it receives an
//! Open/Suspect status and loses its stream. When a session becomes ready
//! again, or another session starts advertising the same service name, the
//! item is requested again and the next refresh returns it to Open.
//!
//! ## Item groups
//!
//! Providers tag items with an opaque group id on refreshes and statuses.
//! A directory Group entry then changes every item of that group at once:
//! its status is applied to each member, and a merge re-tags the members.

mod items;
mod session;
mod tunnels;

pub use session::SessionPhase;

use crate::effects::{Delivery, Effects};
use crate::error::{Result, WatchlistError};
use crate::handle::{Handle, HandleArena};
use crate::state::ItemState;
use crate::tunnel::TunnelSequence;
use bytes::Bytes;
use codec::DictionaryRegistry;
use network::ChannelId;
use session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use types::rdm::directory::{self, filter_mask};
use types::rdm::login::{LoginRequest, LoginSupport};
use types::rdm::{batch, view};
use types::{
    CloseMsg, DomainType, GenericMsg, Msg, MsgKey, PostMsg, RefreshMsg, ReqMsg, State, StatusMsg,
};

pub const LOGIN_STREAM_ID: i32 = 1;
pub const DIRECTORY_STREAM_ID: i32 = 2;
pub const FIELD_DICTIONARY_STREAM_ID: i32 = 3;
pub const ENUM_DICTIONARY_STREAM_ID: i32 = 4;
pub const FIRST_ITEM_STREAM_ID: i32 = 5;

/// Name under which a downloaded dictionary is stored in the registry
pub const DOWNLOADED_DICTIONARY: &str = "downloaded";

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub login: LoginRequest,
    /// Pending requests older than this get a suspect status and are re-sent
    pub request_timeout: Duration,
    pub download_dictionary: bool,
}

impl ConsumerSettings {
    pub fn new(login: LoginRequest) -> Self {
        Self {
            login,
            request_timeout: Duration::from_secs(15),
            download_dictionary: false,
        }
    }
}

pub(crate) enum Kind {
    Item,
    Batch { members: Vec<Handle> },
    Login,
    Directory { service: Option<String> },
    Tunnel { sequence: TunnelSequence, subs: HashMap<i32, Handle>, next_sub: i32 },
    Sub { tunnel: Handle, inner: i32, sent: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Route {
    pub channel: ChannelId,
    pub stream_id: i32,
}

pub(crate) struct Stream {
    pub kind: Kind,
    pub request: ReqMsg,
    pub parent: Option<Handle>,
    pub state: ItemState,
    pub route: Option<Route>,
    pub sent_at: Option<Instant>,
    pub awaiting_refresh: bool,
    /// "No matching service" already reported for the current outage
    pub notified: bool,
    /// Item group the provider put this stream in; empty when ungrouped
    pub group: Bytes,
}

impl Stream {
    fn new(kind: Kind, request: ReqMsg, parent: Option<Handle>) -> Self {
        Self {
            kind,
            request,
            parent,
            state: ItemState::Unopened,
            route: None,
            sent_at: None,
            awaiting_refresh: false,
            notified: false,
            group: Bytes::new(),
        }
    }

    fn routable(&self) -> bool {
        matches!(self.kind, Kind::Item | Kind::Tunnel { .. })
    }

    /// Status for this stream's item
    pub(crate) fn status(&self, state: State) -> StatusMsg {
        let mut status = StatusMsg::new().domain(self.request.domain).state(state);
        status.stream_id = self.route.map(|r| r.stream_id).unwrap_or(0);
        status.key = MsgKey {
            name: self.request.key.name.clone(),
            name_type: self.request.key.name_type,
            service_id: self.request.key.service_id,
            service_name: self.request.key.service_name.clone(),
            ..MsgKey::default()
        };
        status.private_stream = self.request.private_stream;
        status
    }

    pub(crate) fn delivery(&self, handle: Handle, msg: impl Into<Msg>) -> Delivery {
        Delivery::message(handle, self.parent, self.route.map(|r| r.channel), msg.into())
    }
}

pub struct ConsumerWatchlist {
    settings: ConsumerSettings,
    login_request: ReqMsg,
    streams: HandleArena<Stream>,
    sessions: Vec<Session>,
    registry: Arc<DictionaryRegistry>,
    /// (channel, stream id, post id) of posts awaiting an ack on the login stream
    pending_posts: HashMap<(ChannelId, i32, u32), Handle>,
    shutdown: bool,
}

impl ConsumerWatchlist {
    pub fn new(settings: ConsumerSettings, registry: Arc<DictionaryRegistry>) -> Result<Self> {
        let login_request = settings.login.to_req_msg(LOGIN_STREAM_ID)?;
        Ok(Self {
            settings,
            login_request,
            streams: HandleArena::new(),
            sessions: Vec::new(),
            registry,
            pending_posts: HashMap::new(),
            shutdown: false,
        })
    }

    /// Add a session served by `channel`; items are routed across sessions in add order
    pub fn add_session(&mut self, channel: ChannelId, name: impl Into<String>) {
        self.sessions.push(Session::new(channel, name.into()));
    }

    pub fn registry(&self) -> &Arc<DictionaryRegistry> {
        &self.registry
    }

    fn check_running(&self) -> Result<()> {
        if self.shutdown {
            return Err(WatchlistError::Shutdown);
        }
        Ok(())
    }

    /// Open a stream for `request`
    ///
    /// `parent` names a tunnel when opening a sub-stream inside it.
    pub fn register(
        &mut self,
        request: ReqMsg,
        parent: Option<Handle>,
        now: Instant,
    ) -> Result<(Handle, Effects)> {
        self.check_running()?;
        Msg::Request(request.clone()).validate_complete()?;
        let mut effects = Effects::new();
        let handle = match (parent, request.domain) {
            (Some(tunnel), _) => self.register_sub_stream(tunnel, request, &mut effects)?,
            (None, DomainType::LOGIN) => self.register_login(request, &mut effects),
            (None, DomainType::SOURCE) => self.register_directory(request, &mut effects)?,
            (None, _) if request.has_batch => self.register_batch(request, now, &mut effects)?,
            (None, domain) if request.private_stream && domain.value() >= DomainType::CUSTOM_START => {
                self.register_tunnel(request, now, &mut effects)?
            }
            (None, _) => {
                require_service(&request)?;
                if request.key.name.is_none() {
                    return Err(WatchlistError::invalid_usage("item request must carry a name"));
                }
                let handle = self.streams.insert(Stream::new(Kind::Item, request, None));
                self.try_route(handle, now, &mut effects);
                handle
            }
        };
        Ok((handle, effects))
    }

    fn register_login(&mut self, request: ReqMsg, effects: &mut Effects) -> Handle {
        let cached = self
            .sessions
            .iter()
            .find_map(|s| s.login_refresh.clone().map(|r| (s.channel, r)));
        let mut stream = Stream::new(Kind::Login, request, None);
        if let Some((channel, mut refresh)) = cached {
            stream.state = ItemState::Open;
            stream.route = Some(Route {
                channel,
                stream_id: LOGIN_STREAM_ID,
            });
            refresh.solicited = true;
            let handle = self.streams.insert(stream);
            if let Some(stream) = self.streams.get(handle) {
                effects.deliver(stream.delivery(handle, refresh));
            }
            return handle;
        }
        stream.state = ItemState::Pending;
        self.streams.insert(stream)
    }

    fn register_directory(&mut self, request: ReqMsg, effects: &mut Effects) -> Result<Handle> {
        let service = request.key.service_name.clone();
        let ready = self.sessions.iter().any(|s| s.phase == SessionPhase::Ready);
        let mut stream = Stream::new(Kind::Directory { service }, request, None);
        stream.state = ItemState::Pending;
        let handle = self.streams.insert(stream);
        if ready {
            let refresh = self.directory_refresh(handle)?;
            if let Some(stream) = self.streams.get_mut(handle) {
                stream.state = ItemState::Open;
                effects.deliver(stream.delivery(handle, refresh));
            }
        }
        Ok(handle)
    }

    /// Refresh for a directory registration built from the cached services
    pub(crate) fn directory_refresh(&self, handle: Handle) -> Result<RefreshMsg> {
        let stream = self
            .streams
            .get(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        let Kind::Directory { service } = &stream.kind else {
            return Err(WatchlistError::invalid_usage("not a directory registration"));
        };
        let filter = stream.request.key.filter.unwrap_or(filter_mask::INFO_STATE);
        let payload = directory::encode(&self.directory_entries(service.as_deref()), filter)?;
        let mut refresh = RefreshMsg::new()
            .stream_id(DIRECTORY_STREAM_ID)
            .domain(DomainType::SOURCE)
            .filter(filter)
            .state(State::open_ok(""))
            .solicited(true)
            .complete(true)
            .payload(payload);
        refresh.key.service_name = service.clone();
        Ok(refresh)
    }

    /// Services of every ready session, first session wins on a name clash
    fn directory_entries(&self, only: Option<&str>) -> Vec<directory::ServiceEntry> {
        let mut entries: Vec<directory::ServiceEntry> = Vec::new();
        for session in self.sessions.iter().filter(|s| s.phase == SessionPhase::Ready) {
            for entry in session.services.entries(only) {
                let name = entry.info.as_ref().map(|i| i.name.clone());
                let clash = entries
                    .iter()
                    .any(|e| e.info.as_ref().map(|i| i.name.clone()) == name);
                if !clash {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    fn register_batch(&mut self, request: ReqMsg, now: Instant, effects: &mut Effects) -> Result<Handle> {
        require_service(&request)?;
        let names = batch::item_names(&request.payload)
            .filter(|names| !names.is_empty())
            .ok_or_else(|| WatchlistError::invalid_usage("batch request without an item list"))?;
        let payload = view::without_batch(&request.payload)?;

        let mut member_request = request.clone();
        member_request.has_batch = false;
        member_request.has_view = view::field_ids(&payload).is_some();
        member_request.payload = payload;

        let mut parent_stream = Stream::new(Kind::Batch { members: Vec::new() }, request, None);
        parent_stream.state = ItemState::Pending;
        let parent = self.streams.insert(parent_stream);

        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let mut item = member_request.clone();
            item.key.name = Some(name);
            members.push(self.streams.insert(Stream::new(Kind::Item, item, Some(parent))));
        }
        if let Some(Stream {
            kind: Kind::Batch { members: slot },
            ..
        }) = self.streams.get_mut(parent)
        {
            *slot = members.clone();
        }
        debug!(handle = %parent, members = members.len(), "Batch request split");
        for member in members {
            self.try_route(member, now, effects);
        }
        Ok(parent)
    }

    /// Change priority, view or pause state of an open registration
    pub fn reissue(&mut self, handle: Handle, request: ReqMsg, now: Instant) -> Result<Effects> {
        self.check_running()?;
        Msg::Request(request.clone()).validate_complete()?;
        let mut effects = Effects::new();
        let stream = self
            .streams
            .get_mut(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        match &mut stream.kind {
            Kind::Batch { members } => {
                let members = members.clone();
                let mut member_request = request;
                member_request.payload = view::without_batch(&member_request.payload)?;
                member_request.has_batch = false;
                for member in members {
                    effects.extend(self.reissue(member, member_request.clone(), now)?);
                }
            }
            Kind::Directory { service } => {
                *service = request.key.service_name.clone();
                stream.request.key.filter = request.key.filter;
            }
            Kind::Login => {
                self.login_request = ReqMsg {
                    stream_id: LOGIN_STREAM_ID,
                    domain: DomainType::LOGIN,
                    ..request
                };
                for session in self.sessions.iter().filter(|s| s.phase.is_connected()) {
                    effects.send(session.channel, self.login_request.clone());
                }
            }
            Kind::Item | Kind::Tunnel { .. } | Kind::Sub { .. } => {
                if request.key.name.is_some() && request.key.name != stream.request.key.name {
                    return Err(WatchlistError::invalid_usage(
                        "reissue may not change the item name",
                    ));
                }
                stream.request.priority = request.priority.or(stream.request.priority);
                stream.request.pause = request.pause;
                stream.request.has_view = request.has_view;
                stream.request.payload = request.payload;
                stream.request.qos = request.qos.or(stream.request.qos);
                let mut wire = stream.request.clone();
                wire.key.service_name = None;
                wire.initial_image = request.initial_image;
                if wire.initial_image {
                    stream.awaiting_refresh = true;
                    stream.sent_at = Some(now);
                }
                match (&stream.kind, stream.route) {
                    (Kind::Sub { tunnel, inner, sent: true }, _) => {
                        let (tunnel, inner) = (*tunnel, *inner);
                        wire.stream_id = inner;
                        self.send_in_tunnel(tunnel, Msg::Request(wire), &mut effects);
                    }
                    (_, Some(route)) => {
                        wire.stream_id = route.stream_id;
                        effects.send(route.channel, wire);
                    }
                    _ => {}
                }
            }
        }
        Ok(effects)
    }

    /// Close a registration; no delivery for `handle` follows
    pub fn unregister(&mut self, handle: Handle) -> Result<Effects> {
        let mut effects = Effects::new();
        let stream = self
            .streams
            .remove(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        match stream.kind {
            Kind::Batch { members } => {
                for member in members {
                    if self.streams.contains(member) {
                        effects.extend(self.unregister(member)?);
                    }
                }
            }
            Kind::Login | Kind::Directory { .. } => {}
            Kind::Tunnel { subs, .. } => {
                for sub in subs.values() {
                    self.streams.remove(*sub);
                }
                self.close_route(stream.route, stream.request.domain, &mut effects);
            }
            Kind::Sub { tunnel, inner, sent } => {
                if let Some(Stream {
                    kind: Kind::Tunnel { subs, .. },
                    ..
                }) = self.streams.get_mut(tunnel)
                {
                    subs.remove(&inner);
                }
                if sent {
                    let close = CloseMsg::new(inner, stream.request.domain);
                    self.send_in_tunnel(tunnel, Msg::Close(close), &mut effects);
                }
            }
            Kind::Item => {
                self.close_route(stream.route, stream.request.domain, &mut effects);
                if let Some(parent) = stream.parent {
                    self.leave_batch(parent, handle);
                }
            }
        }
        self.pending_posts.retain(|_, owner| *owner != handle);
        debug!(handle = %handle, "Unregistered");
        Ok(effects)
    }

    fn close_route(&mut self, route: Option<Route>, domain: DomainType, effects: &mut Effects) {
        let Some(route) = route else { return };
        if let Some(session) = self.session_mut(route.channel) {
            session.streams.remove(&route.stream_id);
        }
        effects.send(route.channel, CloseMsg::new(route.stream_id, domain));
    }

    /// Drop `member` from its batch; the parent retires with its last member
    pub(crate) fn leave_batch(&mut self, parent: Handle, member: Handle) {
        let empty = match self.streams.get_mut(parent) {
            Some(Stream {
                kind: Kind::Batch { members },
                ..
            }) => {
                members.retain(|m| *m != member);
                members.is_empty()
            }
            _ => false,
        };
        if empty {
            self.streams.remove(parent);
        }
    }

    /// Send a generic message on an open stream
    pub fn submit_generic(&mut self, handle: Handle, mut generic: GenericMsg) -> Result<Effects> {
        self.check_running()?;
        Msg::Generic(generic.clone()).validate_complete()?;
        let mut effects = Effects::new();
        let stream = self
            .streams
            .get(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        match (&stream.kind, stream.route) {
            (Kind::Sub { tunnel, inner, sent: true }, _) if stream.state.is_open() => {
                let (tunnel, inner) = (*tunnel, *inner);
                generic.stream_id = inner;
                self.send_in_tunnel(tunnel, Msg::Generic(generic), &mut effects);
            }
            (Kind::Item | Kind::Tunnel { .. } | Kind::Login, Some(route)) if stream.state.is_open() => {
                generic.stream_id = route.stream_id;
                effects.send(route.channel, generic);
            }
            _ => {
                return Err(WatchlistError::invalid_usage(format!(
                    "generic message submitted on handle {handle} which is not open"
                )))
            }
        }
        Ok(effects)
    }

    /// Contribute data; a post on a login handle is sent off-stream and must name its service
    pub fn submit_post(&mut self, handle: Handle, mut post: PostMsg) -> Result<Effects> {
        self.check_running()?;
        Msg::Post(post.clone()).validate_complete()?;
        let mut effects = Effects::new();
        let stream = self
            .streams
            .get(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        match (&stream.kind, stream.route) {
            (Kind::Item, Some(route)) if stream.state.is_open() => {
                post.stream_id = route.stream_id;
                self.remember_post(route.channel, route.stream_id, &post, handle);
                effects.send(route.channel, post);
            }
            (Kind::Login, Some(route)) => {
                let session = self
                    .sessions
                    .iter()
                    .find(|s| s.channel == route.channel)
                    .ok_or_else(|| WatchlistError::invalid_usage("login stream has no session"))?;
                if post.key.service_id.is_none() {
                    let name = post.key.service_name.as_deref().ok_or_else(|| {
                        WatchlistError::invalid_usage("off-stream post must name a service")
                    })?;
                    let (id, _) = session.services.by_name(name).ok_or_else(|| {
                        WatchlistError::invalid_usage(format!("service '{name}' is not known"))
                    })?;
                    post.key.service_id = Some(id);
                }
                post.stream_id = LOGIN_STREAM_ID;
                self.remember_post(route.channel, LOGIN_STREAM_ID, &post, handle);
                effects.send(route.channel, post);
            }
            _ => {
                return Err(WatchlistError::invalid_usage(format!(
                    "post submitted on handle {handle} which is not open"
                )))
            }
        }
        Ok(effects)
    }

    fn remember_post(&mut self, channel: ChannelId, stream_id: i32, post: &PostMsg, handle: Handle) {
        if let (true, Some(id)) = (post.ack_requested, post.post_id) {
            self.pending_posts.insert((channel, stream_id, id), handle);
        }
    }

    /// Retry requests that have waited longer than the request timeout
    pub fn tick(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::new();
        let timeout = self.settings.request_timeout;
        let expired: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| {
                s.routable()
                    && s.awaiting_refresh
                    && s.route.is_some()
                    && s.sent_at.is_some_and(|at| now.duration_since(at) >= timeout)
            })
            .map(|(handle, _)| handle)
            .collect();
        for handle in expired {
            let Some(stream) = self.streams.get_mut(handle) else { continue };
            let route = stream.route.take();
            let state = State::open_suspect(types::StatusCode::TIMEOUT, "Request timeout");
            let status = stream.status(state);
            effects.deliver(stream.delivery(handle, status));
            info!(handle = %handle, "Request timed out, re-requesting");
            if let Some(route) = route {
                let domain = stream.request.domain;
                self.close_route(Some(route), domain, &mut effects);
            }
            self.try_route(handle, now, &mut effects);
        }
        effects
    }

    /// Close every stream and log out of every session
    pub fn close_all(&mut self) -> Effects {
        let mut effects = Effects::new();
        for (_, stream) in self.streams.iter() {
            if let (true, Some(route)) = (stream.routable(), stream.route) {
                effects.send(route.channel, CloseMsg::new(route.stream_id, stream.request.domain));
            }
        }
        for session in self.sessions.iter().filter(|s| s.phase.is_connected()) {
            effects.send(session.channel, CloseMsg::new(LOGIN_STREAM_ID, DomainType::LOGIN));
        }
        self.streams = HandleArena::new();
        self.pending_posts.clear();
        self.shutdown = true;
        effects
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.streams.contains(handle)
    }

    /// State of a registration; a batch parent is Open only once every member is
    pub fn state(&self, handle: Handle) -> Option<ItemState> {
        let stream = self.streams.get(handle)?;
        if let Kind::Batch { members } = &stream.kind {
            let all_open = members
                .iter()
                .all(|m| self.streams.get(*m).is_some_and(|s| s.state.is_open()));
            return Some(if all_open { ItemState::Open } else { ItemState::Pending });
        }
        Some(stream.state)
    }

    /// Members of a batch registration
    pub fn batch_members(&self, handle: Handle) -> Option<&[Handle]> {
        match &self.streams.get(handle)?.kind {
            Kind::Batch { members } => Some(members),
            _ => None,
        }
    }

    /// Item group `handle` currently belongs to
    pub fn group_of(&self, handle: Handle) -> Option<&[u8]> {
        self.streams
            .get(handle)
            .map(|s| &s.group[..])
            .filter(|group| !group.is_empty())
    }

    pub fn parent(&self, handle: Handle) -> Option<Handle> {
        self.streams.get(handle)?.parent
    }

    pub fn channel_of(&self, handle: Handle) -> Option<ChannelId> {
        self.streams.get(handle)?.route.map(|r| r.channel)
    }

    pub fn session_phase(&self, channel: ChannelId) -> Option<SessionPhase> {
        self.sessions.iter().find(|s| s.channel == channel).map(|s| s.phase)
    }

    pub fn login_support(&self, channel: ChannelId) -> Option<LoginSupport> {
        self.sessions.iter().find(|s| s.channel == channel).map(|s| s.support)
    }

    /// Every session is ready
    pub fn is_ready(&self) -> bool {
        !self.sessions.is_empty() && self.sessions.iter().all(|s| s.phase == SessionPhase::Ready)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub(crate) fn session_mut(&mut self, channel: ChannelId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.channel == channel)
    }
}

fn require_service(request: &ReqMsg) -> Result<()> {
    if request.key.service_name.is_none() && request.key.service_id.is_none() {
        return Err(WatchlistError::invalid_usage(
            "item request must name a service or carry a service id",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
