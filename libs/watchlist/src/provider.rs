//! Interactive provider stream tables
//!
//! ## Purpose
//!
//! Maps every (client channel, stream id) pair a consumer opened to a
//! provider handle, answers admin-domain requests when the API owns them,
//! and turns consumer closes and lost client channels into close events.
//!
//! ## Architecture Role
//!
//! ```text
//!  client channels ──→ on_message ──→ Delivery { handle, kind: Message | Reissue | Close }
//!                                 └──→ Outbound (directory / dictionary / rejection replies)
//!  application ──→ submit(msg, handle) ──→ Outbound on the handle's stream
//! ```
//!
//! Items keep the group id of the last refresh or status submitted on them.
//! A directory Group entry the application sends merges those groups, and a
//! closing group status ends every item stream in the group.

use crate::effects::{Delivery, DeliveryKind, Effects};
use crate::error::{Result, WatchlistError};
use crate::handle::{Handle, HandleArena};
use bytes::Bytes;
use codec::{DataDictionary, DictionaryKind, Verbosity};
use network::ChannelId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use types::rdm::directory::{self, filter_mask, ServiceEntry};
use types::rdm::login::LoginRtt;
use types::{
    DomainType, GenericMsg, MapAction, Msg, RefreshMsg, ReqMsg, State, StatusCode, StatusMsg,
    StreamState, UpdateMsg,
};

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Services advertised to consumers
    pub services: Vec<ServiceEntry>,
    /// Answer directory requests from `services` instead of delivering them
    pub answer_directory: bool,
    /// Answer dictionary requests from `dictionary` instead of delivering them
    pub answer_dictionary: bool,
    pub dictionary: Option<Arc<DataDictionary>>,
    /// Deliver item requests naming a service id not in `services`
    pub accept_unknown_services: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            answer_directory: true,
            answer_dictionary: true,
            dictionary: None,
            accept_unknown_services: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Login,
    Directory,
    Dictionary,
    Item,
}

#[derive(Debug)]
struct ProviderStream {
    channel: ChannelId,
    stream_id: i32,
    kind: StreamKind,
    request: ReqMsg,
    group: Bytes,
}

pub struct ProviderWatchlist {
    settings: ProviderSettings,
    services: BTreeMap<u16, ServiceEntry>,
    streams: HandleArena<ProviderStream>,
    by_stream: HashMap<(ChannelId, i32), Handle>,
    /// Origin of RTT ticks
    epoch: Instant,
}

impl ProviderWatchlist {
    pub fn new(settings: ProviderSettings) -> Self {
        let services = settings
            .services
            .iter()
            .map(|entry| (entry.id, entry.clone()))
            .collect();
        Self {
            settings,
            services,
            streams: HandleArena::new(),
            by_stream: HashMap::new(),
            epoch: Instant::now(),
        }
    }

    /// Inbound message from a client channel
    pub fn on_message(&mut self, channel: ChannelId, msg: Msg, now: Instant) -> Effects {
        let mut effects = Effects::new();
        let key = (channel, msg.stream_id());
        let existing = self.by_stream.get(&key).copied();
        match msg {
            Msg::Request(request) => match existing {
                Some(handle) => {
                    if let Some(stream) = self.streams.get_mut(handle) {
                        stream.request = request.clone();
                    }
                    let delivery = Delivery::message(handle, None, Some(channel), Msg::Request(request))
                        .with_kind(DeliveryKind::Reissue);
                    effects.deliver(delivery);
                }
                None => self.on_new_request(channel, request, &mut effects),
            },
            Msg::Close(close) => {
                let Some(handle) = existing else {
                    trace!(channel = %channel, stream_id = close.stream_id, "Close for an unknown stream");
                    return effects;
                };
                self.remove(handle);
                debug!(channel = %channel, stream_id = close.stream_id, "Consumer closed stream");
                effects.deliver(
                    Delivery::message(handle, None, Some(channel), Msg::Close(close))
                        .with_kind(DeliveryKind::Close)
                        .retiring(),
                );
            }
            Msg::Generic(generic) => {
                let Some(handle) = existing else { return effects };
                let generic = self.with_latency(generic, now);
                effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Generic(generic)));
            }
            Msg::Post(post) => {
                let Some(handle) = existing else {
                    trace!(channel = %channel, stream_id = post.stream_id, "Post for an unknown stream");
                    return effects;
                };
                effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Post(post)));
            }
            other => {
                debug!(channel = %channel, class = ?other.class(), "Unexpected message from consumer");
            }
        }
        effects
    }

    fn on_new_request(&mut self, channel: ChannelId, request: ReqMsg, effects: &mut Effects) {
        let stream_id = request.stream_id;
        match request.domain {
            DomainType::LOGIN => {
                let handle = self.open(channel, StreamKind::Login, request.clone());
                info!(channel = %channel, user = request.key.name.as_deref().unwrap_or(""), "Login request");
                effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Request(request)));
            }
            DomainType::SOURCE => {
                let handle = self.open(channel, StreamKind::Directory, request.clone());
                if !self.settings.answer_directory {
                    effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Request(request)));
                    return;
                }
                match self.directory_refresh(&request) {
                    Ok(refresh) => effects.send(channel, refresh),
                    Err(e) => warn!(channel = %channel, error = %e, "Directory refresh encode failed"),
                }
                if !request.streaming {
                    self.remove(handle);
                }
            }
            DomainType::DICTIONARY if self.settings.answer_dictionary && self.settings.dictionary.is_some() => {
                effects.send(channel, self.dictionary_reply(&request));
            }
            DomainType::DICTIONARY => {
                let handle = self.open(channel, StreamKind::Dictionary, request.clone());
                effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Request(request)));
            }
            domain => {
                let service_id = request.key.service_id;
                let known = service_id.and_then(|id| self.services.get(&id));
                if known.is_none() && !self.settings.accept_unknown_services {
                    warn!(channel = %channel, stream_id, ?service_id, "Request for an unknown service rejected");
                    let status = StatusMsg::new()
                        .stream_id(stream_id)
                        .domain(domain)
                        .key(request.key.clone())
                        .state(State::closed(StatusCode::SOURCE_UNKNOWN, "Service not found"));
                    effects.send(channel, status);
                    return;
                }
                let mut request = request;
                if request.key.service_name.is_none() {
                    request.key.service_name = known.and_then(|e| e.info.as_ref()).map(|i| i.name.clone());
                }
                let handle = self.open(channel, StreamKind::Item, request.clone());
                effects.deliver(Delivery::message(handle, None, Some(channel), Msg::Request(request)));
            }
        }
    }

    fn open(&mut self, channel: ChannelId, kind: StreamKind, request: ReqMsg) -> Handle {
        let stream_id = request.stream_id;
        let handle = self.streams.insert(ProviderStream {
            channel,
            stream_id,
            kind,
            request,
            group: Bytes::new(),
        });
        self.by_stream.insert((channel, stream_id), handle);
        handle
    }

    fn remove(&mut self, handle: Handle) -> Option<ProviderStream> {
        let stream = self.streams.remove(handle)?;
        self.by_stream.remove(&(stream.channel, stream.stream_id));
        Some(stream)
    }

    fn directory_refresh(&self, request: &ReqMsg) -> Result<RefreshMsg> {
        let filter = request.key.filter.unwrap_or(filter_mask::INFO_STATE);
        let entries: Vec<ServiceEntry> = self
            .services
            .values()
            .filter(|entry| match (&request.key.service_name, request.key.service_id) {
                (Some(name), _) => entry.info.as_ref().is_some_and(|i| &i.name == name),
                (None, Some(id)) => entry.id == id,
                (None, None) => true,
            })
            .cloned()
            .collect();
        let mut refresh = RefreshMsg::new()
            .stream_id(request.stream_id)
            .domain(DomainType::SOURCE)
            .filter(filter)
            .state(State::open_ok(""))
            .solicited(true)
            .complete(true)
            .payload(directory::encode(&entries, filter)?);
        refresh.key.service_name = request.key.service_name.clone();
        Ok(refresh)
    }

    fn dictionary_reply(&self, request: &ReqMsg) -> Msg {
        let name = request.key.name.as_deref().unwrap_or("");
        let not_found = |text: String| -> Msg {
            StatusMsg::new()
                .stream_id(request.stream_id)
                .domain(DomainType::DICTIONARY)
                .name(name)
                .state(State::closed(StatusCode::NOT_FOUND, text))
                .into()
        };
        let (Some(dictionary), Some(kind)) = (&self.settings.dictionary, DictionaryKind::from_name(name)) else {
            return not_found(format!("Dictionary '{name}' is not provided"));
        };
        let verbosity = Verbosity::from_filter(request.key.filter.unwrap_or(Verbosity::Normal.filter()));
        let payload = match kind {
            DictionaryKind::FieldDefinitions => codec::encode_field_dictionary(dictionary, verbosity),
            DictionaryKind::EnumTables => codec::encode_enum_tables(dictionary),
        };
        match payload {
            Ok(payload) => RefreshMsg::new()
                .stream_id(request.stream_id)
                .domain(DomainType::DICTIONARY)
                .name(name)
                .filter(verbosity.filter())
                .state(State::open_ok(""))
                .solicited(true)
                .complete(true)
                .payload(payload)
                .into(),
            Err(e) => not_found(e.to_string()),
        }
    }

    /// Fill in the measured latency of an echoed RTT probe
    fn with_latency(&self, generic: GenericMsg, now: Instant) -> GenericMsg {
        let Some(rtt) = LoginRtt::from_generic(&generic) else {
            return generic;
        };
        let latency = self.ticks(now).saturating_sub(rtt.ticks);
        let measured = LoginRtt {
            latency: Some(latency),
            ..rtt
        };
        match measured.to_generic(generic.stream_id) {
            Ok(out) => out,
            Err(_) => generic,
        }
    }

    fn ticks(&self, now: Instant) -> u64 {
        now.duration_since(self.epoch).as_micros() as u64
    }

    /// Start a round-trip latency measurement on a login stream
    pub fn rtt_probe(&self, handle: Handle, now: Instant) -> Result<Effects> {
        let stream = self
            .streams
            .get(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        if stream.kind != StreamKind::Login {
            return Err(WatchlistError::invalid_usage("RTT probes travel on login streams only"));
        }
        let probe = LoginRtt {
            ticks: self.ticks(now),
            latency: None,
            tcp_retrans: None,
        }
        .to_generic(stream.stream_id)?;
        let mut effects = Effects::new();
        effects.send(stream.channel, probe);
        Ok(effects)
    }

    /// A client channel went away; every stream on it is closed
    pub fn channel_down(&mut self, channel: ChannelId) -> Effects {
        let mut effects = Effects::new();
        let gone: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| s.channel == channel)
            .map(|(handle, _)| handle)
            .collect();
        for handle in gone {
            if let Some(stream) = self.remove(handle) {
                let close = types::CloseMsg::new(stream.stream_id, stream.request.domain);
                effects.deliver(
                    Delivery::message(handle, None, Some(channel), Msg::Close(close))
                        .with_kind(DeliveryKind::Close)
                        .retiring(),
                );
            }
        }
        info!(channel = %channel, closed = effects.deliveries.len(), "Client channel down");
        effects
    }

    /// Send `msg` on the stream of `handle`
    ///
    /// A message carrying a final state retires the handle.
    pub fn submit(&mut self, handle: Handle, mut msg: Msg) -> Result<Effects> {
        msg.validate_complete()?;
        let stream = self
            .streams
            .get(handle)
            .ok_or(WatchlistError::invalid_handle(handle))?;
        msg.set_stream_id(stream.stream_id);
        if let (StreamKind::Item, Some(key)) = (stream.kind, msg.key_mut()) {
            if key.service_id.is_none() {
                key.service_id = stream.request.key.service_id;
            }
            key.service_name = None;
        }
        let channel = stream.channel;
        let kind = stream.kind;
        let final_part = is_final(&msg, stream.request.streaming);
        match kind {
            StreamKind::Directory => self.learn_directory(&msg),
            StreamKind::Item => self.learn_group(handle, &msg),
            _ => {}
        }
        let mut effects = Effects::new();
        effects.send(channel, msg);
        if final_part {
            self.remove(handle);
            debug!(handle = %handle, "Stream closed by provider");
        }
        Ok(effects)
    }

    fn learn_group(&mut self, handle: Handle, msg: &Msg) {
        let group = match msg {
            Msg::Refresh(refresh) if !refresh.group_id.is_empty() => refresh.group_id.clone(),
            Msg::Status(StatusMsg { group_id: Some(group), .. }) => group.clone(),
            _ => return,
        };
        if let Some(stream) = self.streams.get_mut(handle) {
            stream.group = group;
        }
    }

    /// Directory messages the application sends itself keep the service table current
    fn learn_directory(&mut self, msg: &Msg) {
        let payload = match msg {
            Msg::Refresh(refresh) => &refresh.payload,
            Msg::Update(update) => &update.payload,
            _ => return,
        };
        if let Ok(entries) = directory::decode(payload) {
            self.apply_groups(&entries);
            self.apply_services(entries);
        }
    }

    /// Re-tag merged groups and drop item streams a group status closed
    fn apply_groups(&mut self, entries: &[ServiceEntry]) {
        for entry in entries {
            for change in &entry.groups {
                let members: Vec<Handle> = self
                    .streams
                    .iter()
                    .filter(|(_, s)| {
                        s.kind == StreamKind::Item
                            && !s.group.is_empty()
                            && s.group == change.group
                            && s.request.key.service_id == Some(entry.id)
                    })
                    .map(|(handle, _)| handle)
                    .collect();
                let closing = change.status.as_ref().is_some_and(|s| {
                    matches!(s.stream_state, StreamState::Closed | StreamState::ClosedRecover)
                });
                if closing {
                    debug!(service_id = entry.id, items = members.len(), "Item group closed");
                    for handle in members {
                        self.remove(handle);
                    }
                    continue;
                }
                if let Some(merged_to) = &change.merged_to {
                    for handle in members {
                        if let Some(stream) = self.streams.get_mut(handle) {
                            stream.group = merged_to.clone();
                        }
                    }
                }
            }
        }
    }

    fn apply_services(&mut self, entries: Vec<ServiceEntry>) {
        for entry in entries {
            match entry.action {
                MapAction::Delete => {
                    self.services.remove(&entry.id);
                }
                MapAction::Add => {
                    self.services.insert(
                        entry.id,
                        ServiceEntry {
                            groups: Vec::new(),
                            ..entry
                        },
                    );
                }
                MapAction::Update => {
                    let current = self
                        .services
                        .entry(entry.id)
                        .or_insert_with(|| ServiceEntry::add(entry.id, Default::default(), Default::default()));
                    if let Some(info) = entry.info {
                        current.info = Some(info);
                    }
                    if let Some(state) = entry.state {
                        current.state = Some(state);
                    }
                }
            }
        }
    }

    /// Change the advertised services and push the change to every directory stream
    pub fn update_directory(&mut self, entries: Vec<ServiceEntry>) -> Result<Effects> {
        let mut effects = Effects::new();
        let payload = directory::encode(&entries, filter_mask::WATCHLIST)?;
        self.apply_groups(&entries);
        self.apply_services(entries);
        for (_, stream) in self.streams.iter().filter(|(_, s)| s.kind == StreamKind::Directory) {
            let update = UpdateMsg::new()
                .stream_id(stream.stream_id)
                .domain(DomainType::SOURCE)
                .filter(filter_mask::WATCHLIST)
                .payload(payload.clone());
            effects.send(stream.channel, update);
        }
        Ok(effects)
    }

    pub fn is_registered(&self, handle: Handle) -> bool {
        self.streams.contains(handle)
    }

    pub fn channel_of(&self, handle: Handle) -> Option<ChannelId> {
        self.streams.get(handle).map(|s| s.channel)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Item group `handle` was last tagged with
    pub fn group_of(&self, handle: Handle) -> Option<&[u8]> {
        self.streams
            .get(handle)
            .map(|s| &s.group[..])
            .filter(|group| !group.is_empty())
    }

    pub fn service_id(&self, name: &str) -> Option<u16> {
        self.services
            .values()
            .find(|e| e.info.as_ref().is_some_and(|i| i.name == name))
            .map(|e| e.id)
    }
}

fn is_final(msg: &Msg, streaming: bool) -> bool {
    match msg {
        Msg::Refresh(refresh) => {
            refresh.complete
                && (!streaming
                    || matches!(
                        refresh.state.stream_state,
                        StreamState::Closed | StreamState::ClosedRecover | StreamState::NonStreaming
                    ))
        }
        Msg::Status(status) => status.state.as_ref().is_some_and(|s| {
            matches!(s.stream_state, StreamState::Closed | StreamState::ClosedRecover)
        }),
        Msg::Close(_) => true,
        _ => false,
    }
}
