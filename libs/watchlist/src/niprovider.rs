//! Non-interactive provider streams
//!
//! A non-interactive provider publishes without being asked. It logs in,
//! pushes its source directory on a provider-driven stream and then opens
//! item streams by submitting their first refresh. Provider-driven streams
//! use negative stream ids; the directory owns -1 and items count down
//! from -2.

use crate::effects::{Delivery, Effects};
use crate::error::{Result, WatchlistError};
use crate::handle::{Handle, HandleArena};
use network::ChannelId;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use types::rdm::directory::{self, filter_mask, ServiceEntry};
use types::rdm::login::LoginRequest;
use types::{DomainType, MapAction, Msg, RefreshMsg, ReqMsg, State, StatusCode, StatusMsg, StreamState};

pub const LOGIN_STREAM_ID: i32 = 1;
pub const DIRECTORY_STREAM_ID: i32 = -1;
const FIRST_ITEM_STREAM_ID: i32 = -2;

#[derive(Debug, Clone)]
pub struct NiProviderSettings {
    pub login: LoginRequest,
    pub services: Vec<ServiceEntry>,
    /// Publish `services` on login instead of leaving the directory to the application
    pub publish_directory: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NiPhase {
    Down,
    LoginPending,
    Ready,
    LoginDenied,
}

#[derive(Debug, Clone, Copy)]
struct Published {
    stream_id: i32,
    domain: DomainType,
    service_id: Option<u16>,
}

pub struct NiProviderWatchlist {
    settings: NiProviderSettings,
    login_request: ReqMsg,
    services: BTreeMap<u16, ServiceEntry>,
    channel: Option<ChannelId>,
    phase: NiPhase,
    login_refresh: Option<RefreshMsg>,
    /// Application login registrations
    login_clients: HandleArena<()>,
    items: HashMap<u64, Published>,
    next_stream_id: i32,
}

impl NiProviderWatchlist {
    pub fn new(settings: NiProviderSettings) -> Result<Self> {
        let login_request = settings.login.to_req_msg(LOGIN_STREAM_ID)?;
        let services = settings
            .services
            .iter()
            .map(|entry| (entry.id, entry.clone()))
            .collect();
        Ok(Self {
            settings,
            login_request,
            services,
            channel: None,
            phase: NiPhase::Down,
            login_refresh: None,
            login_clients: HandleArena::new(),
            items: HashMap::new(),
            next_stream_id: FIRST_ITEM_STREAM_ID,
        })
    }

    pub fn phase(&self) -> NiPhase {
        self.phase
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn channel_up(&mut self, channel: ChannelId) -> Effects {
        self.channel = Some(channel);
        self.phase = NiPhase::LoginPending;
        info!(channel = %channel, "Channel up, logging in");
        let mut effects = Effects::new();
        effects.send(channel, self.login_request.clone());
        effects
    }

    /// Published items keep their stream ids and are refreshed again by the application
    pub fn channel_down(&mut self, channel: ChannelId, reason: &str) -> Effects {
        let mut effects = Effects::new();
        if self.channel != Some(channel) {
            return effects;
        }
        self.channel = None;
        self.phase = NiPhase::Down;
        self.login_refresh = None;
        warn!(channel = %channel, reason, "Channel down");
        let status: Msg = StatusMsg::new()
            .stream_id(LOGIN_STREAM_ID)
            .domain(DomainType::LOGIN)
            .state(State::open_suspect(StatusCode::NONE, reason))
            .into();
        for handle in self.login_clients.handles() {
            effects.deliver(Delivery::message(handle, None, Some(channel), status.clone()));
        }
        effects
    }

    pub fn on_message(&mut self, channel: ChannelId, msg: Msg) -> Effects {
        let mut effects = Effects::new();
        if msg.stream_id() != LOGIN_STREAM_ID {
            debug!(channel = %channel, stream_id = msg.stream_id(), "Ignoring non-login message");
            return effects;
        }
        match &msg {
            Msg::Refresh(refresh) if refresh.state.stream_state == StreamState::Open => {
                let first = self.phase == NiPhase::LoginPending;
                self.phase = NiPhase::Ready;
                self.login_refresh = Some(refresh.clone());
                if first && self.settings.publish_directory {
                    match self.directory_refresh() {
                        Ok(refresh) => effects.send(channel, refresh),
                        Err(e) => warn!(error = %e, "Directory encode failed"),
                    }
                }
                info!(channel = %channel, "Login accepted");
            }
            Msg::Refresh(_) | Msg::Close(_) => self.phase = NiPhase::LoginDenied,
            Msg::Status(status) => {
                let closed = status
                    .state
                    .as_ref()
                    .is_some_and(|s| matches!(s.stream_state, StreamState::Closed | StreamState::ClosedRecover));
                if closed {
                    warn!(channel = %channel, "Login closed by the provider host");
                    self.phase = NiPhase::LoginDenied;
                }
            }
            _ => {}
        }
        for handle in self.login_clients.handles() {
            effects.deliver(Delivery::message(handle, None, Some(channel), msg.clone()));
        }
        effects
    }

    fn directory_refresh(&self) -> Result<RefreshMsg> {
        let entries: Vec<ServiceEntry> = self.services.values().cloned().collect();
        Ok(RefreshMsg::new()
            .stream_id(DIRECTORY_STREAM_ID)
            .domain(DomainType::SOURCE)
            .filter(filter_mask::INFO_STATE)
            .state(State::open_ok(""))
            .complete(true)
            .payload(directory::encode(&entries, filter_mask::INFO_STATE)?))
    }

    /// Register for login stream events; the cached login refresh is delivered at once
    pub fn register_login(&mut self) -> (Handle, Effects) {
        let handle = self.login_clients.insert(());
        let mut effects = Effects::new();
        if let Some(refresh) = &self.login_refresh {
            effects.deliver(Delivery::message(handle, None, self.channel, refresh.clone().into()));
        }
        (handle, effects)
    }

    pub fn unregister_login(&mut self, handle: Handle) -> Result<()> {
        self.login_clients
            .remove(handle)
            .map(|_| ())
            .ok_or(WatchlistError::invalid_handle(handle))
    }

    /// Publish `msg` for the application item `id`
    ///
    /// The first refresh for an id opens its stream. Directory domain
    /// messages travel on the directory stream.
    pub fn submit(&mut self, id: u64, mut msg: Msg) -> Result<Effects> {
        msg.validate_complete()?;
        let Some(channel) = self.channel.filter(|_| self.phase == NiPhase::Ready) else {
            return Err(WatchlistError::invalid_usage("no logged in channel to publish on"));
        };
        if msg.domain() == DomainType::LOGIN {
            return Err(WatchlistError::unsupported_domain(DomainType::LOGIN, "submit"));
        }
        if msg.domain() == DomainType::SOURCE {
            msg.set_stream_id(DIRECTORY_STREAM_ID);
            self.learn_directory(&msg);
            let mut effects = Effects::new();
            effects.send(channel, msg);
            return Ok(effects);
        }

        let published = match (self.items.get(&id).copied(), &msg) {
            (Some(published), _) => published,
            (None, Msg::Refresh(_)) => self.open_item(id, &msg)?,
            (None, _) => {
                return Err(WatchlistError::invalid_usage(format!(
                    "item {id} must be opened with a refresh before {:?} messages",
                    msg.class()
                )))
            }
        };
        msg.set_stream_id(published.stream_id);
        if let Some(key) = msg.key_mut() {
            key.service_id = key.service_id.or(published.service_id);
            key.service_name = None;
        }
        if closes(&msg) {
            self.items.remove(&id);
            debug!(id, stream_id = published.stream_id, "Published stream closed");
        }
        let mut effects = Effects::new();
        effects.send(channel, msg);
        Ok(effects)
    }

    fn open_item(&mut self, id: u64, msg: &Msg) -> Result<Published> {
        let key = msg.key();
        let service_id = match key.and_then(|k| k.service_name.as_deref()) {
            Some(name) => Some(self.service_id(name).ok_or_else(|| {
                WatchlistError::invalid_usage(format!("service '{name}' is not in the published directory"))
            })?),
            None => key.and_then(|k| k.service_id),
        };
        let published = Published {
            stream_id: self.next_stream_id,
            domain: msg.domain(),
            service_id,
        };
        self.next_stream_id = if self.next_stream_id == i32::MIN {
            FIRST_ITEM_STREAM_ID
        } else {
            self.next_stream_id - 1
        };
        self.items.insert(id, published);
        debug!(id, stream_id = published.stream_id, domain = %published.domain, "Published stream opened");
        Ok(published)
    }

    fn learn_directory(&mut self, msg: &Msg) {
        let payload = match msg {
            Msg::Refresh(refresh) => &refresh.payload,
            Msg::Update(update) => &update.payload,
            _ => return,
        };
        let Ok(entries) = directory::decode(payload) else { return };
        for entry in entries {
            match entry.action {
                MapAction::Delete => {
                    self.services.remove(&entry.id);
                }
                _ => {
                    let current = self.services.entry(entry.id).or_insert_with(|| entry.clone());
                    current.groups.clear();
                    if entry.info.is_some() {
                        current.info = entry.info;
                    }
                    if entry.state.is_some() {
                        current.state = entry.state;
                    }
                }
            }
        }
    }

    pub fn service_id(&self, name: &str) -> Option<u16> {
        self.services
            .values()
            .find(|e| e.info.as_ref().is_some_and(|i| i.name == name))
            .map(|e| e.id)
    }

    pub fn is_published(&self, id: u64) -> bool {
        self.items.contains_key(&id)
    }

    /// Log out; published streams are forgotten
    pub fn close_all(&mut self) -> Effects {
        let mut effects = Effects::new();
        if let Some(channel) = self.channel {
            effects.send(channel, types::CloseMsg::new(LOGIN_STREAM_ID, DomainType::LOGIN));
        }
        self.items.clear();
        self.phase = NiPhase::Down;
        effects
    }
}

fn closes(msg: &Msg) -> bool {
    match msg {
        Msg::Refresh(refresh) => {
            refresh.complete
                && matches!(
                    refresh.state.stream_state,
                    StreamState::Closed | StreamState::ClosedRecover | StreamState::NonStreaming
                )
        }
        Msg::Status(status) => status.state.as_ref().is_some_and(|s| {
            matches!(s.stream_state, StreamState::Closed | StreamState::ClosedRecover)
        }),
        Msg::Close(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::rdm::directory::{ServiceInfo, ServiceState};
    use types::UpdateMsg;

    const CH: ChannelId = ChannelId(3);

    fn niprovider() -> NiProviderWatchlist {
        NiProviderWatchlist::new(NiProviderSettings {
            login: LoginRequest::new("publisher"),
            services: vec![ServiceEntry::add(
                2,
                ServiceInfo {
                    name: "NI_PUB".into(),
                    capabilities: vec![6],
                    ..ServiceInfo::default()
                },
                ServiceState::default(),
            )],
            publish_directory: true,
        })
        .unwrap()
    }

    fn logged_in() -> (NiProviderWatchlist, Effects) {
        let mut ni = niprovider();
        ni.channel_up(CH);
        let refresh = RefreshMsg::new()
            .stream_id(LOGIN_STREAM_ID)
            .domain(DomainType::LOGIN)
            .state(State::open_ok(""))
            .complete(true);
        let effects = ni.on_message(CH, refresh.into());
        (ni, effects)
    }

    #[test]
    fn login_publishes_the_directory() {
        let (ni, effects) = logged_in();
        assert_eq!(ni.phase(), NiPhase::Ready);
        let Msg::Refresh(directory) = &effects.outbound[0].msg else {
            panic!("expected the directory refresh");
        };
        assert_eq!(directory.stream_id, DIRECTORY_STREAM_ID);
        assert_eq!(directory::decode(&directory.payload).unwrap()[0].id, 2);
    }

    #[test]
    fn first_refresh_allocates_negative_stream_ids() {
        let (mut ni, _) = logged_in();
        let refresh = RefreshMsg::new().name("IBM.N").service_name("NI_PUB").state(State::open_ok("")).complete(true);
        let effects = ni.submit(10, refresh.clone().into()).unwrap();
        let sent = &effects.outbound[0].msg;
        assert_eq!(sent.stream_id(), -2);
        assert_eq!(sent.key().unwrap().service_id, Some(2));

        let effects = ni.submit(11, refresh.into()).unwrap();
        assert_eq!(effects.outbound[0].msg.stream_id(), -3);

        let effects = ni.submit(10, UpdateMsg::new().into()).unwrap();
        assert_eq!(effects.outbound[0].msg.stream_id(), -2);
    }

    #[test]
    fn update_for_unopened_item_is_invalid_usage() {
        let (mut ni, _) = logged_in();
        let err = ni.submit(99, UpdateMsg::new().into()).unwrap_err();
        assert!(matches!(err, WatchlistError::InvalidUsage { .. }));
    }

    #[test]
    fn unknown_service_name_is_invalid_usage() {
        let (mut ni, _) = logged_in();
        let refresh = RefreshMsg::new().name("IBM.N").service_name("ELSEWHERE").complete(true);
        assert!(ni.submit(1, refresh.into()).is_err());
        assert!(!ni.is_published(1));
    }

    #[test]
    fn closed_status_forgets_the_item() {
        let (mut ni, _) = logged_in();
        let refresh = RefreshMsg::new().name("IBM.N").service_id(2).state(State::open_ok("")).complete(true);
        ni.submit(5, refresh.into()).unwrap();
        let closed = StatusMsg::new().state(State::closed(StatusCode::NONE, "done"));
        ni.submit(5, closed.into()).unwrap();
        assert!(!ni.is_published(5));
    }

    #[test]
    fn publishing_requires_a_logged_in_channel() {
        let mut ni = niprovider();
        let refresh = RefreshMsg::new().name("IBM.N").service_id(2).complete(true);
        assert!(ni.submit(1, refresh.into()).is_err());
    }

    #[test]
    fn login_client_sees_channel_loss() {
        let (mut ni, _) = logged_in();
        let (handle, effects) = ni.register_login();
        assert_eq!(effects.deliveries.len(), 1);
        let effects = ni.channel_down(CH, "reset");
        assert_eq!(effects.deliveries[0].handle, handle);
        assert_eq!(ni.phase(), NiPhase::Down);
    }
}
