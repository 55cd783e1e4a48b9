use super::*;
use crate::effects::Outbound;
use types::rdm::directory::{ServiceEntry, ServiceGroup, ServiceInfo, ServiceState};
use types::rdm::login::LoginRtt;
use types::{DataState, MapAction, StatusCode, StreamState, UpdateMsg};

const CH: ChannelId = ChannelId(1);

fn watchlist(settings: ConsumerSettings) -> ConsumerWatchlist {
    let mut watchlist = ConsumerWatchlist::new(settings, Arc::new(DictionaryRegistry::new())).unwrap();
    watchlist.add_session(CH, "session");
    watchlist
}

fn service(name: &str) -> ServiceInfo {
    ServiceInfo {
        name: name.into(),
        capabilities: vec![6, 7],
        ..ServiceInfo::default()
    }
}

fn login_refresh() -> Msg {
    RefreshMsg::new()
        .stream_id(LOGIN_STREAM_ID)
        .domain(DomainType::LOGIN)
        .name("user")
        .state(State::open_ok("Login accepted"))
        .solicited(true)
        .complete(true)
        .into()
}

fn directory_msg(entries: &[ServiceEntry], refresh: bool) -> Msg {
    let payload = directory::encode(entries, filter_mask::WATCHLIST).unwrap();
    if refresh {
        RefreshMsg::new()
            .stream_id(DIRECTORY_STREAM_ID)
            .domain(DomainType::SOURCE)
            .filter(filter_mask::WATCHLIST)
            .state(State::open_ok(""))
            .solicited(true)
            .complete(true)
            .payload(payload)
            .into()
    } else {
        UpdateMsg::new()
            .stream_id(DIRECTORY_STREAM_ID)
            .domain(DomainType::SOURCE)
            .payload(payload)
            .into()
    }
}

fn bring_up(watchlist: &mut ConsumerWatchlist, now: Instant) -> Effects {
    let mut effects = watchlist.channel_up(CH);
    effects.extend(watchlist.on_message(CH, login_refresh(), now));
    let entries = [ServiceEntry::add(1, service("DIRECT_FEED"), ServiceState::default())];
    effects.extend(watchlist.on_message(CH, directory_msg(&entries, true), now));
    effects
}

fn requests(effects: &Effects) -> Vec<&ReqMsg> {
    effects
        .outbound
        .iter()
        .filter_map(|Outbound { msg, .. }| match msg {
            Msg::Request(req) if req.domain == DomainType::MARKET_PRICE => Some(req),
            _ => None,
        })
        .collect()
}

fn item(name: &str) -> ReqMsg {
    ReqMsg::new().name(name).service_name("DIRECT_FEED")
}

fn item_refresh(stream_id: i32) -> Msg {
    RefreshMsg::new()
        .stream_id(stream_id)
        .state(State::open_ok("All is well"))
        .solicited(true)
        .complete(true)
        .into()
}

fn item_update(stream_id: i32) -> Msg {
    UpdateMsg::new().stream_id(stream_id).into()
}

fn grouped_refresh(stream_id: i32, group: &'static [u8]) -> Msg {
    RefreshMsg::new()
        .stream_id(stream_id)
        .state(State::open_ok("All is well"))
        .group_id(group)
        .solicited(true)
        .complete(true)
        .into()
}

/// Open each item and tag it with the group beside it
fn open_grouped(
    watchlist: &mut ConsumerWatchlist,
    items: &[(&str, &'static [u8])],
    now: Instant,
) -> Vec<Handle> {
    items
        .iter()
        .map(|&(name, group)| {
            let (handle, effects) = watchlist.register(item(name), None, now).unwrap();
            let stream_id = requests(&effects)[0].stream_id;
            watchlist.on_message(CH, grouped_refresh(stream_id, group), now);
            handle
        })
        .collect()
}

fn delivered_state(effects: &Effects, handle: Handle) -> Option<State> {
    effects
        .deliveries
        .iter()
        .rev()
        .find(|d| d.handle == handle)
        .and_then(|d| d.msg.state().cloned())
}

#[test]
fn control_plane_runs_login_then_directory() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    let effects = watchlist.channel_up(CH);
    assert!(matches!(&effects.outbound[0].msg, Msg::Request(r) if r.domain == DomainType::LOGIN));
    assert_eq!(watchlist.session_phase(CH), Some(SessionPhase::LoginPending));

    let effects = watchlist.on_message(CH, login_refresh(), now);
    assert!(matches!(
        &effects.outbound[0].msg,
        Msg::Request(r) if r.domain == DomainType::SOURCE && r.key.filter == Some(filter_mask::WATCHLIST)
    ));
    assert_eq!(watchlist.session_phase(CH), Some(SessionPhase::DirectoryPending));

    let entries = [ServiceEntry::add(1, service("DIRECT_FEED"), ServiceState::default())];
    watchlist.on_message(CH, directory_msg(&entries, true), now);
    assert!(watchlist.is_ready());
}

#[test]
fn items_wait_for_a_ready_session() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    assert!(effects.outbound.is_empty());
    assert_eq!(watchlist.state(handle), Some(ItemState::Pending));

    let effects = bring_up(&mut watchlist, now);
    let sent = requests(&effects);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].stream_id, FIRST_ITEM_STREAM_ID);
    assert_eq!(sent[0].key.service_id, Some(1));
    assert_eq!(sent[0].key.name.as_deref(), Some("IBM.N"));
    assert_eq!(watchlist.channel_of(handle), Some(CH));
}

#[test]
fn refresh_opens_and_updates_flow() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    let stream_id = requests(&effects)[0].stream_id;

    let effects = watchlist.on_message(CH, item_refresh(stream_id), now);
    assert_eq!(effects.deliveries.len(), 1);
    assert_eq!(effects.deliveries[0].handle, handle);
    assert_eq!(effects.deliveries[0].msg.name(), Some("IBM.N"));
    assert_eq!(watchlist.state(handle), Some(ItemState::Open));

    for _ in 0..3 {
        let effects = watchlist.on_message(CH, item_update(stream_id), now);
        assert_eq!(effects.deliveries.len(), 1);
    }
}

#[test]
fn update_before_refresh_is_reported_not_delivered() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    let stream_id = requests(&effects)[0].stream_id;

    let effects = watchlist.on_message(CH, item_update(stream_id), now);
    assert!(effects.deliveries.is_empty());
    assert_eq!(effects.violations.len(), 1);
    assert_eq!(effects.violations[0].handle, handle);
}

#[test]
fn channel_loss_suspends_and_reconnect_recovers() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    let stream_id = requests(&effects)[0].stream_id;
    watchlist.on_message(CH, item_refresh(stream_id), now);

    let effects = watchlist.channel_down(CH, true, "connection reset");
    let state = delivered_state(&effects, handle).unwrap();
    assert_eq!(state.stream_state, StreamState::Open);
    assert_eq!(state.data_state, DataState::Suspect);
    assert_eq!(watchlist.state(handle), Some(ItemState::Suspect));
    assert_eq!(watchlist.channel_of(handle), None);

    let effects = bring_up(&mut watchlist, now);
    let sent = requests(&effects);
    assert_eq!(sent.len(), 1);
    let effects = watchlist.on_message(CH, item_refresh(sent[0].stream_id), now);
    assert_eq!(delivered_state(&effects, handle), Some(State::open_ok("All is well")));
    assert_eq!(watchlist.state(handle), Some(ItemState::Open));
}

#[test]
fn final_channel_loss_closes_items() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, _) = watchlist.register(item("IBM.N"), None, now).unwrap();

    let effects = watchlist.channel_down(CH, false, "closed");
    let closing = effects.deliveries.iter().find(|d| d.handle == handle).unwrap();
    assert!(closing.retire);
    assert!(!watchlist.is_registered(handle));
}

#[test]
fn batch_request_fans_out_to_members() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let request = ReqMsg::new()
        .service_name("DIRECT_FEED")
        .batch_names(["IBM.N", "MSFT.O", "TRI.N"])
        .unwrap();
    let (parent, effects) = watchlist.register(request, None, now).unwrap();
    let sent = requests(&effects);
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|r| !r.has_batch && r.key.name.is_some()));
    let members = watchlist.batch_members(parent).unwrap().to_vec();
    assert_eq!(members.len(), 3);
    assert_eq!(watchlist.state(parent), Some(ItemState::Pending));

    let ids: Vec<i32> = sent.iter().map(|r| r.stream_id).collect();
    for id in ids {
        let effects = watchlist.on_message(CH, item_refresh(id), now);
        assert_eq!(effects.deliveries[0].parent, Some(parent));
    }
    assert_eq!(watchlist.state(parent), Some(ItemState::Open));
}

#[test]
fn unregister_closes_stream_and_invalidates_handle() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    let stream_id = requests(&effects)[0].stream_id;
    watchlist.on_message(CH, item_refresh(stream_id), now);

    let effects = watchlist.unregister(handle).unwrap();
    assert!(matches!(&effects.outbound[0].msg, Msg::Close(c) if c.stream_id == stream_id));
    assert!(watchlist.on_message(CH, item_update(stream_id), now).deliveries.is_empty());
    assert_eq!(
        watchlist.unregister(handle).unwrap_err(),
        WatchlistError::invalid_handle(handle)
    );
    assert!(watchlist.reissue(handle, item("IBM.N"), now).is_err());
}

#[test]
fn unknown_service_is_reported_once() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let request = ReqMsg::new().name("IBM.N").service_name("NOWHERE");
    let (handle, effects) = watchlist.register(request, None, now).unwrap();
    assert!(effects.outbound.is_empty());
    let state = delivered_state(&effects, handle).unwrap();
    assert_eq!(state.data_state, DataState::Suspect);
    assert_eq!(state.text, "No matching service present");

    let entries = [ServiceEntry::add(2, service("OTHER"), ServiceState::default())];
    let effects = watchlist.on_message(CH, directory_msg(&entries, false), now);
    assert!(effects.deliveries.iter().all(|d| d.handle != handle));
}

#[test]
fn request_timeout_re_requests_on_a_new_stream() {
    let start = Instant::now();
    let mut settings = ConsumerSettings::new(LoginRequest::new("user"));
    settings.request_timeout = Duration::from_secs(5);
    let mut watchlist = watchlist(settings);
    bring_up(&mut watchlist, start);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, start).unwrap();
    let first = requests(&effects)[0].stream_id;

    assert!(watchlist.tick(start + Duration::from_secs(1)).is_empty());
    let effects = watchlist.tick(start + Duration::from_secs(6));
    assert_eq!(delivered_state(&effects, handle).unwrap().code, StatusCode::TIMEOUT);
    assert!(effects
        .outbound
        .iter()
        .any(|o| matches!(&o.msg, Msg::Close(c) if c.stream_id == first)));
    let retried = requests(&effects);
    assert_eq!(retried.len(), 1);
    assert_ne!(retried[0].stream_id, first);
}

#[test]
fn service_down_suspends_its_items() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let (handle, effects) = watchlist.register(item("IBM.N"), None, now).unwrap();
    let stream_id = requests(&effects)[0].stream_id;
    watchlist.on_message(CH, item_refresh(stream_id), now);

    let down = ServiceEntry {
        action: MapAction::Update,
        id: 1,
        info: None,
        state: Some(ServiceState {
            service_up: false,
            ..ServiceState::default()
        }),
        groups: Vec::new(),
    };
    let effects = watchlist.on_message(CH, directory_msg(&[down], false), now);
    assert_eq!(delivered_state(&effects, handle).unwrap().data_state, DataState::Suspect);
    assert_eq!(watchlist.state(handle), Some(ItemState::Suspect));
    assert!(requests(&effects).is_empty());
}

#[test]
fn login_client_receives_cached_refresh() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let login = ReqMsg::new().domain(DomainType::LOGIN).name("user");
    let (handle, effects) = watchlist.register(login, None, now).unwrap();
    assert_eq!(effects.deliveries.len(), 1);
    assert!(matches!(&effects.deliveries[0].msg, Msg::Refresh(r) if r.solicited));
    assert_eq!(watchlist.state(handle), Some(ItemState::Open));
}

#[test]
fn directory_client_receives_synthesised_refresh() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let request = ReqMsg::new().domain(DomainType::SOURCE).filter(filter_mask::INFO_STATE);
    let (_, effects) = watchlist.register(request, None, now).unwrap();
    let Msg::Refresh(refresh) = &effects.deliveries[0].msg else {
        panic!("expected a refresh");
    };
    let services = directory::decode(&refresh.payload).unwrap();
    assert_eq!(services[0].info.as_ref().unwrap().name, "DIRECT_FEED");
}

#[test]
fn rtt_probe_is_echoed_when_supported() {
    let now = Instant::now();
    let mut login = LoginRequest::new("user");
    login.support_rtt = true;
    let mut watchlist = watchlist(ConsumerSettings::new(login));
    bring_up(&mut watchlist, now);
    let probe = LoginRtt {
        ticks: 42,
        latency: None,
        tcp_retrans: None,
    }
    .to_generic(LOGIN_STREAM_ID)
    .unwrap();
    let effects = watchlist.on_message(CH, probe.clone().into(), now);
    assert_eq!(effects.outbound.len(), 1);
    assert_eq!(effects.outbound[0].msg, Msg::Generic(probe));
}

#[test]
fn tunnel_sequence_gap_closes_tunnel_and_sub_streams() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    let custom = DomainType::new(200).unwrap();
    let entries = [ServiceEntry::add(
        1,
        ServiceInfo {
            name: "DIRECT_FEED".into(),
            ..ServiceInfo::default()
        },
        ServiceState::default(),
    )];
    watchlist.channel_up(CH);
    watchlist.on_message(CH, login_refresh(), now);
    watchlist.on_message(CH, directory_msg(&entries, true), now);

    let tunnel_request = ReqMsg::new()
        .domain(custom)
        .name("TUNNEL")
        .service_name("DIRECT_FEED")
        .private_stream(true);
    let (tunnel, effects) = watchlist.register(tunnel_request, None, now).unwrap();
    let Msg::Request(wire) = &effects.outbound[0].msg else {
        panic!("expected a tunnel request");
    };
    let tunnel_stream = wire.stream_id;
    let (sub, effects) = watchlist.register(item("INNER"), Some(tunnel), now).unwrap();
    assert!(effects.outbound.is_empty());
    assert_eq!(watchlist.parent(sub), Some(tunnel));

    let refresh = RefreshMsg::new()
        .stream_id(tunnel_stream)
        .domain(custom)
        .private_stream(true)
        .state(State::open_ok(""))
        .complete(true);
    let effects = watchlist.on_message(CH, refresh.into(), now);
    let Msg::Generic(generic) = &effects.outbound[0].msg else {
        panic!("expected the sub-stream request inside a generic");
    };
    assert_eq!(generic.seq_num, Some(1));

    let inner = Msg::from(RefreshMsg::new().stream_id(1).state(State::open_ok("")).complete(true));
    let effects = watchlist.on_message(CH, crate::tunnel::wrap(tunnel_stream, custom, 1, inner).into(), now);
    assert_eq!(effects.deliveries[0].handle, sub);
    assert_eq!(watchlist.state(sub), Some(ItemState::Open));

    let late = Msg::from(UpdateMsg::new().stream_id(1));
    let effects = watchlist.on_message(CH, crate::tunnel::wrap(tunnel_stream, custom, 3, late).into(), now);
    assert!(effects.deliveries.iter().any(|d| d.handle == tunnel && d.retire));
    assert!(effects.deliveries.iter().any(|d| d.handle == sub && d.retire));
    assert!(!watchlist.is_registered(tunnel));
    assert!(!watchlist.is_registered(sub));
}

#[test]
fn registration_after_close_all_is_refused() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    watchlist.register(item("IBM.N"), None, now).unwrap();
    let effects = watchlist.close_all();
    assert!(effects
        .outbound
        .iter()
        .any(|o| matches!(&o.msg, Msg::Close(c) if c.domain == DomainType::LOGIN)));
    assert_eq!(
        watchlist.register(item("IBM.N"), None, now).unwrap_err(),
        WatchlistError::Shutdown
    );
}

#[test]
fn item_without_service_is_invalid_usage() {
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    let err = watchlist
        .register(ReqMsg::new().name("IBM.N"), None, Instant::now())
        .unwrap_err();
    assert!(matches!(err, WatchlistError::InvalidUsage { .. }));
}

#[test]
fn group_status_reaches_every_item_in_the_group() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let handles = open_grouped(
        &mut watchlist,
        &[("IBM.N", &b"\x00\x01"[..]), ("MSFT.O", &b"\x00\x01"[..]), ("TRI.N", &b"\x00\x02"[..])],
        now,
    );
    assert_eq!(watchlist.group_of(handles[0]), Some(&b"\x00\x01"[..]));

    let stale = State::open_suspect(StatusCode::NONE, "Group stale");
    let change = ServiceEntry::groups(1, vec![ServiceGroup::status(&b"\x00\x01"[..], stale)]);
    let effects = watchlist.on_message(CH, directory_msg(&[change], false), now);

    for &handle in &handles[..2] {
        assert_eq!(delivered_state(&effects, handle).unwrap().text, "Group stale");
        assert_eq!(watchlist.state(handle), Some(ItemState::Suspect));
    }
    assert!(delivered_state(&effects, handles[2]).is_none());
    assert_eq!(watchlist.state(handles[2]), Some(ItemState::Open));
}

#[test]
fn merged_groups_share_later_status() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let handles = open_grouped(&mut watchlist, &[("IBM.N", &b"\x00\x01"[..]), ("TRI.N", &b"\x00\x02"[..])], now);

    let merge = ServiceEntry::groups(1, vec![ServiceGroup::merge(&b"\x00\x02"[..], &b"\x00\x01"[..])]);
    let effects = watchlist.on_message(CH, directory_msg(&[merge], false), now);
    assert!(effects.deliveries.iter().all(|d| !handles.contains(&d.handle)));
    assert_eq!(watchlist.group_of(handles[1]), Some(&b"\x00\x01"[..]));

    let restart = State::closed_recover(StatusCode::NONE, "Feed restarting");
    let change = ServiceEntry::groups(1, vec![ServiceGroup::status(&b"\x00\x01"[..], restart)]);
    let effects = watchlist.on_message(CH, directory_msg(&[change], false), now);
    for &handle in &handles {
        let state = delivered_state(&effects, handle).unwrap();
        assert_eq!(state.stream_state, StreamState::Open);
        assert_eq!(state.data_state, DataState::Suspect);
        assert_eq!(watchlist.group_of(handle), None);
    }
    assert_eq!(requests(&effects).len(), 2);
}

#[test]
fn group_only_updates_skip_info_state_directory_clients() {
    let now = Instant::now();
    let mut watchlist = watchlist(ConsumerSettings::new(LoginRequest::new("user")));
    bring_up(&mut watchlist, now);
    let request = ReqMsg::new().domain(DomainType::SOURCE).filter(filter_mask::INFO_STATE);
    let (directory_client, _) = watchlist.register(request, None, now).unwrap();

    let stale = State::open_suspect(StatusCode::NONE, "Group stale");
    let change = ServiceEntry::groups(1, vec![ServiceGroup::status(&b"\x00\x09"[..], stale)]);
    let effects = watchlist.on_message(CH, directory_msg(&[change], false), now);
    assert!(effects.deliveries.iter().all(|d| d.handle != directory_client));
}
