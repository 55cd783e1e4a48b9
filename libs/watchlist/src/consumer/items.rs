//! Item routing and inbound item traffic

use super::{ConsumerWatchlist, Kind, Route, SessionPhase};
use crate::effects::Effects;
use crate::error::WatchlistError;
use crate::handle::Handle;
use crate::state::{self, ItemState, Transition};
use bytes::Bytes;
use network::ChannelId;
use std::time::Instant;
use tracing::{debug, trace, warn};
use types::rdm::directory::ServiceEntry;
use types::{Msg, State, StatusCode};

impl ConsumerWatchlist {
    /// Send the request of an unrouted item to the first ready session
    /// offering its service
    pub(crate) fn try_route(&mut self, handle: Handle, now: Instant, effects: &mut Effects) -> bool {
        let Some(stream) = self.streams.get(handle) else { return false };
        if !stream.routable() || stream.route.is_some() {
            return false;
        }
        let domain = stream.request.domain;
        let wanted_name = stream.request.key.service_name.clone();
        let wanted_id = stream.request.key.service_id;

        let target = self
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.phase == SessionPhase::Ready)
            .find_map(|(index, session)| {
                let (id, service) = match &wanted_name {
                    Some(name) => session.services.by_name(name)?,
                    None => {
                        let id = wanted_id?;
                        (id, session.services.by_id(id)?)
                    }
                };
                (service.is_available() && service.supports(u16::from(domain)))
                    .then(|| (index, id, service.info.name.clone()))
            });

        let Some((index, service_id, service_name)) = target else {
            let any_ready = self.sessions.iter().any(|s| s.phase == SessionPhase::Ready);
            if let Some(stream) = self.streams.get_mut(handle) {
                if stream.state == ItemState::Unopened {
                    stream.state = ItemState::Pending;
                }
                if any_ready && !stream.notified {
                    stream.notified = true;
                    let status = stream.status(State::open_suspect(
                        StatusCode::NONE,
                        "No matching service present",
                    ));
                    effects.deliver(stream.delivery(handle, status));
                }
            }
            return false;
        };

        let session = &mut self.sessions[index];
        let stream_id = session.allocate_stream_id();
        session.streams.insert(stream_id, handle);
        let channel = session.channel;

        let Some(stream) = self.streams.get_mut(handle) else { return false };
        stream.route = Some(Route { channel, stream_id });
        stream.request.key.service_id = Some(service_id);
        stream.request.key.service_name = Some(service_name);
        stream.notified = false;
        stream.group = Bytes::new();
        if stream.state == ItemState::Unopened {
            stream.state = ItemState::Pending;
        }
        stream.awaiting_refresh = stream.request.initial_image;
        stream.sent_at = Some(now);

        let mut wire = stream.request.clone();
        wire.stream_id = stream_id;
        wire.key.service_name = None;
        debug!(handle = %handle, channel = %channel, stream_id, "Item routed");
        effects.send(channel, wire);
        true
    }

    /// Route every item still waiting for a session
    pub(crate) fn route_pending(&mut self, now: Instant, effects: &mut Effects) {
        let waiting: Vec<Handle> = self
            .streams
            .iter()
            .filter(|(_, s)| s.routable() && s.route.is_none())
            .map(|(handle, _)| handle)
            .collect();
        for handle in waiting {
            self.try_route(handle, now, effects);
        }
    }

    pub(super) fn on_item(&mut self, channel: ChannelId, mut msg: Msg, now: Instant, effects: &mut Effects) {
        let stream_id = msg.stream_id();
        let handle = self
            .sessions
            .iter()
            .find(|s| s.channel == channel)
            .and_then(|s| s.streams.get(&stream_id).copied());
        let Some(handle) = handle else {
            trace!(channel = %channel, stream_id, "Message for an unknown stream dropped");
            return;
        };
        let Some(stream) = self.streams.get(handle) else { return };

        if let (Kind::Tunnel { .. }, Msg::Generic(generic)) = (&stream.kind, &msg) {
            let generic = generic.clone();
            self.on_tunnel_generic(handle, generic, now, effects);
            return;
        }

        if let Some(key) = msg.key_mut() {
            if key.name.is_none() {
                key.name = stream.request.key.name.clone();
            }
            if key.service_name.is_none() {
                key.service_name = stream.request.key.service_name.clone();
            }
        }
        if let Msg::Ack(ack) = &msg {
            self.pending_posts.remove(&(channel, stream_id, ack.ack_id));
        }
        let group = match &msg {
            Msg::Refresh(refresh) if !refresh.group_id.is_empty() => Some(refresh.group_id.clone()),
            Msg::Status(status) => status.group_id.clone(),
            _ => None,
        };
        if let (Some(group), Some(stream)) = (group, self.streams.get_mut(handle)) {
            stream.group = group;
        }
        let Some(stream) = self.streams.get(handle) else { return };
        let Some(transition) = transition_for(stream.state, &msg, stream.request.streaming) else {
            debug!(class = ?msg.class(), "Unexpected message class on item stream");
            return;
        };
        self.apply_transition(handle, msg, transition, now, effects);
    }

    /// Apply the item group changes services announced on `channel`
    pub(super) fn on_item_groups(
        &mut self,
        channel: ChannelId,
        entries: &[ServiceEntry],
        now: Instant,
        effects: &mut Effects,
    ) {
        for entry in entries {
            for change in &entry.groups {
                let members = self.group_members(channel, entry.id, &change.group);
                if members.is_empty() {
                    continue;
                }
                if let Some(state) = &change.status {
                    debug!(channel = %channel, service_id = entry.id, items = members.len(), "Item group status");
                    for &handle in &members {
                        let Some(stream) = self.streams.get(handle) else { continue };
                        let status = Msg::from(stream.status(state.clone()).group_id(change.group.clone()));
                        let Some(transition) = transition_for(stream.state, &status, stream.request.streaming) else {
                            continue;
                        };
                        self.apply_transition(handle, status, transition, now, effects);
                    }
                }
                if let Some(merged_to) = &change.merged_to {
                    debug!(channel = %channel, service_id = entry.id, items = members.len(), "Item group merged");
                    for handle in members {
                        let Some(stream) = self.streams.get_mut(handle) else { continue };
                        if stream.group == change.group {
                            stream.group = merged_to.clone();
                        }
                    }
                }
            }
        }
    }

    fn group_members(&self, channel: ChannelId, service_id: u16, group: &Bytes) -> Vec<Handle> {
        self.streams
            .iter()
            .filter(|(_, s)| {
                s.routable()
                    && !s.group.is_empty()
                    && &s.group == group
                    && s.route.is_some_and(|r| r.channel == channel)
                    && s.request.key.service_id == Some(service_id)
            })
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Deliver `msg` to `handle` and move its stream as `transition` says
    pub(crate) fn apply_transition(
        &mut self,
        handle: Handle,
        msg: Msg,
        transition: Transition,
        now: Instant,
        effects: &mut Effects,
    ) {
        let Some(stream) = self.streams.get_mut(handle) else { return };
        let is_refresh = matches!(msg, Msg::Refresh(ref r) if r.complete);
        match transition {
            Transition::Deliver(next) => {
                if is_refresh {
                    stream.awaiting_refresh = false;
                }
                let opened = !stream.state.is_open() && next.is_open();
                stream.state = next;
                effects.deliver(stream.delivery(handle, msg));
                if opened && matches!(stream.kind, Kind::Tunnel { .. }) {
                    self.open_sub_streams(handle, effects);
                }
            }
            Transition::Close => {
                stream.state = ItemState::Closed;
                effects.deliver(stream.delivery(handle, msg).retiring());
                self.retire(handle, effects);
            }
            Transition::Recover(state) => {
                let recoverable = matches!(stream.kind, Kind::Item) && !stream.request.private_stream;
                if !recoverable {
                    stream.state = ItemState::Closed;
                    effects.deliver(stream.delivery(handle, msg).retiring());
                    self.retire(handle, effects);
                    return;
                }
                let status = stream.status(state);
                effects.deliver(stream.delivery(handle, status));
                stream.state = ItemState::Suspect;
                stream.awaiting_refresh = false;
                stream.notified = true;
                if let Some(route) = stream.route.take() {
                    if let Some(session) = self.session_mut(route.channel) {
                        session.streams.remove(&route.stream_id);
                    }
                }
                warn!(handle = %handle, "Stream closed recoverable, re-requesting");
                self.try_route(handle, now, effects);
            }
            Transition::Discard => {}
            Transition::Violation(reason) => {
                warn!(handle = %handle, reason, "Protocol violation on stream");
                effects.violation(handle, WatchlistError::invalid_usage(reason));
            }
        }
    }
}

/// How an inbound message moves a stream in `current`
pub(crate) fn transition_for(current: ItemState, msg: &Msg, streaming: bool) -> Option<Transition> {
    Some(match msg {
        Msg::Refresh(refresh) => state::on_refresh(current, &refresh.state, refresh.complete, streaming),
        Msg::Update(_) => state::on_update(current),
        Msg::Status(status) => state::on_status(current, status.state.as_ref()),
        Msg::Generic(_) | Msg::Ack(_) if current.is_closed() => Transition::Discard,
        Msg::Generic(_) | Msg::Ack(_) => Transition::Deliver(current),
        Msg::Request(_) | Msg::Post(_) | Msg::Close(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{AckMsg, RefreshMsg, UpdateMsg};

    #[test]
    fn ack_and_generic_keep_the_state() {
        let ack = Msg::from(AckMsg::new().ack_id(1));
        assert_eq!(
            transition_for(ItemState::Open, &ack, true),
            Some(Transition::Deliver(ItemState::Open))
        );
        assert_eq!(transition_for(ItemState::Closed, &ack, true), Some(Transition::Discard));
    }

    #[test]
    fn requests_are_not_inbound_item_traffic() {
        let request = Msg::from(types::ReqMsg::new());
        assert_eq!(transition_for(ItemState::Open, &request, true), None);
    }

    #[test]
    fn refresh_and_update_follow_the_state_machine() {
        let refresh = Msg::from(RefreshMsg::new().state(State::open_ok("")).complete(true));
        assert_eq!(
            transition_for(ItemState::Pending, &refresh, true),
            Some(Transition::Deliver(ItemState::Open))
        );
        let update = Msg::from(UpdateMsg::new());
        assert!(matches!(
            transition_for(ItemState::Pending, &update, true),
            Some(Transition::Violation(_))
        ));
    }
}
