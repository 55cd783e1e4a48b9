//! Tunnel streams and their sub-streams

use super::items::transition_for;
use super::{ConsumerWatchlist, Kind, Stream};
use crate::effects::Effects;
use crate::error::{Result, WatchlistError};
use crate::handle::Handle;
use crate::state::ItemState;
use crate::tunnel::{self, TunnelSequence};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};
use types::{CloseMsg, GenericMsg, Msg, ReqMsg, State, StatusCode};

/// Sub-stream ids inside a tunnel start here
const FIRST_SUB_STREAM_ID: i32 = 1;

impl ConsumerWatchlist {
    /// A private stream on a custom domain carrying sub-streams
    pub(super) fn register_tunnel(&mut self, request: ReqMsg, now: Instant, effects: &mut Effects) -> Result<Handle> {
        super::require_service(&request)?;
        let kind = Kind::Tunnel {
            sequence: TunnelSequence::default(),
            subs: HashMap::new(),
            next_sub: FIRST_SUB_STREAM_ID,
        };
        let handle = self.streams.insert(Stream::new(kind, request, None));
        debug!(handle = %handle, "Tunnel stream registered");
        self.try_route(handle, now, effects);
        Ok(handle)
    }

    pub(super) fn register_sub_stream(&mut self, tunnel: Handle, mut request: ReqMsg, effects: &mut Effects) -> Result<Handle> {
        let Some(owner) = self.streams.get_mut(tunnel) else {
            return Err(WatchlistError::invalid_handle(tunnel));
        };
        let tunnel_open = owner.state.is_open();
        let Kind::Tunnel { next_sub, .. } = &mut owner.kind else {
            return Err(WatchlistError::invalid_usage(format!(
                "handle {tunnel} is not a tunnel stream and cannot own sub-streams"
            )));
        };
        let inner = *next_sub;
        *next_sub += 1;
        request.stream_id = inner;

        let kind = Kind::Sub {
            tunnel,
            inner,
            sent: false,
        };
        let handle = self.streams.insert(Stream::new(kind, request, Some(tunnel)));
        if let Some(Stream {
            kind: Kind::Tunnel { subs, .. },
            ..
        }) = self.streams.get_mut(tunnel)
        {
            subs.insert(inner, handle);
        }
        if tunnel_open {
            self.send_sub_request(handle, effects);
        }
        Ok(handle)
    }

    /// Send the requests of sub-streams registered before the tunnel opened
    pub(super) fn open_sub_streams(&mut self, tunnel: Handle, effects: &mut Effects) {
        let waiting: Vec<Handle> = match self.streams.get(tunnel) {
            Some(Stream {
                kind: Kind::Tunnel { subs, .. },
                ..
            }) => subs.values().copied().collect(),
            _ => return,
        };
        for handle in waiting {
            let unsent = matches!(
                self.streams.get(handle),
                Some(Stream {
                    kind: Kind::Sub { sent: false, .. },
                    ..
                })
            );
            if unsent {
                self.send_sub_request(handle, effects);
            }
        }
    }

    fn send_sub_request(&mut self, handle: Handle, effects: &mut Effects) {
        let Some(stream) = self.streams.get_mut(handle) else { return };
        let Kind::Sub { tunnel, sent, .. } = &mut stream.kind else { return };
        *sent = true;
        let tunnel = *tunnel;
        stream.state = ItemState::Pending;
        let request = stream.request.clone();
        self.send_in_tunnel(tunnel, Msg::Request(request), effects);
    }

    /// Wrap `inner` in the next generic of the tunnel stream
    pub(super) fn send_in_tunnel(&mut self, tunnel: Handle, inner: Msg, effects: &mut Effects) {
        let Some(stream) = self.streams.get_mut(tunnel) else { return };
        let (Some(route), Kind::Tunnel { sequence, .. }) = (stream.route, &mut stream.kind) else {
            debug!(tunnel = %tunnel, "Tunnel not routed, sub-stream message dropped");
            return;
        };
        let seq = sequence.next_out();
        effects.send(
            route.channel,
            tunnel::wrap(route.stream_id, stream.request.domain, seq, inner),
        );
    }

    pub(super) fn on_tunnel_generic(&mut self, tunnel: Handle, generic: GenericMsg, now: Instant, effects: &mut Effects) {
        let Some(stream) = self.streams.get_mut(tunnel) else { return };
        let unwrapped = tunnel::unwrap(&generic).map(|(seq, inner)| (seq, inner.clone()));
        let Some((seq, inner)) = unwrapped else {
            effects.deliver(stream.delivery(tunnel, generic));
            return;
        };
        let Kind::Tunnel { sequence, subs, .. } = &mut stream.kind else { return };
        if !sequence.accept(seq) {
            let expected = sequence.expected_in();
            warn!(tunnel = %tunnel, seq, expected, "Tunnel sequence gap, closing tunnel");
            let domain = stream.request.domain;
            let route = stream.route;
            let text = format!("Tunnel sequence {seq} received, expected {expected}");
            let status = stream.status(State::closed(StatusCode::GAP_DETECTED, text));
            effects.deliver(stream.delivery(tunnel, status).retiring());
            self.retire(tunnel, effects);
            if let Some(route) = route {
                effects.send(route.channel, CloseMsg::new(route.stream_id, domain));
            }
            return;
        }
        let Some(sub) = subs.get(&inner.stream_id()).copied() else {
            debug!(tunnel = %tunnel, inner = inner.stream_id(), "Message for an unknown sub-stream");
            return;
        };
        let Some(sub_stream) = self.streams.get(sub) else { return };
        let Some(transition) = transition_for(sub_stream.state, &inner, sub_stream.request.streaming) else {
            return;
        };
        self.apply_transition(sub, inner, transition, now, effects);
    }
}
