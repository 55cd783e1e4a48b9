//! What a watchlist operation asks the caller to do
//!
//! Watchlists never perform IO or invoke callbacks. Each operation returns
//! [`Effects`]: messages to write, in order, and events to deliver, in order.
//! The caller writes the outbound messages first, then dispatches deliveries
//! without holding the watchlist lock.

use crate::error::WatchlistError;
use crate::handle::Handle;
use network::ChannelId;
use types::Msg;

/// A message to write on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub channel: ChannelId,
    pub msg: Msg,
}

/// Why a delivery is made, for callbacks that distinguish them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    /// Inbound traffic or a status generated for the stream
    Message,
    /// Provider side: a request reusing an open stream
    Reissue,
    /// Provider side: the consumer closed the stream or its channel went away
    Close,
}

/// An event for the application
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub handle: Handle,
    /// Batch parent or tunnel owning this stream
    pub parent: Option<Handle>,
    pub channel: Option<ChannelId>,
    pub kind: DeliveryKind,
    pub msg: Msg,
    /// The handle is retired after this delivery
    pub retire: bool,
}

impl Delivery {
    pub fn message(handle: Handle, parent: Option<Handle>, channel: Option<ChannelId>, msg: Msg) -> Self {
        Self {
            handle,
            parent,
            channel,
            kind: DeliveryKind::Message,
            msg,
            retire: false,
        }
    }

    pub fn retiring(mut self) -> Self {
        self.retire = true;
        self
    }

    pub fn with_kind(mut self, kind: DeliveryKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Inbound traffic that broke the stream protocol
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub handle: Handle,
    pub error: WatchlistError,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Effects {
    pub outbound: Vec<Outbound>,
    pub deliveries: Vec<Delivery>,
    pub violations: Vec<Violation>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, channel: ChannelId, msg: impl Into<Msg>) {
        self.outbound.push(Outbound {
            channel,
            msg: msg.into(),
        });
    }

    pub fn deliver(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }

    pub fn violation(&mut self, handle: Handle, error: WatchlistError) {
        self.violations.push(Violation { handle, error });
    }

    pub fn extend(&mut self, other: Effects) {
        self.outbound.extend(other.outbound);
        self.deliveries.extend(other.deliveries);
        self.violations.extend(other.violations);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.deliveries.is_empty() && self.violations.is_empty()
    }
}
