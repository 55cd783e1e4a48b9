//! Application callback traits
//!
//! Every handler has a no-op default, so an application implements only the
//! messages it cares about. `on_all` runs first for every message, followed by
//! the handler for the message's class.
//!
//! Callbacks of one consumer or provider never overlap. They may call back
//! into the instance, including `unregister` for any handle.

use crate::error::OmmError;
use crate::event::{OmmConsumerEvent, OmmProviderEvent};
use types::{AckMsg, CloseMsg, GenericMsg, Msg, PostMsg, RefreshMsg, ReqMsg, StatusMsg, UpdateMsg};
use watchlist::{DeliveryKind, Handle};

pub trait OmmConsumerClient: Send + Sync {
    fn on_refresh(&self, _refresh: &RefreshMsg, _event: &OmmConsumerEvent<'_>) {}

    fn on_update(&self, _update: &UpdateMsg, _event: &OmmConsumerEvent<'_>) {}

    fn on_status(&self, _status: &StatusMsg, _event: &OmmConsumerEvent<'_>) {}

    fn on_generic(&self, _generic: &GenericMsg, _event: &OmmConsumerEvent<'_>) {}

    fn on_ack(&self, _ack: &AckMsg, _event: &OmmConsumerEvent<'_>) {}

    fn on_all(&self, _msg: &Msg, _event: &OmmConsumerEvent<'_>) {}
}

pub trait OmmProviderClient: Send + Sync {
    /// A consumer opened a stream
    fn on_req(&self, _request: &ReqMsg, _event: &OmmProviderEvent<'_>) {}

    /// A consumer changed the request of an open stream
    fn on_reissue(&self, _request: &ReqMsg, _event: &OmmProviderEvent<'_>) {}

    /// The stream is gone, closed by the consumer or lost with its channel
    fn on_close(&self, _close: &CloseMsg, _event: &OmmProviderEvent<'_>) {}

    fn on_generic(&self, _generic: &GenericMsg, _event: &OmmProviderEvent<'_>) {}

    fn on_post(&self, _post: &PostMsg, _event: &OmmProviderEvent<'_>) {}

    /// Login stream refresh of a non-interactive provider
    fn on_refresh(&self, _refresh: &RefreshMsg, _event: &OmmProviderEvent<'_>) {}

    /// Login stream status of a non-interactive provider
    fn on_status(&self, _status: &StatusMsg, _event: &OmmProviderEvent<'_>) {}

    fn on_all(&self, _msg: &Msg, _event: &OmmProviderEvent<'_>) {}
}

/// Receives failures that have no call site to return to
pub trait OmmErrorClient: Send + Sync {
    /// Inbound traffic broke the protocol of a stream
    fn on_invalid_usage(&self, _error: &OmmError, _handle: Option<Handle>) {}

    fn on_invalid_handle(&self, _error: &OmmError, _handle: Handle) {}

    fn on_memory_exhaustion(&self, _error: &OmmError) {}

    /// Anything the other handlers do not cover
    fn on_error(&self, _error: &OmmError) {}
}

pub(crate) fn to_consumer(client: &dyn OmmConsumerClient, msg: &Msg, event: &OmmConsumerEvent<'_>) {
    client.on_all(msg, event);
    match msg {
        Msg::Refresh(refresh) => client.on_refresh(refresh, event),
        Msg::Update(update) => client.on_update(update, event),
        Msg::Status(status) => client.on_status(status, event),
        Msg::Generic(generic) => client.on_generic(generic, event),
        Msg::Ack(ack) => client.on_ack(ack, event),
        Msg::Request(_) | Msg::Post(_) | Msg::Close(_) => {}
    }
}

pub(crate) fn to_provider(
    client: &dyn OmmProviderClient,
    kind: DeliveryKind,
    msg: &Msg,
    event: &OmmProviderEvent<'_>,
) {
    client.on_all(msg, event);
    match (kind, msg) {
        (DeliveryKind::Reissue, Msg::Request(request)) => client.on_reissue(request, event),
        (_, Msg::Request(request)) => client.on_req(request, event),
        (_, Msg::Close(close)) => client.on_close(close, event),
        (_, Msg::Generic(generic)) => client.on_generic(generic, event),
        (_, Msg::Post(post)) => client.on_post(post, event),
        (_, Msg::Refresh(refresh)) => client.on_refresh(refresh, event),
        (_, Msg::Status(status)) => client.on_status(status, event),
        (_, Msg::Update(_)) | (_, Msg::Ack(_)) => {}
    }
}

pub(crate) fn report(client: Option<&dyn OmmErrorClient>, error: &OmmError, handle: Option<Handle>) {
    let Some(client) = client else {
        tracing::warn!(handle = ?handle.map(Handle::raw), %error, "Unreported stream error");
        return;
    };
    match (error.kind(), handle) {
        (crate::OmmErrorKind::InvalidUsage, handle) => client.on_invalid_usage(error, handle),
        (crate::OmmErrorKind::InvalidHandle, Some(handle)) => client.on_invalid_handle(error, handle),
        (crate::OmmErrorKind::MemoryExhaustion, _) => client.on_memory_exhaustion(error),
        _ => client.on_error(error),
    }
}
