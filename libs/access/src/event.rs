//! Context handed to every callback

use crate::closure::Closure;
use crate::consumer::ConsumerCore;
use crate::error::Result;
use crate::provider::ProviderCore;
use network::ChannelId;
use reactor::ChannelInfo;
use types::{GenericMsg, Msg, PostMsg, ReqMsg};
use watchlist::Handle;

/// Where a consumer callback came from
pub struct OmmConsumerEvent<'a> {
    pub(crate) handle: Handle,
    pub(crate) parent: Option<Handle>,
    pub(crate) closure: &'a Closure,
    pub(crate) channel: Option<ChannelId>,
    pub(crate) consumer: &'a ConsumerCore,
}

impl OmmConsumerEvent<'_> {
    /// Handle the message arrived on
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Batch registration or tunnel owning this stream
    pub fn parent_handle(&self) -> Option<Handle> {
        self.parent
    }

    pub fn closure(&self) -> &Closure {
        self.closure
    }

    pub fn channel_information(&self) -> Option<ChannelInfo> {
        self.channel.and_then(|channel| self.consumer.channel_info(channel))
    }

    pub fn reissue(&self, request: ReqMsg) -> Result<()> {
        self.consumer.reissue(self.handle, request)
    }

    pub fn submit_generic(&self, generic: GenericMsg) -> Result<()> {
        self.consumer.submit_generic(self.handle, generic)
    }

    pub fn submit_post(&self, post: PostMsg) -> Result<()> {
        self.consumer.submit_post(self.handle, post)
    }

    /// Unregister any handle of this consumer, this one included
    pub fn unregister(&self, handle: Handle) -> Result<()> {
        self.consumer.unregister(handle)
    }
}

impl std::fmt::Debug for OmmConsumerEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmmConsumerEvent")
            .field("handle", &self.handle)
            .field("parent", &self.parent)
            .field("channel", &self.channel)
            .finish()
    }
}

/// Where a provider callback came from
pub struct OmmProviderEvent<'a> {
    pub(crate) handle: Handle,
    pub(crate) closure: &'a Closure,
    pub(crate) channel: Option<ChannelId>,
    pub(crate) provider: &'a ProviderCore,
}

impl OmmProviderEvent<'_> {
    /// Stream handle; pass it to `OmmProvider::submit` to answer on this stream
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn closure(&self) -> &Closure {
        self.closure
    }

    /// Client channel the request came from
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn channel_information(&self) -> Option<ChannelInfo> {
        self.channel.and_then(|channel| self.provider.channel_info(channel))
    }

    /// Answer on the stream this event belongs to
    ///
    /// Interactive providers only; login events of a non-interactive
    /// provider have no stream to answer on.
    pub fn submit(&self, msg: impl Into<Msg>) -> Result<()> {
        self.provider.submit_on_stream(self.handle, msg.into())
    }
}

impl std::fmt::Debug for OmmProviderEvent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmmProviderEvent")
            .field("handle", &self.handle)
            .field("channel", &self.channel)
            .finish()
    }
}
