//! Live channels and servers of one reactor

use crate::channel::ChannelShared;
use crate::event::ReactorEvent;
use crate::server::ServerShared;
use crossbeam_channel::Sender;
use dashmap::DashMap;
use network::ChannelId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) struct Registry {
    pub channels: DashMap<ChannelId, Arc<ChannelShared>>,
    pub servers: DashMap<String, Arc<ServerShared>>,
    pub events: Sender<ReactorEvent>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new(events: Sender<ReactorEvent>) -> Self {
        Self {
            channels: DashMap::new(),
            servers: DashMap::new(),
            events,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> ChannelId {
        ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, channel: Arc<ChannelShared>) {
        self.channels.insert(channel.id, channel);
    }

    pub fn remove(&self, id: ChannelId) {
        self.channels.remove(&id);
    }

    pub fn get(&self, id: ChannelId) -> Option<Arc<ChannelShared>> {
        self.channels.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot so no map shard stays locked while callers work on channels
    pub fn all(&self) -> Vec<Arc<ChannelShared>> {
        self.channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
