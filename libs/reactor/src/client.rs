//! Client channel supervision: host failover, backoff, preferred host
//!
//! One supervisor task owns a logical channel for its whole life. It walks
//! the configured hosts round-robin, backing off between failed attempts,
//! and reports every established and lost connection as an event:
//!
//! ```text
//!  Initializing ──connect──▶ Up ──lost──▶ DownReconnecting ──delay──▶ Initializing
//!                                  │                    └─attempts exhausted─▶ Down
//!                                  └─close────────────────────────────────────▶ Closed
//! ```

use crate::channel::{ChannelShared, Command};
use crate::connection::{self, Ended, Link};
use crate::event::{ChannelState, ReactorEvent};
use codec::Decoder;
use crossbeam_channel::Sender;
use network::{
    open_client, Backoff, BackoffPolicy, ConnectRequest, EndpointConnector, EstablishedChannel,
    PROTOCOL_VERSION,
};
use omm_config::{ChannelConfig, PreferredHostConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Everything a supervisor needs to (re)connect
#[derive(Debug, Clone)]
pub(crate) struct ClientPlan {
    pub hosts: Vec<ChannelConfig>,
    pub policy: BackoffPolicy,
    pub preferred: PreferredHostConfig,
    pub component_name: String,
    pub max_frame_size: usize,
}

impl ClientPlan {
    fn preferred_index(&self) -> Option<usize> {
        self.preferred.enabled.then_some(self.preferred.host_index)
    }
}

pub(crate) struct ClientSupervisor {
    pub shared: Arc<ChannelShared>,
    pub plan: ClientPlan,
    pub connector: EndpointConnector,
    pub events: Sender<ReactorEvent>,
    pub decoder: Decoder,
}

impl ClientSupervisor {
    async fn open(&self, index: usize) -> network::Result<EstablishedChannel> {
        let host = &self.plan.hosts[index];
        let endpoint = host
            .endpoint()
            .map_err(|e| network::TransportError::configuration(e.to_string(), Some("host")))?;
        let request = ConnectRequest {
            protocol_version: PROTOCOL_VERSION,
            ping_timeout: host.tuning.ping_timeout(),
            component_name: self.plan.component_name.clone(),
            checksum: host.checksum,
        };
        open_client(
            &self.connector,
            &endpoint,
            &request,
            host.connect_timeout(),
            self.plan.max_frame_size,
        )
        .await
    }

    fn emit(&self, event: ReactorEvent) -> bool {
        self.events.send(event).is_ok()
    }

    async fn go_live(&self, established: EstablishedChannel, index: usize) -> (network::ChannelReader, Duration) {
        let EstablishedChannel {
            reader,
            writer,
            negotiated,
            remote,
        } = established;
        let ping_timeout = negotiated.ping_timeout;
        info!(channel = %self.shared.name, host = %remote, index, "Channel up");
        self.shared.attach(writer, remote.clone(), negotiated).await;
        self.emit(ReactorEvent::ChannelUp {
            channel: self.shared.id,
            host: remote,
        });
        (reader, ping_timeout)
    }

    /// Run until closed or out of attempts
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let hosts = self.plan.hosts.len();
        let mut backoff = Backoff::new(self.plan.policy);
        let mut preferred = self.plan.preferred_index();
        let mut next = preferred.unwrap_or(0);

        loop {
            let mut index = next;
            self.shared.set_state(ChannelState::Initializing);
            match self.open(index).await {
                Ok(established) => {
                    backoff.reset();
                    let (mut reader, mut ping_timeout) = self.go_live(established, index).await;
                    loop {
                        let detection = match preferred {
                            Some(target) if target != index => self.plan.preferred.detection_interval(),
                            _ => None,
                        };
                        let link = Link {
                            shared: &self.shared,
                            reader: &mut reader,
                            events: &self.events,
                            decoder: &self.decoder,
                            ping_timeout,
                        };
                        let target = match connection::run(link, &mut commands, detection).await {
                            Ended::Lost(reason) => {
                                let reconnecting = !self.plan.policy.exhausted(0);
                                warn!(channel = %self.shared.name, %reason, reconnecting, "Channel down");
                                let state = if reconnecting {
                                    ChannelState::DownReconnecting
                                } else {
                                    ChannelState::Down
                                };
                                self.shared.detach(state).await;
                                self.emit(ReactorEvent::ChannelDown {
                                    channel: self.shared.id,
                                    reconnecting,
                                    reason,
                                });
                                if !reconnecting {
                                    return;
                                }
                                break;
                            }
                            Ended::Command(Command::Close) => {
                                self.close().await;
                                return;
                            }
                            Ended::Command(Command::FallbackToPreferred(selected)) => {
                                if let Some(selected) = selected.filter(|&i| i < hosts) {
                                    info!(channel = %self.shared.name, host_index = selected, "Preferred host changed");
                                    preferred = Some(selected);
                                }
                                preferred.unwrap_or(0)
                            }
                            Ended::Detect => match preferred {
                                Some(target) => target,
                                None => continue,
                            },
                        };
                        if target == index {
                            continue;
                        }
                        match self.open(target).await {
                            Ok(established) => {
                                info!(channel = %self.shared.name, from = index, to = target, "Switching to preferred host");
                                self.shared.detach(ChannelState::DownReconnecting).await;
                                self.emit(ReactorEvent::ChannelDown {
                                    channel: self.shared.id,
                                    reconnecting: true,
                                    reason: "switching to preferred host".into(),
                                });
                                (reader, ping_timeout) = self.go_live(established, target).await;
                                index = target;
                            }
                            Err(error) => {
                                warn!(channel = %self.shared.name, host_index = target, %error, "Preferred host unavailable");
                            }
                        }
                    }
                    next = preferred.unwrap_or((index + 1) % hosts);
                }
                Err(error) => {
                    warn!(channel = %self.shared.name, host = %self.plan.hosts[index].host, %error, "Connection attempt failed");
                    next = (index + 1) % hosts;
                }
            }

            let Some(delay) = backoff.next_delay() else {
                warn!(channel = %self.shared.name, attempts = backoff.attempts(), "Reconnect attempts exhausted");
                self.shared.set_state(ChannelState::Down);
                self.emit(ReactorEvent::ChannelDown {
                    channel: self.shared.id,
                    reconnecting: false,
                    reason: "reconnect attempts exhausted".into(),
                });
                return;
            };
            self.shared.set_state(ChannelState::DownReconnecting);
            info!(channel = %self.shared.name, delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                command = commands.recv() => match command {
                    Some(Command::FallbackToPreferred(selected)) => {
                        if let Some(selected) = selected.filter(|&i| i < hosts) {
                            preferred = Some(selected);
                            next = selected;
                        }
                    }
                    Some(Command::Close) | None => {
                        self.close().await;
                        return;
                    }
                }
            }
        }
    }

    async fn close(&self) {
        info!(channel = %self.shared.name, "Channel closed");
        self.shared.detach(ChannelState::Closed).await;
        self.emit(ReactorEvent::ChannelDown {
            channel: self.shared.id,
            reconnecting: false,
            reason: "channel closed".into(),
        });
    }
}
