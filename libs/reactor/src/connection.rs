//! The task body serving one live connection

use crate::channel::{ChannelShared, Command};
use crate::event::ReactorEvent;
use codec::Decoder;
use crossbeam_channel::Sender;
use network::{ChannelReader, Frame};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Why a connection task returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ended {
    Lost(String),
    Command(Command),
    /// Periodic preferred-host detection is due
    Detect,
}

pub(crate) struct Link<'a> {
    pub shared: &'a ChannelShared,
    pub reader: &'a mut ChannelReader,
    pub events: &'a Sender<ReactorEvent>,
    pub decoder: &'a Decoder,
    pub ping_timeout: Duration,
}

/// Read, write and ping until the connection ends or a command arrives
pub(crate) async fn run(
    link: Link<'_>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    detection: Option<Duration>,
) -> Ended {
    let Link {
        shared,
        reader,
        events,
        decoder,
        ping_timeout,
    } = link;
    let ping_every = (ping_timeout / 3).max(Duration::from_millis(10));
    let mut ping = tokio::time::interval(ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detect = detection.map(|every| {
        let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            frame = reader.next_frame() => match frame {
                Ok(Some(Frame::Ping)) => {
                    last_inbound = Instant::now();
                    shared.metrics.record_ping_received();
                }
                Ok(Some(Frame::Message(bytes))) => {
                    last_inbound = Instant::now();
                    shared.metrics.record_receive(bytes.len());
                    match decoder.decode_msg(&bytes) {
                        Ok(msg) => {
                            debug!(channel = %shared.name, stream_id = msg.stream_id(), class = ?msg.class(), "Inbound message");
                            if events.send(ReactorEvent::Message { channel: shared.id, msg }).is_err() {
                                return Ended::Command(Command::Close);
                            }
                        }
                        Err(error) => {
                            shared.metrics.record_dropped();
                            warn!(channel = %shared.name, bytes = bytes.len(), %error, "Dropped undecodable frame");
                        }
                    }
                }
                Ok(None) => return Ended::Lost("peer closed the connection".into()),
                Err(error) => return Ended::Lost(error.to_string()),
            },
            _ = shared.wake.notified() => {
                if let Err(error) = shared.drain().await {
                    return Ended::Lost(error.to_string());
                }
            }
            _ = ping.tick() => {
                if last_inbound.elapsed() > ping_timeout {
                    return Ended::Lost(format!("no traffic from peer within {ping_timeout:?}"));
                }
                if let Err(error) = shared.ping_if_idle(ping_every).await {
                    return Ended::Lost(error.to_string());
                }
            }
            _ = tick(&mut detect) => return Ended::Detect,
            command = commands.recv() => {
                return Ended::Command(command.unwrap_or(Command::Close));
            }
        }
    }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
