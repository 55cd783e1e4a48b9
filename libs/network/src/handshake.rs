//! Connection handshake
//!
//! ## Sequence
//!
//! ```text
//! client                                   server
//!   │ ── ConnectRequest(version, ping, name, crc) ──▶ │
//!   │ ◀── ConnectAck(version, min(ping), name, crc) ── │
//!   │            or ConnectNak(reason)                │
//! ```
//!
//! Handshake messages travel as ordinary length-prefixed frames without a
//! checksum; the negotiated settings apply to every frame that follows.

use crate::{Result, TransportError};
use bytes::{Buf, BufMut, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Wire protocol version spoken by this crate
pub const PROTOCOL_VERSION: u16 = 14;

const CONNECT_REQUEST: u8 = 0x01;
const CONNECT_ACK: u8 = 0x02;
const CONNECT_NAK: u8 = 0x03;

/// Largest handshake frame either side accepts
const MAX_HANDSHAKE_SIZE: usize = 4096;

/// Client side opening message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: u16,
    pub ping_timeout: Duration,
    pub component_name: String,
    pub checksum: bool,
}

/// Server acceptance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAck {
    pub protocol_version: u16,
    pub ping_timeout: Duration,
    pub component_name: String,
    pub checksum: bool,
}

/// Server refusal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectNak {
    pub reason: String,
}

/// Settings both sides apply once the handshake completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub protocol_version: u16,
    pub ping_timeout: Duration,
    pub checksum: bool,
    pub peer_component: String,
}

/// Server side policy
#[derive(Debug, Clone)]
pub struct ServerPolicy {
    pub ping_timeout: Duration,
    pub component_name: String,
    /// Allow a checksum trailer when the client asks for one
    pub allow_checksum: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandshakeMsg {
    Request(ConnectRequest),
    Ack(ConnectAck),
    Nak(ConnectNak),
}

fn put_name(out: &mut BytesMut, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(u8::MAX as usize);
    out.put_u8(len as u8);
    out.put_slice(&bytes[..len]);
}

fn get_name(buf: &mut &[u8]) -> Result<String> {
    if buf.remaining() < 1 {
        return Err(TransportError::protocol("handshake truncated before name"));
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(TransportError::protocol("handshake name truncated"));
    }
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    buf.advance(len);
    Ok(name)
}

fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

impl HandshakeMsg {
    fn encode(&self) -> BytesMut {
        let mut out = BytesMut::with_capacity(64);
        match self {
            HandshakeMsg::Request(request) => {
                out.put_u8(CONNECT_REQUEST);
                out.put_u16(request.protocol_version);
                out.put_u32(millis(request.ping_timeout));
                out.put_u8(request.checksum as u8);
                put_name(&mut out, &request.component_name);
            }
            HandshakeMsg::Ack(ack) => {
                out.put_u8(CONNECT_ACK);
                out.put_u16(ack.protocol_version);
                out.put_u32(millis(ack.ping_timeout));
                out.put_u8(ack.checksum as u8);
                put_name(&mut out, &ack.component_name);
            }
            HandshakeMsg::Nak(nak) => {
                out.put_u8(CONNECT_NAK);
                let reason = nak.reason.as_bytes();
                let len = reason.len().min(u16::MAX as usize);
                out.put_u16(len as u16);
                out.put_slice(&reason[..len]);
            }
        }
        out
    }

    fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 1 {
            return Err(TransportError::protocol("empty handshake message"));
        }
        let tag = buf.get_u8();
        match tag {
            CONNECT_REQUEST | CONNECT_ACK => {
                if buf.remaining() < 7 {
                    return Err(TransportError::protocol("handshake header truncated"));
                }
                let protocol_version = buf.get_u16();
                let ping_timeout = Duration::from_millis(buf.get_u32() as u64);
                let checksum = buf.get_u8() != 0;
                let component_name = get_name(&mut buf)?;
                Ok(if tag == CONNECT_REQUEST {
                    HandshakeMsg::Request(ConnectRequest {
                        protocol_version,
                        ping_timeout,
                        component_name,
                        checksum,
                    })
                } else {
                    HandshakeMsg::Ack(ConnectAck {
                        protocol_version,
                        ping_timeout,
                        component_name,
                        checksum,
                    })
                })
            }
            CONNECT_NAK => {
                if buf.remaining() < 2 {
                    return Err(TransportError::protocol("handshake nak truncated"));
                }
                let len = buf.get_u16() as usize;
                if buf.remaining() < len {
                    return Err(TransportError::protocol("handshake nak reason truncated"));
                }
                Ok(HandshakeMsg::Nak(ConnectNak {
                    reason: String::from_utf8_lossy(&buf[..len]).into_owned(),
                }))
            }
            other => Err(TransportError::protocol(format!(
                "unknown handshake message {other:#04x}"
            ))),
        }
    }
}

async fn write_msg<S: AsyncWrite + Unpin>(stream: &mut S, msg: &HandshakeMsg) -> Result<()> {
    let body = msg.encode();
    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to write handshake", e))?;
    stream
        .flush()
        .await
        .map_err(|e| TransportError::network_with_source("Failed to flush handshake", e))
}

// Reads exactly one frame so nothing after the handshake is consumed here
async fn read_msg<S: AsyncRead + Unpin>(stream: &mut S) -> Result<HandshakeMsg> {
    let mut len_bytes = [0u8; 4];
    stream
        .read_exact(&mut len_bytes)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to read handshake length", e))?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len == 0 || len > MAX_HANDSHAKE_SIZE {
        return Err(TransportError::protocol(format!(
            "handshake frame of {len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| TransportError::network_with_source("Failed to read handshake", e))?;
    HandshakeMsg::decode(&body)
}

/// Run the client side of the handshake
pub async fn client_handshake<S>(
    stream: &mut S,
    request: &ConnectRequest,
    remote: &str,
    timeout: Duration,
) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        write_msg(stream, &HandshakeMsg::Request(request.clone())).await?;
        match read_msg(stream).await? {
            HandshakeMsg::Ack(ack) => {
                let negotiated = Negotiated {
                    protocol_version: ack.protocol_version,
                    ping_timeout: ack.ping_timeout,
                    checksum: ack.checksum && request.checksum,
                    peer_component: ack.component_name,
                };
                info!(
                    remote,
                    peer = %negotiated.peer_component,
                    ping_ms = negotiated.ping_timeout.as_millis() as u64,
                    checksum = negotiated.checksum,
                    "Handshake accepted"
                );
                Ok(negotiated)
            }
            HandshakeMsg::Nak(nak) => {
                warn!(remote, reason = %nak.reason, "Handshake rejected");
                Err(TransportError::rejected(remote, nak.reason))
            }
            HandshakeMsg::Request(_) => Err(TransportError::protocol(
                "peer answered a connect request with a connect request",
            )),
        }
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| TransportError::timeout("client handshake", timeout.as_millis() as u64))?
}

/// Run the server side of the handshake
pub async fn server_handshake<S>(
    stream: &mut S,
    policy: &ServerPolicy,
    remote: &str,
) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let exchange = async {
        let request = match read_msg(stream).await? {
            HandshakeMsg::Request(request) => request,
            other => {
                return Err(TransportError::protocol(format!(
                    "expected connect request, got {other:?}"
                )))
            }
        };
        if request.protocol_version != PROTOCOL_VERSION {
            let reason = format!(
                "unsupported protocol version {} (server speaks {})",
                request.protocol_version, PROTOCOL_VERSION
            );
            write_msg(stream, &HandshakeMsg::Nak(ConnectNak { reason: reason.clone() })).await?;
            return Err(TransportError::rejected(remote, reason));
        }
        if request.ping_timeout.is_zero() {
            let reason = "ping timeout must be positive".to_string();
            write_msg(stream, &HandshakeMsg::Nak(ConnectNak { reason: reason.clone() })).await?;
            return Err(TransportError::rejected(remote, reason));
        }
        let ack = ConnectAck {
            protocol_version: PROTOCOL_VERSION,
            ping_timeout: request.ping_timeout.min(policy.ping_timeout),
            component_name: policy.component_name.clone(),
            checksum: request.checksum && policy.allow_checksum,
        };
        write_msg(stream, &HandshakeMsg::Ack(ack.clone())).await?;
        debug!(remote, client = %request.component_name, "Accepted connect request");
        Ok(Negotiated {
            protocol_version: ack.protocol_version,
            ping_timeout: ack.ping_timeout,
            checksum: ack.checksum,
            peer_component: request.component_name,
        })
    };
    tokio::time::timeout(policy.timeout, exchange)
        .await
        .map_err(|_| {
            TransportError::timeout("server handshake", policy.timeout.as_millis() as u64)
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ServerPolicy {
        ServerPolicy {
            ping_timeout: Duration::from_secs(30),
            component_name: "provider".into(),
            allow_checksum: true,
            timeout: Duration::from_secs(1),
        }
    }

    fn request(ping: Duration) -> ConnectRequest {
        ConnectRequest {
            protocol_version: PROTOCOL_VERSION,
            ping_timeout: ping,
            component_name: "consumer".into(),
            checksum: true,
        }
    }

    #[tokio::test]
    async fn negotiates_smaller_ping_timeout_and_checksum() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let server_task =
            tokio::spawn(async move { server_handshake(&mut server, &policy(), "client").await });

        let negotiated = client_handshake(
            &mut client,
            &request(Duration::from_secs(10)),
            "server",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(negotiated.ping_timeout, Duration::from_secs(10));
        assert!(negotiated.checksum);
        assert_eq!(negotiated.peer_component, "provider");

        let server_side = server_task.await.unwrap().unwrap();
        assert_eq!(server_side.peer_component, "consumer");
        assert_eq!(server_side.ping_timeout, negotiated.ping_timeout);
    }

    #[tokio::test]
    async fn version_mismatch_is_naked() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move { server_handshake(&mut server, &policy(), "client").await });

        let mut bad = request(Duration::from_secs(10));
        bad.protocol_version = 1;
        let err = client_handshake(&mut client, &bad, "server", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { .. }));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (mut client, _server) = tokio::io::duplex(1024);
        let err = client_handshake(
            &mut client,
            &request(Duration::from_secs(10)),
            "server",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[test]
    fn messages_survive_encoding() {
        let messages = [
            HandshakeMsg::Request(request(Duration::from_millis(1500))),
            HandshakeMsg::Nak(ConnectNak {
                reason: "server full".into(),
            }),
        ];
        for msg in messages {
            assert_eq!(HandshakeMsg::decode(&msg.encode()).unwrap(), msg);
        }
        assert!(HandshakeMsg::decode(&[0x7F]).is_err());
    }
}
