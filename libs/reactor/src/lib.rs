//! # Channel Multiplexer
//!
//! ## Purpose
//!
//! Owns the transport connections of one consumer or provider and turns them
//! into a single ordered event queue:
//! - Client channels walking a host list with bounded, jittered backoff
//! - Preferred-host detection and on-demand fallback
//! - Server channels accepted by interactive providers
//! - Queued and direct writes bounded by per-channel output buffer pools
//! - Ping heartbeats and inactivity detection
//! - IOCtl codes applied to live channels
//!
//! ## Architecture Role
//!
//! ```text
//!                ┌──────────────── Reactor ────────────────┐
//!  submit ──────▶│ encode → BufferPool → queue/direct write │──▶ transport
//!                │                                          │
//!  dispatch ◀────│ event queue ◀── decode ◀── frame reader  │◀── transport
//!                └──────────────────────────────────────────┘
//! ```
//!
//! The reactor runs its own multi-threaded tokio runtime. Everything it
//! learns about channels and inbound traffic is pushed, in order, onto a
//! crossbeam queue drained by the access layer's dispatcher; submissions may
//! come from any thread.
//!
//! ## What This Crate Does NOT Contain
//! - Stream state, handles or request routing (belongs in watchlist/)
//! - Callbacks or the public consumer/provider API (belongs in access/)

mod channel;
mod client;
mod connection;
pub mod error;
pub mod event;
mod reactor;
mod registry;
mod server;

pub use error::{ReactorError, Result};
pub use event::{ChannelInfo, ChannelRole, ChannelState, ReactorEvent};
pub use reactor::{Reactor, ReactorOptions};
