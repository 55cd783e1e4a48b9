//! # OMM Consumer and Provider API
//!
//! ## Purpose
//!
//! The surface applications program against:
//! - [`OmmConsumer`]: register interest in items, receive their messages
//!   through an [`OmmConsumerClient`], reissue, post and unregister
//! - [`OmmProvider`]: answer consumer requests (interactive) or publish into
//!   an infrastructure host (non-interactive)
//! - [`OmmError`]: one error type with a discriminated [`OmmErrorKind`]
//! - Operation model: an internal dispatch thread or application-driven
//!   [`OmmConsumer::dispatch`] calls
//!
//! ## Architecture Role
//!
//! ```text
//! application ──registerClient/submit──▶ [access] ──▶ watchlist ──▶ reactor ──▶ wire
//!      ▲                                    │
//!      └────────── callbacks ◀── dispatcher ◀── reactor events
//! ```
//!
//! Stream tables produce effects under their lock; the access layer writes
//! the outbound messages and queues deliveries in the same critical section,
//! then runs callbacks one at a time on the dispatching thread.
//!
//! ## Example
//!
//! ```rust,no_run
//! use access::{Closure, OmmConsumer, OmmConsumerClient, OmmConsumerEvent};
//! use omm_config::ConsumerConfig;
//! use std::sync::Arc;
//! use types::{ReqMsg, UpdateMsg};
//!
//! struct Printer;
//!
//! impl OmmConsumerClient for Printer {
//!     fn on_update(&self, update: &UpdateMsg, event: &OmmConsumerEvent<'_>) {
//!         println!("{} {:?}", event.handle(), update.payload);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConsumerConfig::builder().host("localhost:14002")?.user_name("user")?.build()?;
//! let consumer = OmmConsumer::builder(config).build()?;
//! let request = ReqMsg::new().service_name("DIRECT_FEED").name("IBM.N");
//! consumer.register_client(request, Arc::new(Printer), Closure::none())?;
//! # Ok(())
//! # }
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Stream state or request routing (belongs in watchlist/)
//! - Sockets, reconnects or buffer pools (belongs in reactor/ and network/)
//! - Wire encoding (belongs in codec/)

pub mod client;
mod closure;
mod consumer;
mod dispatch;
mod error;
mod event;
mod provider;
pub mod rdm;

pub use client::{OmmConsumerClient, OmmErrorClient, OmmProviderClient};
pub use closure::Closure;
pub use consumer::{OmmConsumer, OmmConsumerBuilder};
pub use dispatch::DispatchOutcome;
pub use error::{
    InvalidHandle, InvalidUsage, MemoryExhaustion, OmmError, OmmErrorKind, Result, Shutdown,
    UnsupportedDomainType,
};
pub use event::{OmmConsumerEvent, OmmProviderEvent};
pub use provider::{OmmProvider, OmmProviderBuilder, ProviderRole};

pub use network::IoctlCode;
pub use reactor::{ChannelInfo, ChannelState};
pub use watchlist::{Handle, ItemState};
