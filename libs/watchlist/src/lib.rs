//! # Stream State Machine
//!
//! ## Purpose
//!
//! Owns every stream an OMM application has open and decides what each
//! inbound message means for it:
//! - Generation-counted handles that fail loudly once retired
//! - The item state machine (request, refresh, update, status, close)
//! - Batch and view requests, tunnel streams and their sub-streams
//! - Consumer control plane: login, source directory, dictionary download
//! - Request routing across sessions and recovery after channel loss
//! - Provider stream tables for interactive and non-interactive providers
//!
//! ## Architecture Role
//!
//! ```text
//! types/codec → [watchlist] → access
//!                   ↑
//!                reactor events (up, down, message)
//! ```
//!
//! Watchlists are plain state: every operation returns [`Effects`] listing
//! the messages to write and the events to deliver, in order. The access
//! layer performs the writes and invokes callbacks without holding the
//! watchlist lock.
//!
//! ## What This Crate Does NOT Contain
//! - Sockets, reconnect timers or threads (belongs in reactor/)
//! - Callback traits and the public consumer/provider API (belongs in access/)

pub mod consumer;
pub mod effects;
pub mod error;
pub mod handle;
pub mod niprovider;
pub mod provider;
pub mod services;
pub mod state;
pub mod tunnel;

pub use consumer::{ConsumerSettings, ConsumerWatchlist, SessionPhase};
pub use effects::{Delivery, DeliveryKind, Effects, Outbound, Violation};
pub use error::{Result, WatchlistError};
pub use handle::{Handle, HandleArena};
pub use niprovider::{NiPhase, NiProviderSettings, NiProviderWatchlist};
pub use provider::{ProviderSettings, ProviderWatchlist};
pub use services::{Availability, CachedService, ServiceCache, ServiceChange};
pub use state::{ItemState, Transition};
