//! # OMM Configuration
//!
//! ## Purpose
//!
//! Typed configuration for the three application roles: consumer,
//! interactive provider and non-interactive provider. Every recognised option
//! is a field on one of the structs below; there is no free-form key lookup.
//!
//! ## Architecture Role
//!
//! ```text
//! TOML file ─┐
//!            ├─→ config-rs ─→ ConsumerConfig / IProviderConfig / NiProviderConfig
//! OMM__* env ┘                        │
//! builders ───────────────────────────┤  validated here
//!                                     ▼
//!                         access facade → reactor + watchlist
//! ```
//!
//! Builders check each value at the setter that received it, so a bad host or
//! an inverted delay range fails where it was introduced rather than at
//! connect time. Loaded files are validated as a whole after environment
//! overrides are applied.
//!
//! ## Usage
//!
//! ```rust
//! use omm_config::ConsumerConfig;
//!
//! let config = ConsumerConfig::builder()
//!     .user_name("alice")?
//!     .host("localhost:14002")?
//!     .build()?;
//! assert_eq!(config.channels[0].name, "Channel_1");
//! # Ok::<(), omm_config::ConfigError>(())
//! ```

pub mod channel;
pub mod consumer;
pub mod defaults;
pub mod dictionary;
pub mod error;
pub mod loader;
pub mod provider;
pub mod service;

pub use channel::{
    BackpressureMode, ChannelConfig, ChannelTuning, PreferredHostConfig, ReconnectConfig,
    ServerConfig, SessionConfig,
};
pub use consumer::{ConsumerConfig, ConsumerConfigBuilder, ResolvedSession};
pub use dictionary::{DictionaryFiles, DictionarySource};
pub use error::{ConfigError, Result};
pub use loader::{load, load_with_prefix, save, to_toml, Loadable};
pub use provider::{IProviderConfig, IProviderConfigBuilder, NiProviderConfig, NiProviderConfigBuilder};
pub use service::{AdminControl, QosConfig, ServiceConfig};

use serde::{Deserialize, Serialize};

/// Who drives callback dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationModel {
    /// An internal thread dispatches as events arrive
    #[default]
    ApiDispatch,
    /// The application calls `dispatch` itself
    UserDispatch,
}
