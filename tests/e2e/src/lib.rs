//! End-to-End Test Framework for the OMM SDK
//!
//! Runs real consumers against a real interactive provider, through the
//! whole stack (access → watchlist → reactor → network → codec and back),
//! over loopback TCP or the in-memory transport.

pub mod fixtures;
pub mod framework;
pub mod validation;

pub use fixtures::{item_refresh, item_update, FeedProvider, Observed, RecordingClient};
pub use framework::{TestConfig, TestFramework, Transport};
pub use validation::{validate_item_stream, validate_recovery, StreamViolation};
