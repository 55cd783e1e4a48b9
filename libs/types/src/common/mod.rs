//! Shared error types for value validation

pub mod errors;
