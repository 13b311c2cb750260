//! Core types, configuration, and errors for Threadline
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - The shared data model (`OrderRecord`, `OrderTable`, `PostEntry`, `WindowEntry`)
//! - Timestamp helpers (microseconds since Unix epoch)
//! - Common error types

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod models;
pub mod timestamps;

// Re-export key types for convenience
pub use config::Config;
pub use error::{Error as ThreadlineError, Result as ThreadlineResult};
pub use models::{
    ContentKind, DiscussionId, EntryKey, OpaqueEntry, OpaqueKind, OrderRecord, OrderRow,
    OrderTable, PostEntry, PostId, WindowEntry,
};
pub use timestamps::{iso_to_micros, micros_to_iso};
