//! # DataIO Types
//!
//! Wire protocol and configuration types for the Amethyst DataIO layer.
//!
//! This crate sits at the bottom of the dependency graph and carries
//! everything two processes sharing a store must agree on:
//!
//! - **`protocol`** - Change-notification messages and channel naming
//! - **`config`** - Remote store connection parameters
//! - **`error`** - Protocol error definitions
//!
//! All types are serde-serializable and `Clone` for cheap sharing across
//! async boundaries.

pub mod config;
pub mod error;
pub mod protocol;

// Re-export the wire surface for convenience
pub use config::StoreConfig;
pub use error::ProtocolError;
pub use protocol::{channel_id, decode_field_id, encode_field_id, ChangeAction, ChangeNotice};
