//! clubsync client library entry.
//!
//! This crate wires the WebSocket transport, request correlator, event
//! router, session context, and connection supervisor into a cohesive sync
//! client. It is a library: no CLI surface lives here, an application shell
//! consumes [`client::SyncClient`] and subscribes to its event streams.

pub mod client;
pub mod config;
pub mod correlate;
pub mod events;
pub mod router;
pub mod session;
pub mod transport;

pub use client::{ConnectionState, SyncClient};
pub use clubsync_core::{Result, SyncError};
