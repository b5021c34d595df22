//! clubsync core: transport-free protocol primitives, domain events, and the
//! shared error surface.
//!
//! This crate defines the wire-level contracts used by the sync client and
//! any tooling built on top of it. It intentionally carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `SyncError`/`Result` so a long-lived
//! client process does not crash on malformed server traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod event;
pub mod protocol;

/// Shared result type.
pub use error::{Result, SyncError};
