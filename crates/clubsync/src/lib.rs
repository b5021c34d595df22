//! Top-level facade crate for clubsync.
//!
//! Re-exports core types and the client library so users can depend on a single crate.

pub mod core {
    pub use clubsync_core::*;
}

pub mod client {
    pub use clubsync_client::*;
}
