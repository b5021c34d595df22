//! Wire protocol modules.
//!
//! The coordination service speaks tagged JSON envelopes over a single text
//! connection: `{"type": "<dot.separated.verb>", ...fields}`. There is no
//! envelope-level correlation id; responses are matched to pending calls by
//! their `type` tag alone (see [`calls`]).
//!
//! All parsers are panic-free: malformed input is reported as `SyncError`
//! instead of panicking, keeping the client resilient to bad server frames.

pub mod calls;
pub mod envelope;

pub use calls::CallSpec;
pub use envelope::Envelope;
