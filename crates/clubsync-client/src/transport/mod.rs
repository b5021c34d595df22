//! WebSocket transport: connect, single-writer send path, receive loop.

pub mod ws;

pub use ws::{connect, receive_loop, spawn_writer, ErrorThrottle, LoopExit, WsStream};
