//! # LabelDB Stream
//!
//! Real-time change-feed delivery for LabelDB.
//!
//! This crate provides:
//! - The websocket control protocol frames (`ping`/`pong`/`start`/`error`)
//! - The [`ChangeStreamer`]: single-use backfill-then-tail composition over
//!   the CDC log
//! - The [`ChangeFeedSession`]: one client's websocket subscription

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod control;
mod error;
mod session;
mod streamer;

pub use control::{now_ns, ControlFrame, Latency};
pub use error::{StreamError, StreamResult};
pub use session::{ChangeFeedSession, SessionConfig};
pub use streamer::ChangeStreamer;
