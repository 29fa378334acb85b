//! Websocket control protocol frames.
//!
//! Control messages are JSON objects with a `control` discriminator. Event
//! frames (raw change events) carry no `control` field and are not part of
//! this enum. Timestamps inside frames are nanoseconds; latency figures are
//! reported in milliseconds.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A control frame, client→server or server→client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "control", rename_all = "lowercase")]
pub enum ControlFrame {
    /// Liveness probe. Sent by either side.
    Ping {
        /// Sender's clock at send time, nanoseconds.
        #[serde(rename = "srcTs")]
        src_ts: i64,
    },
    /// Reply to a ping.
    Pong {
        /// The `srcTs` echoed from the ping.
        #[serde(rename = "srcTs")]
        src_ts: i64,
        /// Receiver's clock when the ping arrived, nanoseconds.
        #[serde(rename = "dstTs")]
        dst_ts: i64,
    },
    /// Client request to begin streaming, or the server's ack.
    Start {
        /// Backfill origin, unix seconds. Absent means "now".
        #[serde(rename = "startTs", default, skip_serializing_if = "Option::is_none")]
        start_ts: Option<i64>,
        /// Empty string on the server's ack; absent on the client request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Fatal error; the connection closes after this frame.
    Error {
        /// Human-readable cause.
        error: String,
    },
}

impl ControlFrame {
    /// The server's ack for a client `start`.
    #[must_use]
    pub fn start_ack() -> Self {
        Self::Start {
            start_ts: None,
            error: Some(String::new()),
        }
    }

    /// An error frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Round-trip latency figures in milliseconds.
///
/// The empty (all-zero) value means "no pong arrived in time".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Latency {
    /// Ping flight time, sender to receiver.
    pub send: i64,
    /// Pong flight time, receiver back to sender.
    pub recv: i64,
    /// Full round trip.
    pub rtt: i64,
}

impl Latency {
    /// Computes latency from a pong.
    ///
    /// `src_ts` is our clock when the ping left, `dst_ts` the peer's clock
    /// when it arrived, `now_ns` our clock when the pong came back.
    #[must_use]
    pub fn from_pong(src_ts: i64, dst_ts: i64, now_ns: i64) -> Self {
        Self {
            send: (dst_ts - src_ts) / 1_000_000,
            recv: (now_ns - dst_ts) / 1_000_000,
            rtt: (now_ns - src_ts) / 1_000_000,
        }
    }

    /// Returns true if no pong was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Current wall-clock time in nanoseconds since the unix epoch.
#[must_use]
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
