//! Playout jitter buffer for real-time media.
//!
//! Packets arrive from the network out of order, duplicated or not at all;
//! a consumer pulls fixed-size elements at its own cadence. The
//! [`JitterBuffer`] reorders what arrives inside a bounded window, conceals
//! what is missing when it is due, and keeps counters for whatever adapts
//! the buffering depth upstream.

pub mod buffers;
pub mod concealment;
pub mod logging;
pub mod metrics;
pub mod packet;

pub use buffers::{BufferError, ConcealmentMode, JitterBuffer, JitterBufferConfig};
pub use concealment::{Concealment, ConcealmentSlot, SharedConcealment, Silence};
pub use logging::{LogCrateSink, LogSink, NullSink, SharedLogSink};
pub use metrics::Metrics;
pub use packet::{Packet, PacketError};

use thiserror::Error;

/// Contract violation reported by a jitter buffer. Loss, reordering and
/// underruns are never errors.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum JitterError {
    #[error(transparent)]
    PacketError(#[from] PacketError),
    #[error(transparent)]
    BufferError(#[from] BufferError),
}
