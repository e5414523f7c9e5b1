//! Opaque packet/frame handles exchanged with collaborators.
//!
//! The core never interprets codec payload bytes; it only reads the
//! timing metadata it needs to schedule. Collaborators hand back a
//! [`PacketMeta`] alongside whatever opaque handle they use internally.

use crate::ids::StreamId;

/// Timing metadata the demuxer collaborator attaches to every packet it
/// hands back: `dts_est` is a per-packet decoder-timestamp estimate the
/// demuxer computes and carries alongside the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub stream: StreamId,
    /// Estimated decode timestamp, in stream time base units.
    pub dts_est: i64,
    pub is_keyframe: bool,
}

/// What the demuxer collaborator's pull can report back.
pub enum PullOutcome {
    /// A packet was produced.
    Packet(PacketMeta),
    /// No packet available right now; try again later.
    RetryAgain,
    /// The input signalled a loop restart (e.g. `-stream_loop`).
    LoopRestart,
    /// Clean end of stream.
    Eof,
}
