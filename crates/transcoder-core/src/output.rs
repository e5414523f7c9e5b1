//! OutputFile / OutputStream.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ids::{FilterGraphIndex, StreamId};
use crate::subtitle::HeartbeatState;

/// Lifecycle bitfield. Invariant 1: transitions are monotonic —
/// once `ENCODER_FINISHED` is set it is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Finished {
    pub encoder_done: bool,
    pub muxer_done: bool,
}

impl Finished {
    pub fn is_finished(&self) -> bool {
        self.encoder_done && self.muxer_done
    }

    pub fn set_encoder_done(&mut self) {
        self.encoder_done = true;
    }

    pub fn set_muxer_done(&mut self) {
        self.muxer_done = true;
    }
}

/// What an OutputStream actually is: a tagged variant with a shared
/// header and variant-specific payload.
#[derive(Debug, Clone)]
pub enum OutputKind {
    /// Raw demuxed packets forwarded without decode/encode.
    StreamCopy,
    /// Decoded, optionally filtered, re-encoded.
    Encoded { filter_output: Option<FilterGraphIndex> },
    /// A static payload rather than a transcoded stream.
    Attachment { filename: String },
}

/// One muxed stream.
#[derive(Debug)]
pub struct OutputStream {
    pub id: StreamId,
    pub input: Option<StreamId>,
    pub kind: OutputKind,
    pub last_mux_dts: i64,
    pub finished: Finished,
    pub initialized: bool,
    pub inputs_done: bool,
    pub unavailable: bool,
    packets_written: AtomicU64,
    pub quality: f64,
    pub last_dropped: bool,
    /// Index into the file's sync queue, or negative if this stream does
    /// not participate in one.
    pub sq_idx_encode: i32,
    /// Last subtitle seen feeding this stream, for the fix-sub-duration
    /// heartbeat. Only ever populated for subtitle-sourced Encoded outputs.
    pub heartbeat: HeartbeatState,
}

impl OutputStream {
    pub fn new(id: StreamId, input: Option<StreamId>, kind: OutputKind) -> Self {
        Self {
            id,
            input,
            kind,
            last_mux_dts: i64::MIN,
            finished: Finished::default(),
            initialized: false,
            inputs_done: false,
            unavailable: false,
            packets_written: AtomicU64::new(0),
            quality: 0.0,
            last_dropped: false,
            sq_idx_encode: -1,
            heartbeat: HeartbeatState::default(),
        }
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written.load(Ordering::Relaxed)
    }

    /// Written by collaborator threads (possibly off the scheduler
    /// thread), read by the progress reporter.
    pub fn record_packet_written(&self) {
        self.packets_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Invariant 4: `last_mux_dts` is non-decreasing per OutputStream.
    /// Panics in debug builds if violated; callers should only ever pass
    /// monotonic values from the muxer collaborator.
    pub fn advance_mux_dts(&mut self, dts: i64) {
        debug_assert!(
            self.last_mux_dts == i64::MIN || dts >= self.last_mux_dts,
            "last_mux_dts must be non-decreasing"
        );
        self.last_mux_dts = dts;
    }

    /// Invariant 5: a stream participating in a sync queue must not be
    /// considered muxer-done until a null-frame sentinel has been sent.
    pub fn ready_for_muxer_done(&self, sentinel_sent: bool) -> bool {
        self.sq_idx_encode < 0 || sentinel_sent
    }
}

/// Container for one open output.
pub struct OutputFile {
    pub index: usize,
    pub streams: Vec<OutputStream>,
    /// Whether this file has a sync queue aligning its encoder outputs.
    pub has_sync_queue: bool,
    /// Set once the muxer collaborator has written this file's header.
    /// Gates periodic progress reporting until every output is actually
    /// open for writing.
    pub header_written: bool,
}

impl OutputFile {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            streams: Vec::new(),
            has_sync_queue: false,
            header_written: false,
        }
    }

    pub fn all_finished(&self) -> bool {
        self.streams.iter().all(|s| s.finished.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_is_monotonic_in_practice() {
        let mut f = Finished::default();
        f.set_encoder_done();
        assert!(f.encoder_done);
        f.set_muxer_done();
        assert!(f.is_finished());
    }

    #[test]
    fn packets_written_is_observable_across_handles() {
        let os = OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy);
        os.record_packet_written();
        os.record_packet_written();
        assert_eq!(os.packets_written(), 2);
    }

    #[test]
    fn sync_queue_gate_requires_sentinel() {
        let mut os = OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy);
        os.sq_idx_encode = 2;
        assert!(!os.ready_for_muxer_done(false));
        assert!(os.ready_for_muxer_done(true));
    }

    #[test]
    fn non_sync_queue_stream_is_always_ready() {
        let os = OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy);
        assert!(os.ready_for_muxer_done(false));
    }
}
