//! Trait boundary to the external collaborators the scheduler drives:
//! demuxing, decoding, filtering, encoding, muxing, subtitles, hardware
//! device setup, and the network stack.
//!
//! The core schedules; it never demuxes, decodes, filters, encodes, or
//! muxes a single byte itself. Every one of those jobs is a trait here,
//! implemented for real by `transcoder-media` and by hand-written fakes in
//! this crate's unit tests.

use crate::error::CoreError;
use crate::ids::{FileIndex, FilterGraphIndex, StreamId};
use crate::packet::{PacketMeta, PullOutcome};
use crate::subtitle::Subtitle;

/// `ifile_get_packet`: pulls exactly one packet from an input file.
pub trait Demuxer {
    fn get_packet(&mut self, file: FileIndex) -> Result<PullOutcome, CoreError>;
}

/// `dec_packet` / `avcodec_flush_buffers`.
pub trait Decoders {
    /// Feeds a packet (or `None` to flush) to the decoder for `stream`.
    /// Returns the number of frames it pushed into downstream filter
    /// graphs or stream-copy sinks.
    fn decode_packet(&mut self, stream: StreamId, pkt: Option<&PacketMeta>) -> Result<usize, CoreError>;

    fn flush(&mut self, stream: StreamId) -> Result<(), CoreError>;
}

/// `fg_transcode_step` / `reap_filters` / `ifilter_sub2video_heartbeat`.
pub trait FilterGraphEngine {
    /// Advances one filter graph. Returns the input stream the graph most
    /// needs unblocked next, or `None` if the graph made progress on its
    /// own (some other OutputStream sharing it may have advanced).
    fn transcode_step(&mut self, graph: FilterGraphIndex) -> Result<Option<StreamId>, CoreError>;

    /// Pushes any frames the graph has ready toward encoders and muxers.
    fn reap_filters(&mut self, graph: FilterGraphIndex) -> Result<(), CoreError>;

    /// Re-injects the last-known subtitle into every subtitle input of
    /// `file` at `pts`, so overlay filters waiting on that input don't
    /// stall.
    fn sub2video_heartbeat(&mut self, file: FileIndex, pts: i64) -> Result<(), CoreError>;
}

/// `of_streamcopy` / `of_output_packet` / `of_write_trailer` / `of_close` /
/// `of_filesize` / `sq_send(SQFRAME(NULL))`.
pub trait Muxer {
    fn streamcopy(&mut self, stream: StreamId, pkt: &PacketMeta) -> Result<(), CoreError>;

    fn output_packet(&mut self, stream: StreamId) -> Result<(), CoreError>;

    fn write_trailer(&mut self, file: FileIndex) -> Result<(), CoreError>;

    fn close(&mut self, file: FileIndex) -> Result<(), CoreError>;

    fn filesize(&self, file: FileIndex) -> u64;

    /// Sends a null-frame sentinel to terminate a sync-queue slot (data
    /// model invariant 5: required before a stream with `sq_idx_encode >=
    /// 0` can be considered muxer-done).
    fn sq_send_eof(&mut self, stream: StreamId, sq_idx: i32) -> Result<(), CoreError>;
}

/// `enc_flush` / `of_enc_stats_close`.
pub trait EncoderPool {
    fn flush(&mut self) -> Result<(), CoreError>;

    fn enc_stats_close(&mut self) -> Result<(), CoreError>;
}

/// `process_subtitle`.
pub trait SubtitleBridge {
    fn process_subtitle(&mut self, stream: StreamId, sub: &Subtitle) -> Result<(), CoreError>;
}

/// `hw_device_free_all`.
pub trait HwDeviceRegistry {
    fn free_all(&mut self);
}

/// `avformat_network_deinit`.
pub trait NetworkStack {
    fn deinit(&mut self);
}
