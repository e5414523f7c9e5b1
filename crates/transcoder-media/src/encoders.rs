//! EncoderPool collaborator (`enc_flush` / `of_enc_stats_close`).
//!
//! Per-frame encoding happens inline in `filtergraph.rs`'s `reap_filters`,
//! right where filtered frames become available — this module only owns
//! the end-of-run flush, draining whatever each encoder was still holding
//! (B-frame reorder buffers and the like), the same EOF drain `encode.rs`'s
//! `run_encode` runs once per encoder after its last clip.

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::EncoderPool;
use transcoder_core::error::{err_merge, CoreError};
use transcoder_core::ids::StreamId;

use crate::backend::{EncoderHandle, MediaBackend};

impl EncoderPool for MediaBackend {
    fn flush(&mut self) -> Result<(), CoreError> {
        let streams: Vec<StreamId> = self.encoders.keys().copied().collect();
        let mut result = Ok(());
        for stream in streams {
            result = err_merge(result, self.flush_one(stream));
        }
        result
    }

    fn enc_stats_close(&mut self) -> Result<(), CoreError> {
        // No per-encoder stats file is opened anywhere here; the progress
        // reporter already covers the one stats sink the core cares about.
        Ok(())
    }
}

impl MediaBackend {
    fn flush_one(&mut self, stream: StreamId) -> Result<(), CoreError> {
        let muxer_index = *self
            .output_stream_index
            .get(&stream)
            .ok_or_else(|| CoreError::FatalLibrary(format!("{stream} has no muxer stream")))?;

        let (enc_tb, packets) = match self.encoders.get_mut(&stream) {
            None => return Ok(()),
            Some(EncoderHandle::Video(enc)) => {
                enc.send_eof().map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
                let mut out = Vec::new();
                let mut pkt = ffmpeg::Packet::empty();
                while enc.receive_packet(&mut pkt).is_ok() {
                    out.push(pkt);
                    pkt = ffmpeg::Packet::empty();
                }
                (enc.time_base(), out)
            }
            Some(EncoderHandle::Audio(enc)) => {
                enc.send_eof().map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
                let mut out = Vec::new();
                let mut pkt = ffmpeg::Packet::empty();
                while enc.receive_packet(&mut pkt).is_ok() {
                    out.push(pkt);
                    pkt = ffmpeg::Packet::empty();
                }
                (enc.time_base(), out)
            }
        };

        let octx = self
            .outputs
            .get_mut(&stream.file)
            .ok_or_else(|| CoreError::FatalLibrary(format!("output file {:?} not open", stream.file)))?;
        let ost_tb = octx
            .stream(muxer_index)
            .ok_or_else(|| CoreError::FatalLibrary(format!("muxer stream {muxer_index} missing")))?
            .time_base();

        for mut pkt in packets {
            pkt.set_stream(muxer_index);
            pkt.rescale_ts(enc_tb, ost_tb);
            pkt.write_interleaved(octx)
                .map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
        }
        Ok(())
    }
}
