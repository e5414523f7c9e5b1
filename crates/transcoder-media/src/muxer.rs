//! Muxer collaborator (`of_streamcopy` / `of_output_packet` /
//! `of_write_trailer` / `of_close` / `of_filesize` / sync-queue sentinel).

use transcoder_core::collab::Muxer;
use transcoder_core::error::CoreError;
use transcoder_core::ids::{FileIndex, StreamId};
use transcoder_core::packet::PacketMeta;

use crate::backend::MediaBackend;

impl Muxer for MediaBackend {
    fn streamcopy(&mut self, stream: StreamId, pkt: &PacketMeta) -> Result<(), CoreError> {
        let mut packet = self
            .pending_packets
            .remove(&pkt.stream)
            .ok_or_else(|| CoreError::FatalLibrary(format!("no pending packet for {}", pkt.stream)))?;

        let muxer_index = *self
            .output_stream_index
            .get(&stream)
            .ok_or_else(|| CoreError::FatalLibrary(format!("{stream} has no muxer stream")))?;

        let octx = self
            .outputs
            .get_mut(&stream.file)
            .ok_or_else(|| CoreError::FatalLibrary(format!("output file {:?} not open", stream.file)))?;

        packet.set_stream(muxer_index);
        packet
            .write_interleaved(octx)
            .map_err(|e| CoreError::FatalLibrary(e.to_string()))
    }

    fn output_packet(&mut self, _stream: StreamId) -> Result<(), CoreError> {
        // Encoded streams are written directly from `reap_filters` as soon
        // as a filtered frame produces a packet; there is nothing left
        // pending by the time the scheduler calls this.
        Ok(())
    }

    fn write_trailer(&mut self, file: FileIndex) -> Result<(), CoreError> {
        let octx = self
            .outputs
            .get_mut(&file)
            .ok_or_else(|| CoreError::FatalLibrary(format!("output file {file:?} not open")))?;
        octx.write_trailer().map_err(|e| CoreError::FatalLibrary(e.to_string()))
    }

    fn close(&mut self, file: FileIndex) -> Result<(), CoreError> {
        self.outputs.remove(&file);
        Ok(())
    }

    fn filesize(&self, file: FileIndex) -> u64 {
        self.output_paths
            .get(&file)
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn sq_send_eof(&mut self, _stream: StreamId, _sq_idx: i32) -> Result<(), CoreError> {
        // No sync-queue reordering is implemented; every OutputStream's
        // `sq_idx_encode` stays negative (see `transcoder_core::output`), so
        // the scheduler never actually calls this with a real index.
        Ok(())
    }
}
