//! Demuxer collaborator (`ifile_get_packet`), grounded in the packet loops
//! already written in `probe.rs`/`encode.rs` (`ictx.packets()`).

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::Demuxer;
use transcoder_core::error::CoreError;
use transcoder_core::ids::{FileIndex, StreamId};
use transcoder_core::packet::{PacketMeta, PullOutcome};

use crate::backend::MediaBackend;

impl Demuxer for MediaBackend {
    fn get_packet(&mut self, file: FileIndex) -> Result<PullOutcome, CoreError> {
        let ictx = self
            .inputs
            .get_mut(&file)
            .ok_or_else(|| CoreError::FatalLibrary(format!("input file {file:?} not open")))?;

        match ictx.packets().next() {
            None => Ok(PullOutcome::Eof),
            Some(Err(ffmpeg::Error::Eof)) => Ok(PullOutcome::Eof),
            Some(Err(e)) if MediaBackend::is_eagain(&e) => Ok(PullOutcome::RetryAgain),
            Some(Err(e)) => Err(CoreError::FatalLibrary(e.to_string())),
            Some(Ok((stream, packet))) => {
                let id = StreamId::new(file.0, stream.index());
                let dts_est = packet.dts().or_else(|| packet.pts()).unwrap_or(0);
                let is_keyframe = packet.is_key();
                self.pending_packets.insert(id, packet);
                Ok(PullOutcome::Packet(PacketMeta {
                    stream: id,
                    dts_est,
                    is_keyframe,
                }))
            }
        }
    }
}
