//! Decoders collaborator (`dec_packet` / `avcodec_flush_buffers`).
//!
//! Grounded in `decode.rs`'s `LiveDecoder`: a `send_packet` /
//! `receive_frame` pump per stream. The difference here is that decoded
//! frames don't come back to the caller — they're pushed straight into
//! whichever filter graph(s) this input stream feeds, matching how
//! `ifilter_send_frame` hands a decoded frame to its filter graph in the
//! original scheduler.

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::Decoders;
use transcoder_core::error::CoreError;
use transcoder_core::ids::StreamId;
use transcoder_core::packet::PacketMeta;

use crate::backend::{DecoderHandle, MediaBackend};

impl Decoders for MediaBackend {
    fn decode_packet(&mut self, stream: StreamId, pkt: Option<&PacketMeta>) -> Result<usize, CoreError> {
        let packet = match pkt {
            Some(_) => self.pending_packets.remove(&stream),
            None => None,
        };

        let frames_video;
        let frames_audio;
        let mut subtitle_hit = false;

        match self.decoders.get_mut(&stream) {
            None => return Err(CoreError::FatalLibrary(format!("no decoder open for {stream}"))),
            Some(DecoderHandle::Video(dec)) => {
                let send = match &packet {
                    Some(p) => dec.send_packet(p),
                    None => dec.send_eof(),
                };
                if let Err(e) = send {
                    if MediaBackend::is_eagain(&e) {
                        return Ok(0);
                    }
                    *self.decode_errors.entry(stream).or_insert(0) += 1;
                    return Err(CoreError::DecodeError(stream));
                }
                let mut out = Vec::new();
                let mut frame = ffmpeg::util::frame::video::Video::empty();
                while dec.receive_frame(&mut frame).is_ok() {
                    out.push(frame.clone());
                    frame = ffmpeg::util::frame::video::Video::empty();
                }
                frames_video = out;
                frames_audio = Vec::new();
            }
            Some(DecoderHandle::Audio(dec)) => {
                let send = match &packet {
                    Some(p) => dec.send_packet(p),
                    None => dec.send_eof(),
                };
                if let Err(e) = send {
                    if MediaBackend::is_eagain(&e) {
                        return Ok(0);
                    }
                    *self.decode_errors.entry(stream).or_insert(0) += 1;
                    return Err(CoreError::DecodeError(stream));
                }
                let mut out = Vec::new();
                let mut frame = ffmpeg::util::frame::audio::Audio::empty();
                while dec.receive_frame(&mut frame).is_ok() {
                    out.push(frame.clone());
                    frame = ffmpeg::util::frame::audio::Audio::empty();
                }
                frames_audio = out;
                frames_video = Vec::new();
            }
            Some(DecoderHandle::Subtitle(ctx)) => {
                // No safe `avcodec_decode_subtitle2` wrapper exists; drive it
                // through FFI directly. Subtitle content reaches filter
                // graphs through the heartbeat bridge, so a successful
                // decode here only needs to report that something arrived.
                frames_video = Vec::new();
                frames_audio = Vec::new();
                if let Some(packet) = &packet {
                    let mut got_sub = 0i32;
                    let mut raw_sub: ffmpeg::ffi::AVSubtitle = unsafe { std::mem::zeroed() };
                    let ret = unsafe {
                        ffmpeg::ffi::avcodec_decode_subtitle2(
                            ctx.as_mut_ptr(),
                            &mut raw_sub,
                            &mut got_sub,
                            packet.as_ptr() as *mut ffmpeg::ffi::AVPacket,
                        )
                    };
                    if ret < 0 {
                        *self.decode_errors.entry(stream).or_insert(0) += 1;
                        return Err(CoreError::DecodeError(stream));
                    }
                    if got_sub != 0 {
                        unsafe { ffmpeg::ffi::avsubtitle_free(&mut raw_sub) };
                        subtitle_hit = true;
                    }
                }
            }
        }

        let mut produced = 0usize;
        for f in &frames_video {
            self.push_to_filters(stream, |ctx| ctx.source().add(f).map_err(|e| e.to_string()))?;
            produced += 1;
        }
        for f in &frames_audio {
            self.push_to_filters(stream, |ctx| ctx.source().add(f).map_err(|e| e.to_string()))?;
            produced += 1;
        }
        if subtitle_hit {
            produced += 1;
        }

        Ok(produced)
    }

    fn flush(&mut self, stream: StreamId) -> Result<(), CoreError> {
        self.decode_packet(stream, None).map(|_| ())
    }
}
