//! FilterGraphEngine collaborator (`fg_transcode_step` / `reap_filters` /
//! `ifilter_sub2video_heartbeat`).
//!
//! `ffmpeg-the-third` exposes `libavfilter` through `filter::Graph`. This
//! module drives it with the same send/receive pump shape used for
//! decoders and encoders elsewhere in this crate, but pushing/pulling
//! buffersrc/buffersink pads instead of a decoder or encoder context
//! directly.

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::FilterGraphEngine;
use transcoder_core::error::CoreError;
use transcoder_core::ids::{FileIndex, FilterGraphIndex, StreamId};

use crate::backend::{DecoderHandle, EncoderHandle, FilterGraphState, MediaBackend};

impl MediaBackend {
    /// Builds and parses a filter graph from a libavfilter graph
    /// description, wiring `src_pads`/`sink_pads` labels to the `StreamId`s
    /// the core addresses them by.
    pub fn build_filter_graph(
        &mut self,
        index: FilterGraphIndex,
        spec: &str,
        src_pads: std::collections::HashMap<StreamId, String>,
        sink_pads: std::collections::HashMap<StreamId, String>,
    ) -> anyhow::Result<()> {
        let mut graph = ffmpeg::filter::Graph::new();
        graph.parse(spec)?;
        graph.validate()?;
        self.filters.insert(
            index,
            FilterGraphState {
                graph,
                src_pads,
                sink_pads,
                last_pts: None,
            },
        );
        Ok(())
    }
}

impl FilterGraphEngine for MediaBackend {
    fn transcode_step(&mut self, graph: FilterGraphIndex) -> Result<Option<StreamId>, CoreError> {
        self.reap_filters(graph)?;

        let Some(state) = self.filters.get(&graph) else { return Ok(None) };
        // The safe wrapper doesn't expose per-pad "blocked on this input"
        // queries, so every source pad is reported as wanting more data
        // after a step; the Input Driver pulling a packet it doesn't
        // strictly need is harmless, just not maximally lazy.
        Ok(state.src_pads.keys().next().copied())
    }

    fn reap_filters(&mut self, graph: FilterGraphIndex) -> Result<(), CoreError> {
        let Some(state) = self.filters.get_mut(&graph) else {
            return Err(CoreError::FatalLibrary(format!("filter graph {graph:?} not built")));
        };

        let sinks: Vec<(StreamId, String)> = state
            .sink_pads
            .iter()
            .map(|(s, l)| (*s, l.clone()))
            .collect();

        for (out_stream, label) in sinks {
            let is_audio = matches!(self.encoders.get(&out_stream), Some(EncoderHandle::Audio(_)));
            loop {
                let Some(state) = self.filters.get_mut(&graph) else { break };
                let Some(ctx) = state.graph.get(&label) else { break };

                let pulled = if is_audio {
                    let mut frame = ffmpeg::util::frame::audio::Audio::empty();
                    ctx.sink().frame(&mut frame).map(|()| EncodeInput::Audio(frame))
                } else {
                    let mut frame = ffmpeg::util::frame::video::Video::empty();
                    ctx.sink().frame(&mut frame).map(|()| EncodeInput::Video(frame))
                };

                match pulled {
                    Ok(input) => {
                        let pts = match &input {
                            EncodeInput::Video(f) => f.pts(),
                            EncodeInput::Audio(f) => f.pts(),
                        };
                        if let Some(pts) = pts {
                            state.last_pts = Some(pts);
                        }
                        self.encode_and_mux(out_stream, input)?;
                    }
                    Err(e) if MediaBackend::is_eagain(&e) || matches!(e, ffmpeg::Error::Eof) => break,
                    Err(e) => return Err(CoreError::FatalLibrary(e.to_string())),
                }
            }
        }
        Ok(())
    }

    fn sub2video_heartbeat(&mut self, file: FileIndex, pts: i64) -> Result<(), CoreError> {
        let subtitle_streams: Vec<StreamId> = self
            .decoders
            .iter()
            .filter(|(id, h)| id.file == file && matches!(h, DecoderHandle::Subtitle(_)))
            .map(|(id, _)| *id)
            .collect();

        for stream in subtitle_streams {
            self.push_to_filters(stream, |ctx| {
                let mut frame = ffmpeg::util::frame::video::Video::empty();
                frame.set_pts(Some(pts));
                ctx.source().add(&frame).map_err(|e| e.to_string())
            })?;
        }
        Ok(())
    }
}

pub(crate) enum EncodeInput {
    Video(ffmpeg::util::frame::video::Video),
    Audio(ffmpeg::util::frame::audio::Audio),
}

impl MediaBackend {
    /// Encodes one filtered frame and writes the resulting packet(s) to the
    /// muxer, the same send/receive/rescale/write sequence `encode.rs`'s
    /// `run_encode` runs for its video and audio streams.
    fn encode_and_mux(&mut self, out_stream: StreamId, input: EncodeInput) -> Result<(), CoreError> {
        let muxer_index = *self
            .output_stream_index
            .get(&out_stream)
            .ok_or_else(|| CoreError::FatalLibrary(format!("{out_stream} has no muxer stream")))?;

        let (enc_tb, packets) = match (self.encoders.get_mut(&out_stream), input) {
            (Some(EncoderHandle::Video(enc)), EncodeInput::Video(frame)) => {
                enc.send_frame(&frame)
                    .map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
                let mut out = Vec::new();
                let mut pkt = ffmpeg::Packet::empty();
                while enc.receive_packet(&mut pkt).is_ok() {
                    out.push(pkt);
                    pkt = ffmpeg::Packet::empty();
                }
                (enc.time_base(), out)
            }
            (Some(EncoderHandle::Audio(enc)), EncodeInput::Audio(frame)) => {
                enc.send_frame(&frame)
                    .map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
                let mut out = Vec::new();
                let mut pkt = ffmpeg::Packet::empty();
                while enc.receive_packet(&mut pkt).is_ok() {
                    out.push(pkt);
                    pkt = ffmpeg::Packet::empty();
                }
                (enc.time_base(), out)
            }
            _ => return Err(CoreError::FatalLibrary(format!("{out_stream} encoder/frame kind mismatch"))),
        };

        let octx = self
            .outputs
            .get_mut(&out_stream.file)
            .ok_or_else(|| CoreError::FatalLibrary(format!("output file {:?} not open", out_stream.file)))?;
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
