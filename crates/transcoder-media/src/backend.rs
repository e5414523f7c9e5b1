//! Owns every `ffmpeg-the-third` handle the collaborator traits need.
//!
//! One struct backs all eight traits in `transcoder_core::collab`, the same
//! way a single running ffmpeg process owns its demuxers, decoders, filter
//! graphs, encoders and muxers side by side rather than splitting them into
//! separate services. The orchestrator drives it from a single thread,
//! so nothing here needs to be `Sync`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ffmpeg_the_third as ffmpeg;

use transcoder_core::ids::{FileIndex, FilterGraphIndex, StreamId};

pub(crate) enum DecoderHandle {
    Video(ffmpeg::decoder::video::Video),
    Audio(ffmpeg::decoder::audio::Audio),
    /// Subtitle decoding has no safe wrapper in this version of
    /// ffmpeg-the-third, so the context is kept as a raw pointer and
    /// driven through `avcodec_decode_subtitle2` in `decoders.rs`.
    Subtitle(ffmpeg::codec::context::Context),
}

pub(crate) enum EncoderHandle {
    Video(ffmpeg::encoder::video::Video),
    Audio(ffmpeg::encoder::audio::Audio),
}

/// One filter graph's real ffmpeg state plus the pad-label wiring the core
/// only knows by `StreamId`.
pub(crate) struct FilterGraphState {
    pub graph: ffmpeg::filter::Graph,
    /// `StreamId` of every buffersrc pad feeding this graph, keyed by the
    /// pad label used when the graph was parsed.
    pub src_pads: HashMap<StreamId, String>,
    /// `StreamId` of every OutputStream reading from this graph, keyed by
    /// the buffersink pad label.
    pub sink_pads: HashMap<StreamId, String>,
    pub last_pts: Option<i64>,
}

#[derive(Default)]
pub struct MediaBackend {
    pub(crate) inputs: HashMap<FileIndex, ffmpeg::format::context::Input>,
    pub(crate) outputs: HashMap<FileIndex, ffmpeg::format::context::Output>,
    pub(crate) output_paths: HashMap<FileIndex, PathBuf>,
    pub(crate) decoders: HashMap<StreamId, DecoderHandle>,
    pub(crate) encoders: HashMap<StreamId, EncoderHandle>,
    pub(crate) filters: HashMap<FilterGraphIndex, FilterGraphState>,
    /// Packet most recently pulled by `get_packet` for a given stream,
    /// consumed by the next `decode_packet`/`streamcopy` call. The core
    /// only carries timing metadata between the two; the payload stays
    /// here, kept across the two calls.
    pub(crate) pending_packets: HashMap<StreamId, ffmpeg::Packet>,
    /// Which filter graphs a decoded input stream feeds.
    pub(crate) filter_inputs: HashMap<StreamId, Vec<FilterGraphIndex>>,
    /// Which output streams stream-copy a given input stream's packets.
    pub(crate) copy_consumers: HashMap<StreamId, Vec<StreamId>>,
    /// `StreamId` -> index of the muxer stream within its `OutputFile`.
    pub(crate) output_stream_index: HashMap<StreamId, usize>,
    /// `StreamId` of the input feeding a given encoded output, for encoders
    /// that need the input's time base to rescale.
    pub(crate) output_source: HashMap<StreamId, StreamId>,
    pub(crate) decode_errors: HashMap<StreamId, u64>,
}

impl MediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_input(&mut self, file: FileIndex, path: &Path) -> anyhow::Result<()> {
        let ictx = ffmpeg::format::input(path)?;
        self.inputs.insert(file, ictx);
        Ok(())
    }

    pub fn open_output(&mut self, file: FileIndex, path: &Path) -> anyhow::Result<()> {
        let octx = ffmpeg::format::output(path)?;
        self.outputs.insert(file, octx);
        self.output_paths.insert(file, path.to_path_buf());
        Ok(())
    }

    /// Opens a decoder for `stream` using the codec parameters already on
    /// the demuxed stream, the way `decode.rs`'s `LiveDecoder::open` builds
    /// a decoder from a second `Input` context to avoid borrowing `ictx`
    /// twice at once.
    pub fn open_decoder(&mut self, stream: StreamId) -> anyhow::Result<()> {
        let ictx = self
            .inputs
            .get(&stream.file)
            .ok_or_else(|| anyhow::anyhow!("input file {:?} not open", stream.file))?;
        let av_stream = ictx
            .stream(stream.stream.0)
            .ok_or_else(|| anyhow::anyhow!("no stream {stream}"))?;
        let params = av_stream.parameters();
        let media_type = params.medium();
        let ctx = ffmpeg::codec::context::Context::from_parameters(params)?;

        let handle = match media_type {
            ffmpeg::media::Type::Video => DecoderHandle::Video(ctx.decoder().video()?),
            ffmpeg::media::Type::Audio => DecoderHandle::Audio(ctx.decoder().audio()?),
            ffmpeg::media::Type::Subtitle => DecoderHandle::Subtitle(ctx),
            other => anyhow::bail!("unsupported media type for decode: {other:?}"),
        };
        self.decoders.insert(stream, handle);
        Ok(())
    }

    pub fn wire_decode_to_filter(&mut self, input: StreamId, graph: FilterGraphIndex) {
        self.filter_inputs.entry(input).or_default().push(graph);
    }

    pub fn wire_streamcopy(&mut self, input: StreamId, output: StreamId) {
        self.copy_consumers.entry(input).or_default().push(output);
    }

    pub fn wire_output_stream(&mut self, output: StreamId, muxer_index: usize, source: StreamId) {
        self.output_stream_index.insert(output, muxer_index);
        self.output_source.insert(output, source);
    }

    pub(crate) fn is_eagain(err: &ffmpeg::Error) -> bool {
        matches!(err, ffmpeg::Error::Other { errno } if *errno == ffmpeg::ffi::EAGAIN)
    }

    /// Forwards a frame to every filter graph `stream` feeds, via whatever
    /// closure the caller wants run against each graph's buffersrc pad.
    pub(crate) fn push_to_filters<F>(
        &mut self,
        stream: StreamId,
        mut push: F,
    ) -> Result<(), transcoder_core::error::CoreError>
    where
        F: FnMut(ffmpeg::filter::Context) -> Result<(), String>,
    {
        let Some(graphs) = self.filter_inputs.get(&stream).cloned() else {
            return Ok(());
        };
        for graph_idx in graphs {
            let Some(state) = self.filters.get_mut(&graph_idx) else { continue };
            let Some(label) = state.src_pads.get(&stream) else { continue };
            let Some(ctx) = state.graph.get(label) else { continue };
            push(ctx).map_err(transcoder_core::error::CoreError::FatalLibrary)?;
        }
        Ok(())
    }
}
