//! Pipeline construction: opening decoders/encoders and wiring streams to
//! filter graphs and muxer slots. None of this is part of the collaborator
//! trait surface — `transcoder-cli` calls these directly while building an
//! `Orchestrator`, the way `run_encode` in `encode.rs` builds its two
//! streams and their codec contexts before the packet loop starts.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::encoder;
use ffmpeg::format::Pixel;
use ffmpeg::util::rational::Rational;

use transcoder_core::ids::{FileIndex, FilterGraphIndex, StreamId};

use crate::backend::{DecoderHandle, EncoderHandle, MediaBackend};

impl MediaBackend {
    /// Number of demuxed streams in an open input file.
    pub fn input_stream_count(&self, file: FileIndex) -> anyhow::Result<usize> {
        let ictx = self
            .inputs
            .get(&file)
            .ok_or_else(|| anyhow::anyhow!("input file {file:?} not open"))?;
        Ok(ictx.streams().count())
    }

    /// Media type (`Video`/`Audio`/`Subtitle`/...) of one input stream,
    /// read straight off its codec parameters without opening a decoder.
    pub fn stream_medium(&self, stream: StreamId) -> anyhow::Result<ffmpeg::media::Type> {
        let ictx = self
            .inputs
            .get(&stream.file)
            .ok_or_else(|| anyhow::anyhow!("input file {:?} not open", stream.file))?;
        let av_stream = ictx
            .stream(stream.stream.0)
            .ok_or_else(|| anyhow::anyhow!("no stream {stream}"))?;
        Ok(av_stream.parameters().medium())
    }

    /// Adds an H.264 video output stream and opens its encoder, mirroring
    /// `run_encode`'s video-stream setup: a codec context built
    /// independently of the `Stream` (no `.codec()` accessor exists), then
    /// its parameters copied back onto the muxer stream via
    /// `avcodec_parameters_from_context`.
    pub fn add_video_encoder(
        &mut self,
        stream: StreamId,
        file: FileIndex,
        width: u32,
        height: u32,
        fps: u32,
        crf: &str,
        preset: &str,
    ) -> anyhow::Result<usize> {
        let octx = self
            .outputs
            .get_mut(&file)
            .ok_or_else(|| anyhow::anyhow!("output file {file:?} not open"))?;

        let tb = Rational::new(1, fps as i32);
        let h264 = encoder::find(CodecId::H264).ok_or_else(|| anyhow::anyhow!("H.264 encoder not found"))?;

        let mut ost = octx.add_stream(h264)?;
        ost.set_time_base(tb);
        let muxer_index = ost.index();

        let enc_ctx = codec::context::Context::new_with_codec(h264);
        let mut enc = enc_ctx.encoder().video()?;
        enc.set_width(width);
        enc.set_height(height);
        enc.set_format(Pixel::YUV420P);
        enc.set_time_base(tb);
        enc.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        enc.set_bit_rate(0);

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("crf", crf);
        opts.set("preset", preset);
        let opened = enc.open_as_with(h264, opts)?;

        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(muxer_index)).codecpar,
                opened.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                anyhow::bail!("avcodec_parameters_from_context (video): {ret}");
            }
        }

        self.encoders.insert(stream, EncoderHandle::Video(opened));
        self.output_stream_index.insert(stream, muxer_index);
        Ok(muxer_index)
    }

    /// Adds an AAC audio output stream and opens its encoder, mirroring
    /// `run_encode`'s audio-stream setup.
    pub fn add_audio_encoder(
        &mut self,
        stream: StreamId,
        file: FileIndex,
        sample_rate: i32,
        bit_rate: usize,
    ) -> anyhow::Result<usize> {
        use ffmpeg::format::sample::Type as SampleType;
        use ffmpeg::format::Sample;
        use ffmpeg::util::channel_layout::ChannelLayout;

        let octx = self
            .outputs
            .get_mut(&file)
            .ok_or_else(|| anyhow::anyhow!("output file {file:?} not open"))?;

        let tb = Rational::new(1, sample_rate);
        let aac = encoder::find(CodecId::AAC).ok_or_else(|| anyhow::anyhow!("AAC encoder not found"))?;

        let mut ost = octx.add_stream(aac)?;
        ost.set_time_base(tb);
        let muxer_index = ost.index();

        let enc_ctx = codec::context::Context::new_with_codec(aac);
        let mut enc = enc_ctx.encoder().audio()?;
        enc.set_rate(sample_rate);
        enc.set_ch_layout(ChannelLayout::STEREO);
        enc.set_format(Sample::F32(SampleType::Planar));
        enc.set_bit_rate(bit_rate);
        let opened = enc.open_as_with(aac, ffmpeg::Dictionary::new())?;

        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(muxer_index)).codecpar,
                opened.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                anyhow::bail!("avcodec_parameters_from_context (audio): {ret}");
            }
        }

        self.encoders.insert(stream, EncoderHandle::Audio(opened));
        self.output_stream_index.insert(stream, muxer_index);
        Ok(muxer_index)
    }

    /// Adds a stream-copy output stream, reusing the input's codec
    /// parameters verbatim (`avcodec_parameters_copy`).
    pub fn add_streamcopy_output(
        &mut self,
        output: StreamId,
        output_file: FileIndex,
        input: StreamId,
    ) -> anyhow::Result<usize> {
        let in_params_ptr = {
            let ictx = self
                .inputs
                .get(&input.file)
                .ok_or_else(|| anyhow::anyhow!("input file {:?} not open", input.file))?;
            let stream = ictx
                .stream(input.stream.0)
                .ok_or_else(|| anyhow::anyhow!("no stream {input}"))?;
            stream.parameters().as_ptr()
        };

        let octx = self
            .outputs
            .get_mut(&output_file)
            .ok_or_else(|| anyhow::anyhow!("output file {output_file:?} not open"))?;

        let codec_id = unsafe { (*in_params_ptr).codec_id };
        let codec = ffmpeg::encoder::find(codec_id.into())
            .ok_or_else(|| anyhow::anyhow!("no encoder registered for copied codec"))?;
        let mut ost = octx.add_stream(codec)?;
        let muxer_index = ost.index();
        unsafe {
            ffmpeg::ffi::avcodec_parameters_copy(
                (**(*octx.as_mut_ptr()).streams.add(muxer_index)).codecpar,
                in_params_ptr,
            );
        }
        ost.set_time_base(Rational::new(1, 1));

        self.output_stream_index.insert(output, muxer_index);
        self.wire_streamcopy(input, output);
        Ok(muxer_index)
    }

    /// Width/height/frame-rate of an already-open video decoder, so a
    /// caller building a re-encode output doesn't have to probe the input
    /// a second time.
    pub fn video_decoder_dims(&self, stream: StreamId) -> anyhow::Result<(u32, u32, u32)> {
        match self.decoders.get(&stream) {
            Some(DecoderHandle::Video(d)) => {
                let fps = d
                    .frame_rate()
                    .map(|r| (r.numerator() / r.denominator().max(1)).max(1) as u32)
                    .unwrap_or(25);
                Ok((d.width(), d.height(), fps))
            }
            _ => anyhow::bail!("stream {stream} is not an open video decoder"),
        }
    }

    /// Sample rate of an already-open audio decoder.
    pub fn audio_decoder_rate(&self, stream: StreamId) -> anyhow::Result<i32> {
        match self.decoders.get(&stream) {
            Some(DecoderHandle::Audio(d)) => Ok(d.rate() as i32),
            _ => anyhow::bail!("stream {stream} is not an open audio decoder"),
        }
    }

    /// Wires a decoded video stream straight through to an encoder via a
    /// one-filter (`null`) libavfilter graph, the minimum buffersrc/
    /// buffersink pair a re-encode needs to ever feed the encoder.
    pub fn add_passthrough_video_filter(
        &mut self,
        index: FilterGraphIndex,
        input: StreamId,
        output: StreamId,
        width: u32,
        height: u32,
        fps: u32,
    ) -> anyhow::Result<()> {
        let spec = format!(
            "buffer=video_size={width}x{height}:pix_fmt=yuv420p:time_base=1/{fps}:pixel_aspect=1/1[in0];[in0]null[out0]"
        );
        let src_pads = std::collections::HashMap::from([(input, "in0".to_string())]);
        let sink_pads = std::collections::HashMap::from([(output, "out0".to_string())]);
        self.build_filter_graph(index, &spec, src_pads, sink_pads)?;
        self.wire_decode_to_filter(input, index);
        Ok(())
    }

    /// Audio counterpart of [`Self::add_passthrough_video_filter`].
    pub fn add_passthrough_audio_filter(
        &mut self,
        index: FilterGraphIndex,
        input: StreamId,
        output: StreamId,
        sample_rate: i32,
    ) -> anyhow::Result<()> {
        let spec = format!(
            "abuffer=sample_rate={sample_rate}:sample_fmt=fltp:channel_layout=stereo:time_base=1/{sample_rate}[in0];[in0]anull[out0]"
        );
        let src_pads = std::collections::HashMap::from([(input, "in0".to_string())]);
        let sink_pads = std::collections::HashMap::from([(output, "out0".to_string())]);
        self.build_filter_graph(index, &spec, src_pads, sink_pads)?;
        self.wire_decode_to_filter(input, index);
        Ok(())
    }

    pub fn write_header(&mut self, file: FileIndex) -> anyhow::Result<()> {
        let octx = self
            .outputs
            .get_mut(&file)
            .ok_or_else(|| anyhow::anyhow!("output file {file:?} not open"))?;
        octx.write_header()?;
        Ok(())
    }
}
