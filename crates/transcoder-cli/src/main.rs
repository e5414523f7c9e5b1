//! Binary entry point: parses the command line, wires one input file into
//! one output file through `transcoder-media`, and runs the scheduler.

mod cli;

use std::fs::File;
use std::io::{self, IsTerminal, Write};

use anyhow::Context;
use clap::Parser;

use transcoder_core::config::Config;
use transcoder_core::error::{err_merge, CoreError};
use transcoder_core::filter::FilterGraph;
use transcoder_core::ids::{FileIndex, FilterGraphIndex, StreamId};
use transcoder_core::input::{InputFile, InputStream};
use transcoder_core::output::{OutputFile, OutputKind, OutputStream};
use transcoder_core::scheduler::{Collaborators, Orchestrator};

use transcoder_media::views::BackendViews;
use transcoder_media::MediaBackend;

use cli::{Cli, CodecMode};

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(loglevel_to_filter(args.loglevel))
        .with_writer(io::stderr)
        .init();

    let config = build_config(&args);

    let mut backend = MediaBackend::new();
    backend
        .open_input(FileIndex(0), &args.input)
        .with_context(|| format!("opening input {}", args.input.display()))?;
    backend
        .open_output(FileIndex(0), &args.output)
        .with_context(|| format!("opening output {}", args.output.display()))?;

    let mut input_file = InputFile::new(0);
    let mut output_file = OutputFile::new(0);
    let mut filter_graphs: Vec<FilterGraph> = Vec::new();

    let stream_count = backend.input_stream_count(FileIndex(0))?;
    for i in 0..stream_count {
        let in_id = StreamId::new(0, i);
        let medium = backend.stream_medium(in_id)?;
        let mut in_stream = InputStream::new(in_id);

        match medium {
            ffmpeg_the_third::media::Type::Video => {
                wire_video(&args, &mut backend, &mut in_stream, &mut output_file, &mut filter_graphs, in_id)?;
            }
            ffmpeg_the_third::media::Type::Audio => {
                wire_audio(&args, &mut backend, &mut in_stream, &mut output_file, &mut filter_graphs, in_id)?;
            }
            other => {
                // This binary only maps audio/video tracks through to the
                // output; subtitle/data/attachment streams are left
                // demuxed but discarded, same as never opening a decoder
                // or stream-copy consumer for them.
                tracing::debug!("stream {in_id} ({other:?}) not mapped, discarding");
                in_stream.discard = true;
            }
        }

        input_file.streams.push(in_stream);
    }

    if output_file.streams.is_empty() {
        anyhow::bail!("no audio or video streams found in {}", args.input.display());
    }

    backend.write_header(FileIndex(0)).context("writing output header")?;

    let mut orchestrator = Orchestrator::new(config, vec![input_file], vec![output_file], filter_graphs)
        .context("initializing orchestrator")?;
    orchestrator.mark_output_dumped(FileIndex(0));

    let (_shared, mut views) = BackendViews::new(backend);
    let mut collab = Collaborators {
        demuxer: &mut views.demuxer,
        decoders: &mut views.decoders,
        engine: &mut views.engine,
        muxer: &mut views.muxer,
        encoders: &mut views.encoders,
        subtitles: &mut views.subtitles,
        hw: &mut views.hw,
        network: &mut views.network,
    };

    let mut machine_file = match args.progress.as_deref() {
        Some("-") | None => None,
        Some(path) => Some(File::create(path).with_context(|| format!("creating progress sink {path}"))?),
    };
    let mut stdout = io::stdout();

    let run_result = orchestrator.transcode(
        &mut collab,
        &mut stdout,
        machine_file.as_mut().map(|f| f as &mut dyn Write),
    );
    let shutdown_result = orchestrator.shutdown(&mut collab);
    let final_result = err_merge(run_result, shutdown_result);

    let code = CoreError::exit_code(
        final_result.as_ref().err(),
        orchestrator.received_signal(),
        orchestrator.err_rate_exceeded(),
    );
    if let Err(e) = &final_result {
        tracing::error!("transcode failed: {e}");
    }
    std::process::exit(code);
}

fn build_config(args: &Cli) -> Config {
    let mut config = Config::default();
    config.copyts = args.copyts;
    config.start_at_zero = args.start_at_zero;
    config.stats_period_us = args.stats_period_us;
    config.benchmark = args.benchmark;
    config.benchmark_all = args.benchmark_all;
    config.max_error_rate = args.max_error_rate;
    config.progress_sink = args.progress.clone();
    config.xerror = args.xerror;
    config.loglevel = args.loglevel;
    config.interactive = !args.nostdin && io::stdin().is_terminal();
    config
}

fn loglevel_to_filter(level: i32) -> tracing::Level {
    match level {
        i32::MIN..=-1 => tracing::Level::ERROR,
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn wire_video(
    args: &Cli,
    backend: &mut MediaBackend,
    in_stream: &mut InputStream,
    output_file: &mut OutputFile,
    filter_graphs: &mut Vec<FilterGraph>,
    in_id: StreamId,
) -> anyhow::Result<()> {
    let out_idx = output_file.streams.len();
    let out_id = StreamId::new(0, out_idx);

    let kind = match args.video_codec {
        CodecMode::Copy => {
            backend.add_streamcopy_output(out_id, FileIndex(0), in_id)?;
            in_stream.copy_consumers.push(out_id);
            OutputKind::StreamCopy
        }
        CodecMode::Encode => {
            backend.open_decoder(in_id)?;
            in_stream.decoder_open = true;
            in_stream.decoding_needed = true;

            let (width, height, fps) = backend.video_decoder_dims(in_id)?;
            backend.add_video_encoder(out_id, FileIndex(0), width, height, fps, &args.crf, &args.preset)?;

            let fg_idx = FilterGraphIndex(filter_graphs.len());
            backend.add_passthrough_video_filter(fg_idx, in_id, out_id, width, height, fps)?;
            in_stream.filter_inputs.push(fg_idx);
            filter_graphs.push(FilterGraph::new(fg_idx, true));

            OutputKind::Encoded {
                filter_output: Some(fg_idx),
            }
        }
    };

    let mut out_stream = OutputStream::new(out_id, Some(in_id), kind);
    out_stream.initialized = true;
    output_file.streams.push(out_stream);
    Ok(())
}

fn wire_audio(
    args: &Cli,
    backend: &mut MediaBackend,
    in_stream: &mut InputStream,
    output_file: &mut OutputFile,
    filter_graphs: &mut Vec<FilterGraph>,
    in_id: StreamId,
) -> anyhow::Result<()> {
    let out_idx = output_file.streams.len();
    let out_id = StreamId::new(0, out_idx);

    let kind = match args.audio_codec {
        CodecMode::Copy => {
            backend.add_streamcopy_output(out_id, FileIndex(0), in_id)?;
            in_stream.copy_consumers.push(out_id);
            OutputKind::StreamCopy
        }
        CodecMode::Encode => {
            backend.open_decoder(in_id)?;
            in_stream.decoder_open = true;
            in_stream.decoding_needed = true;

            let sample_rate = backend.audio_decoder_rate(in_id)?;
            backend.add_audio_encoder(out_id, FileIndex(0), sample_rate, args.audio_bitrate)?;

            let fg_idx = FilterGraphIndex(filter_graphs.len());
            backend.add_passthrough_audio_filter(fg_idx, in_id, out_id, sample_rate)?;
            in_stream.filter_inputs.push(fg_idx);
            filter_graphs.push(FilterGraph::new(fg_idx, true));

            OutputKind::Encoded {
                filter_output: Some(fg_idx),
            }
        }
    };

    let mut out_stream = OutputStream::new(out_id, Some(in_id), kind);
    out_stream.initialized = true;
    output_file.streams.push(out_stream);
    Ok(())
}
