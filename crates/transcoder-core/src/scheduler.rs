//! Main Driver / main loop, tying every other module together
//! into the `Orchestrator`.
//!
//! Rather than relying on process-wide singletons, this wraps every piece
//! of run state into one `Orchestrator` value owned by the caller and
//! passed by reference. Only the signal counters and the exit flag stay
//! reachable from outside the scheduler thread, because they are written
//! from signal/console-control context.

use std::io::Write as _;
use std::time::{Duration, Instant};

use crate::benchmark::ResourceAccounting;
use crate::cleanup::ExitFlag;
use crate::collab::{Decoders, Demuxer, EncoderPool, FilterGraphEngine, HwDeviceRegistry, Muxer, NetworkStack, SubtitleBridge};
use crate::config::Config;
use crate::error::{err_merge, CoreError};
use crate::filter::FilterGraph;
use crate::ids::{FileIndex, StreamId};
use crate::input::InputFile;
use crate::keys::{self, KeyAction};
use crate::output::{OutputFile, OutputKind};
use crate::progress::{self, ProgressReporter, ProgressSnapshot};
use crate::selector::{self, SelectorOutcome};
use crate::signal::SignalMonitor;
use crate::subtitle;
use crate::terminal::TerminalControl;
use crate::transcode_step::{self, StepOutcome};

/// The set of external collaborators a run needs, borrowed for the
/// duration of [`Orchestrator::transcode`]. `transcoder-media` provides
/// the real, `ffmpeg-the-third`-backed implementations.
pub struct Collaborators<'a> {
    pub demuxer: &'a mut dyn Demuxer,
    pub decoders: &'a mut dyn Decoders,
    pub engine: &'a mut dyn FilterGraphEngine,
    pub muxer: &'a mut dyn Muxer,
    pub encoders: &'a mut dyn EncoderPool,
    pub subtitles: &'a mut dyn SubtitleBridge,
    pub hw: &'a mut dyn HwDeviceRegistry,
    pub network: &'a mut dyn NetworkStack,
}

pub struct Orchestrator {
    pub input_files: Vec<InputFile>,
    pub output_files: Vec<OutputFile>,
    pub filter_graphs: Vec<FilterGraph>,
    pub config: Config,
    signal: SignalMonitor,
    terminal: TerminalControl,
    exited: ExitFlag,
    benchmark: ResourceAccounting,
    progress: ProgressReporter,
    frame_number: u64,
    nb_frames_dup: u64,
    nb_frames_drop: u64,
    err_rate_exceeded: bool,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        input_files: Vec<InputFile>,
        output_files: Vec<OutputFile>,
        filter_graphs: Vec<FilterGraph>,
    ) -> std::io::Result<Self> {
        let interactive = config.interactive;
        Ok(Self {
            progress: ProgressReporter::new(config.stats_period_us, config.copyts),
            signal: SignalMonitor::install()?,
            terminal: TerminalControl::enable(interactive)?,
            exited: ExitFlag::new(),
            benchmark: ResourceAccounting::new(),
            input_files,
            output_files,
            filter_graphs,
            config,
            frame_number: 0,
            nb_frames_dup: 0,
            nb_frames_drop: 0,
            err_rate_exceeded: false,
        })
    }

    pub fn exit_flag(&self) -> ExitFlag {
        self.exited.clone()
    }

    /// Marks `file`'s header as written, signalling that it is open for
    /// writing. Called by the caller right after the muxer collaborator's
    /// header-write call succeeds, before `transcode` is driven.
    pub fn mark_output_dumped(&mut self, file: FileIndex) {
        self.output_files[file.0].header_written = true;
    }

    /// Runs the main loop to completion: polls every input file, dispatches
    /// packets, steps filter graphs, selects and writes the next output
    /// packet, and reports progress, until every input is exhausted.
    pub fn transcode(
        &mut self,
        collab: &mut Collaborators<'_>,
        human_out: &mut dyn std::io::Write,
        mut machine_out: Option<&mut dyn std::io::Write>,
    ) -> Result<(), CoreError> {
        self.config.assert_no_leftover_options()?;
        if self.input_files.is_empty() {
            return Err(CoreError::Configuration("no input files".into()));
        }
        if self.output_files.is_empty() {
            return Err(CoreError::Configuration(
                "at least one output file is required".into(),
            ));
        }

        // Step 1: print the stream map.
        tracing::info!(target: "transcode", "{}", self.format_stream_map());

        // Step 2.
        self.signal.mark_transcode_init_done();

        // Step 3.
        let start = Instant::now();

        let mut loop_err: Option<CoreError> = None;

        'main: loop {
            if self.signal.received_signal() {
                break;
            }

            if self.config.interactive {
                if let Some(c) = keys::poll_key(Duration::from_millis(0)).unwrap_or(None) {
                    if keys::key_to_action(c) == KeyAction::GracefulStop {
                        break;
                    }
                }
            }

            match selector::choose_output(&self.output_files, &self.filter_graphs) {
                SelectorOutcome::Eof => {
                    tracing::info!("no more outputs to process");
                    break;
                }
                SelectorOutcome::RetryAgain => {
                    for f in &mut self.input_files {
                        f.clear_eagain();
                    }
                    for of in &mut self.output_files {
                        for os in &mut of.streams {
                            os.unavailable = false;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(10));
                    continue;
                }
                SelectorOutcome::Stream(id) => {
                    let os = &mut self.output_files[id.file.0].streams[id.stream.0];
                    let mut to_close: Vec<StreamId> = Vec::new();
                    let mut to_advance: Vec<(StreamId, i64, bool)> = Vec::new();
                    let step = transcode_step::transcode_step(
                        collab.engine,
                        collab.demuxer,
                        collab.decoders,
                        collab.muxer,
                        os,
                        &mut self.input_files,
                        |out_id| {
                            to_close.push(out_id);
                            Ok(())
                        },
                        |out_id, dts, is_keyframe| to_advance.push((out_id, dts, is_keyframe)),
                    );
                    match step {
                        Ok(StepOutcome::Advanced) => {
                            self.frame_number += 1;
                        }
                        Ok(StepOutcome::Eof) => {
                            // This output's upstream hit end-of-input; the
                            // selector can only stop re-picking it once it
                            // is actually marked finished.
                            to_close.push(id);
                        }
                        Ok(StepOutcome::Yielded) => {}
                        Err(CoreError::EndOfInput) | Err(CoreError::RetryAgain) => {}
                        Err(e) => {
                            tracing::error!("transcode step failed: {e}");
                            loop_err = Some(e);
                            break 'main;
                        }
                    }

                    for (out_id, dts, is_keyframe) in to_advance {
                        self.output_files[out_id.file.0].streams[out_id.stream.0].advance_mux_dts(dts);
                        if is_keyframe {
                            self.run_sub_duration_heartbeat(out_id, dts, collab.subtitles);
                        }
                    }
                    for out_id in to_close {
                        if let Err(e) = self.finish_output(out_id, collab.muxer) {
                            tracing::error!("closing output {out_id} failed: {e}");
                            loop_err = Some(e);
                            break 'main;
                        }
                    }
                }
            }

            let now_us = start.elapsed().as_micros() as i64;
            let all_dumped = self.output_files.iter().all(|f| f.header_written);
            if self.progress.should_emit_periodic(now_us, all_dumped) {
                self.emit_progress(now_us, false, &*collab.muxer, human_out, machine_out.as_deref_mut())?;
            }
        }

        // Step 5: flush every decoder whose file never reached EOF.
        for f in &mut self.input_files {
            if f.eof_reached {
                continue;
            }
            for s in &mut f.streams {
                let _ = crate::input_driver::process_input_packet(
                    collab.decoders,
                    collab.muxer,
                    s,
                    None,
                    false,
                    |_| Ok(()),
                    |_, _, _| {},
                );
            }
        }

        // Step 6: decode error rate gate.
        for f in &self.input_files {
            for s in &f.streams {
                if s.decode_error_rate() > self.config.max_error_rate {
                    self.err_rate_exceeded = true;
                    tracing::error!(
                        "decode error rate {:.3} exceeds maximum {:.3}",
                        s.decode_error_rate(),
                        self.config.max_error_rate
                    );
                }
            }
        }

        // Step 7: enc_flush.
        let mut result = collab.encoders.flush();

        // Step 8: restore terminal.
        let _ = self.terminal.restore();

        // Step 9: write trailers, folding per-file errors.
        for of in &self.output_files {
            let r = collab.muxer.write_trailer(FileIndex(of.index));
            result = err_merge(result, r);
        }

        // The loop's own fatal error (if any) is the first hard failure
        // and takes precedence over anything surfaced during trailer
        // writes.
        let final_result = match loop_err {
            Some(e) => Err(e),
            None => result,
        };

        // Step 10: final report, always emitted even on failure.
        let now_us = start.elapsed().as_micros() as i64;
        let _ = self.emit_progress(now_us, true, &*collab.muxer, human_out, machine_out.as_deref_mut());

        if self.config.xerror {
            if let Err(ref e) = final_result {
                tracing::error!("xerror escalation: {e}");
            }
        }

        final_result
    }

    /// Ordered teardown: filter graphs, output files (closes
    /// muxers), input files, stats files, hardware device registry,
    /// network subsystem. Safe to call regardless of how far `transcode`
    /// progressed, and idempotent — each collaborator call is expected to
    /// no-op on an already-closed resource.
    pub fn shutdown(&mut self, collab: &mut Collaborators<'_>) -> Result<(), CoreError> {
        let mut result: Result<(), CoreError> = Ok(());
        for of in &self.output_files {
            let r = collab.muxer.close(FileIndex(of.index));
            result = err_merge(result, r);
        }
        collab.hw.free_all();
        collab.network.deinit();
        self.exited.set();
        result
    }

    /// Marks an OutputStream done: encoder side first, then muxer side
    /// once invariant 5's sync-queue sentinel (if any) has gone out.
    /// Idempotent — safe to call on an already-finished stream.
    fn finish_output(&mut self, id: StreamId, muxer: &mut dyn Muxer) -> Result<(), CoreError> {
        let os = &mut self.output_files[id.file.0].streams[id.stream.0];
        if os.finished.is_finished() {
            return Ok(());
        }
        os.finished.set_encoder_done();
        if os.sq_idx_encode >= 0 {
            muxer.sq_send_eof(id, os.sq_idx_encode)?;
        }
        if os.ready_for_muxer_done(true) {
            os.finished.set_muxer_done();
        }
        Ok(())
    }

    /// Re-emits the last subtitle of every other subtitle-sourced Encoded
    /// OutputStream in `triggering`'s file, rescaled to `keyframe_pts`.
    /// A no-op if no sibling has ever recorded a subtitle.
    fn run_sub_duration_heartbeat(&mut self, triggering: StreamId, keyframe_pts: i64, bridge: &mut dyn SubtitleBridge) {
        let streams = &mut self.output_files[triggering.file.0].streams;
        let siblings: Vec<(StreamId, &mut crate::subtitle::HeartbeatState)> = streams
            .iter_mut()
            .filter(|s| matches!(s.kind, OutputKind::Encoded { .. }))
            .map(|s| (s.id, &mut s.heartbeat))
            .collect();
        if siblings.is_empty() {
            return;
        }
        if let Err(e) = subtitle::fix_sub_duration_heartbeat(bridge, triggering, &siblings, keyframe_pts) {
            tracing::warn!("subtitle duration heartbeat failed: {e}");
        }
    }

    fn format_stream_map(&self) -> String {
        let mut out = String::new();
        for of in &self.output_files {
            for os in &of.streams {
                match os.input {
                    Some(input) if matches!(os.kind, crate::output::OutputKind::StreamCopy) => {
                        out.push_str(&format!("  Stream {input} -> {} (copy)\n", os.id));
                    }
                    Some(input) => {
                        out.push_str(&format!("  Stream {input} -> {}\n", os.id));
                    }
                    None => {
                        out.push_str(&format!("  Stream -> {} (attachment)\n", os.id));
                    }
                }
            }
        }
        out
    }

    fn emit_progress(
        &mut self,
        now_us: i64,
        is_final: bool,
        muxer: &dyn Muxer,
        human_out: &mut dyn std::io::Write,
        machine_out: Option<&mut dyn std::io::Write>,
    ) -> Result<(), CoreError> {
        let raw_pts = progress::max_pts(
            self.output_files
                .iter()
                .flat_map(|f| f.streams.iter().map(|s| s.last_mux_dts)),
        )
        .unwrap_or(0);
        let pts = self.progress.adjust_pts(raw_pts);
        let elapsed_secs = now_us as f64 / 1_000_000.0;
        let total_size: u64 = self
            .output_files
            .iter()
            .map(|f| muxer.filesize(FileIndex(f.index)))
            .sum();

        let snapshot = ProgressSnapshot {
            frame: self.frame_number,
            fps: progress::compute_fps(self.frame_number, elapsed_secs),
            stream_quality: self
                .output_files
                .iter()
                .flat_map(|f| f.streams.iter().map(|s| (s.id, s.quality)))
                .collect(),
            total_size,
            out_time_us: pts,
            bitrate: progress::compute_bitrate(total_size, pts),
            dup_frames: self.nb_frames_dup,
            drop_frames: self.nb_frames_drop,
            speed: progress::compute_speed(pts, elapsed_secs),
            is_final,
        };

        progress::emit(human_out, machine_out, &snapshot).map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
        human_out.flush().map_err(|e| CoreError::FatalLibrary(e.to_string()))?;
        Ok(())
    }

    pub fn benchmark_timestamps(&mut self) -> crate::benchmark::BenchmarkTimestamps {
        self.benchmark.timestamps()
    }

    pub fn err_rate_exceeded(&self) -> bool {
        self.err_rate_exceeded
    }

    pub fn received_signal(&self) -> bool {
        self.signal.received_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StreamId;
    use crate::input::InputStream;
    use crate::output::{OutputKind, OutputStream};
    use crate::packet::{PacketMeta, PullOutcome};
    use std::cell::RefCell;

    struct ScriptedDemuxer(RefCell<Vec<PullOutcome>>);
    impl Demuxer for ScriptedDemuxer {
        fn get_packet(&mut self, _f: FileIndex) -> Result<PullOutcome, CoreError> {
            let mut q = self.0.borrow_mut();
            if q.is_empty() {
                Ok(PullOutcome::Eof)
            } else {
                Ok(q.remove(0))
            }
        }
    }
    struct NoopDecoders;
    impl Decoders for NoopDecoders {
        fn decode_packet(&mut self, _s: StreamId, _p: Option<&PacketMeta>) -> Result<usize, CoreError> {
            Ok(0)
        }
        fn flush(&mut self, _s: StreamId) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct NoopEngine;
    impl FilterGraphEngine for NoopEngine {
        fn transcode_step(&mut self, _g: crate::ids::FilterGraphIndex) -> Result<Option<StreamId>, CoreError> {
            Ok(None)
        }
        fn reap_filters(&mut self, _g: crate::ids::FilterGraphIndex) -> Result<(), CoreError> {
            Ok(())
        }
        fn sub2video_heartbeat(&mut self, _f: FileIndex, _pts: i64) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct CountingMuxer {
        copies: RefCell<usize>,
    }
    impl Muxer for CountingMuxer {
        fn streamcopy(&mut self, _s: StreamId, _p: &PacketMeta) -> Result<(), CoreError> {
            *self.copies.borrow_mut() += 1;
            Ok(())
        }
        fn output_packet(&mut self, _s: StreamId) -> Result<(), CoreError> {
            Ok(())
        }
        fn write_trailer(&mut self, _f: FileIndex) -> Result<(), CoreError> {
            Ok(())
        }
        fn close(&mut self, _f: FileIndex) -> Result<(), CoreError> {
            Ok(())
        }
        fn filesize(&self, _f: FileIndex) -> u64 {
            0
        }
        fn sq_send_eof(&mut self, _s: StreamId, _idx: i32) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct NoopEncoders;
    impl EncoderPool for NoopEncoders {
        fn flush(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
        fn enc_stats_close(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct NoopSubtitles;
    impl SubtitleBridge for NoopSubtitles {
        fn process_subtitle(&mut self, _s: StreamId, _sub: &crate::subtitle::Subtitle) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct NoopHw;
    impl HwDeviceRegistry for NoopHw {
        fn free_all(&mut self) {}
    }
    struct NoopNet;
    impl NetworkStack for NoopNet {
        fn deinit(&mut self) {}
    }

    #[test]
    fn stream_copy_scenario_exits_cleanly_with_no_streams_starved() {
        // One input, two stream-copy outputs, no recording-time limit;
        // every demuxed packet lands exactly once.
        let meta = |s| PacketMeta {
            stream: StreamId::new(0, s),
            dts_est: s as i64,
            is_keyframe: true,
        };
        let demuxer_script = vec![
            PullOutcome::Packet(meta(0)),
            PullOutcome::Packet(meta(1)),
            PullOutcome::Packet(meta(0)),
            PullOutcome::Packet(meta(1)),
        ];

        let mut input_file = InputFile::new(0);
        let mut s0 = InputStream::new(StreamId::new(0, 0));
        s0.copy_consumers.push(StreamId::new(0, 0));
        let mut s1 = InputStream::new(StreamId::new(0, 1));
        s1.copy_consumers.push(StreamId::new(0, 1));
        input_file.streams.push(s0);
        input_file.streams.push(s1);

        let mut output_file = OutputFile::new(0);
        let mut o0 = OutputStream::new(StreamId::new(0, 0), Some(StreamId::new(0, 0)), OutputKind::StreamCopy);
        o0.initialized = true;
        let mut o1 = OutputStream::new(StreamId::new(0, 1), Some(StreamId::new(0, 1)), OutputKind::StreamCopy);
        o1.initialized = true;
        output_file.streams.push(o0);
        output_file.streams.push(o1);

        let mut config = Config::default();
        config.interactive = false;
        let mut orch = Orchestrator::new(config, vec![input_file], vec![output_file], vec![]).unwrap();
        orch.mark_output_dumped(FileIndex(0));

        let mut demuxer = ScriptedDemuxer(RefCell::new(demuxer_script));
        let mut decoders = NoopDecoders;
        let mut engine = NoopEngine;
        let mut muxer = CountingMuxer { copies: RefCell::new(0) };
        let mut encoders = NoopEncoders;
        let mut subtitles = NoopSubtitles;
        let mut hw = NoopHw;
        let mut net = NoopNet;
        let mut collab = Collaborators {
            demuxer: &mut demuxer,
            decoders: &mut decoders,
            engine: &mut engine,
            muxer: &mut muxer,
            encoders: &mut encoders,
            subtitles: &mut subtitles,
            hw: &mut hw,
            network: &mut net,
        };

        let mut human = Vec::new();
        let result = orch.transcode(&mut collab, &mut human, None);
        assert!(result.is_ok());
        assert_eq!(*muxer.copies.borrow(), 4);
        assert!(!human.is_empty());
    }

    #[test]
    fn finish_output_is_idempotent_and_reaches_muxer_done() {
        let mut output_file = OutputFile::new(0);
        output_file
            .streams
            .push(OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy));
        let config = Config::default();
        let mut orch = Orchestrator::new(config, vec![], vec![output_file], vec![]).unwrap();
        let mut muxer = CountingMuxer { copies: RefCell::new(0) };

        let id = StreamId::new(0, 0);
        orch.finish_output(id, &mut muxer).unwrap();
        assert!(orch.output_files[0].streams[0].finished.is_finished());

        // Calling again on an already-finished stream must not panic or
        // re-send the sync-queue sentinel.
        orch.finish_output(id, &mut muxer).unwrap();
        assert!(orch.output_files[0].streams[0].finished.is_finished());
    }

    #[test]
    fn keyframe_heartbeat_reaches_encoded_subtitle_siblings() {
        struct CountingSubtitles {
            calls: RefCell<Vec<StreamId>>,
        }
        impl SubtitleBridge for CountingSubtitles {
            fn process_subtitle(&mut self, s: StreamId, _sub: &crate::subtitle::Subtitle) -> Result<(), CoreError> {
                self.calls.borrow_mut().push(s);
                Ok(())
            }
        }

        let mut output_file = OutputFile::new(0);
        output_file
            .streams
            .push(OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy));
        let mut sub_out = OutputStream::new(
            StreamId::new(0, 1),
            None,
            OutputKind::Encoded { filter_output: None },
        );
        sub_out.heartbeat.record(crate::subtitle::Subtitle {
            format: 0,
            pts: 0,
            start_display_time: 0,
            end_display_time: 0,
            rects: vec![],
        });
        output_file.streams.push(sub_out);

        let config = Config::default();
        let mut orch = Orchestrator::new(config, vec![], vec![output_file], vec![]).unwrap();
        let mut subtitles = CountingSubtitles { calls: RefCell::new(vec![]) };

        orch.run_sub_duration_heartbeat(StreamId::new(0, 0), 42, &mut subtitles);
        assert_eq!(*subtitles.calls.borrow(), vec![StreamId::new(0, 1)]);
    }

    #[test]
    fn mark_output_dumped_sets_header_written() {
        let config = Config::default();
        let mut orch = Orchestrator::new(config, vec![], vec![OutputFile::new(0)], vec![]).unwrap();
        assert!(!orch.output_files[0].header_written);
        orch.mark_output_dumped(FileIndex(0));
        assert!(orch.output_files[0].header_written);
    }
}
