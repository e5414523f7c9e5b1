//! Transcode Step: advances one chosen OutputStream's upstream
//! chain by exactly enough to make progress.

use crate::collab::{Decoders, Demuxer, FilterGraphEngine, Muxer};
use crate::error::CoreError;
use crate::ids::StreamId;
use crate::input::InputFile;
use crate::input_driver::{self, PullResult};
use crate::output::{OutputKind, OutputStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    /// No progress this round; some other OutputStream sharing the same
    /// upstream may have been advanced instead.
    Yielded,
    Eof,
}

/// Advances one chosen output stream by one step. `input_files` is
/// indexed by `FileIndex`.
pub fn transcode_step<F, M>(
    engine: &mut dyn FilterGraphEngine,
    demuxer: &mut dyn Demuxer,
    decoders: &mut dyn Decoders,
    muxer: &mut dyn Muxer,
    output: &mut OutputStream,
    input_files: &mut [InputFile],
    mut close_output: F,
    mut record_mux: M,
) -> Result<StepOutcome, CoreError>
where
    F: FnMut(StreamId) -> Result<(), CoreError>,
    M: FnMut(StreamId, i64, bool),
{
    let filter_idx = match &output.kind {
        OutputKind::Encoded {
            filter_output: Some(fg_idx),
        } => Some(*fg_idx),
        _ => None,
    };

    let target_input: Option<StreamId> = match filter_idx {
        Some(fg_idx) => match engine.transcode_step(fg_idx)? {
            Some(needed) => Some(needed),
            None => return Ok(StepOutcome::Yielded),
        },
        None => output.input,
    };

    let target = match target_input {
        Some(t) => t,
        None => return Ok(StepOutcome::Yielded),
    };

    let file = &mut input_files[target.file.0];
    let pull_result = input_driver::pull(demuxer, engine, decoders, muxer, file, &mut close_output, &mut record_mux)?;

    match pull_result {
        PullResult::Dispatched => {
            if let Some(fg_idx) = filter_idx {
                engine.reap_filters(fg_idx)?;
            }
            Ok(StepOutcome::Advanced)
        }
        PullResult::Eof => {
            if let Some(fg_idx) = filter_idx {
                engine.reap_filters(fg_idx)?;
            }
            Ok(StepOutcome::Eof)
        }
        PullResult::RetryAgain => {
            if file.eagain {
                output.unavailable = true;
            }
            Ok(StepOutcome::Yielded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::FileIndex;
    use crate::input::InputStream;
    use crate::packet::{PacketMeta, PullOutcome};
    use std::cell::RefCell;

    struct FakeDemuxer(RefCell<Vec<PullOutcome>>);
    impl Demuxer for FakeDemuxer {
        fn get_packet(&mut self, _f: FileIndex) -> Result<PullOutcome, CoreError> {
            Ok(self.0.borrow_mut().remove(0))
        }
    }
    struct FakeDecoders;
    impl Decoders for FakeDecoders {
        fn decode_packet(&mut self, _s: StreamId, _p: Option<&PacketMeta>) -> Result<usize, CoreError> {
            Ok(1)
        }
        fn flush(&mut self, _s: StreamId) -> Result<(), CoreError> {
            Ok(())
        }
    }
    struct FakeEngine;
    impl FilterGraphEngine for FakeEngine {
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
    struct FakeMuxer;
    impl Muxer for FakeMuxer {
        fn streamcopy(&mut self, _s: StreamId, _p: &PacketMeta) -> Result<(), CoreError> {
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

    #[test]
    fn stream_copy_step_advances_on_packet() {
        let meta = PacketMeta {
            stream: StreamId::new(0, 0),
            dts_est: 0,
            is_keyframe: false,
        };
        let mut demuxer = FakeDemuxer(RefCell::new(vec![PullOutcome::Packet(meta)]));
        let mut decoders = FakeDecoders;
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer;

        let mut input_file = InputFile::new(0);
        input_file.streams.push(InputStream::new(StreamId::new(0, 0)));
        let mut files = vec![input_file];

        let mut output = OutputStream::new(StreamId::new(0, 0), Some(StreamId::new(0, 0)), OutputKind::StreamCopy);

        let outcome = transcode_step(&mut engine, &mut demuxer, &mut decoders, &mut muxer, &mut output, &mut files, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(outcome, StepOutcome::Advanced);
    }

    #[test]
    fn retry_again_with_eagain_marks_output_unavailable() {
        let mut demuxer = FakeDemuxer(RefCell::new(vec![PullOutcome::RetryAgain]));
        let mut decoders = FakeDecoders;
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer;

        let mut input_file = InputFile::new(0);
        input_file.streams.push(InputStream::new(StreamId::new(0, 0)));
        let mut files = vec![input_file];

        let mut output = OutputStream::new(StreamId::new(0, 0), Some(StreamId::new(0, 0)), OutputKind::StreamCopy);

        let outcome = transcode_step(&mut engine, &mut demuxer, &mut decoders, &mut muxer, &mut output, &mut files, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(outcome, StepOutcome::Yielded);
        assert!(output.unavailable);
    }

    #[test]
    fn no_static_input_and_no_filter_yields() {
        let mut demuxer = FakeDemuxer(RefCell::new(vec![]));
        let mut decoders = FakeDecoders;
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer;
        let mut files: Vec<InputFile> = vec![];

        let mut output = OutputStream::new(StreamId::new(0, 0), None, OutputKind::StreamCopy);

        let outcome = transcode_step(&mut engine, &mut demuxer, &mut decoders, &mut muxer, &mut output, &mut files, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(outcome, StepOutcome::Yielded);
    }
}
