//! Input Driver: pulls one packet from an input file and
//! dispatches it.

use crate::collab::{Decoders, Demuxer, FilterGraphEngine, Muxer};
use crate::error::CoreError;
use crate::ids::FileIndex;
use crate::input::{InputFile, InputStream};
use crate::packet::{PacketMeta, PullOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullResult {
    Dispatched,
    RetryAgain,
    Eof,
}

/// `process_input_packet(stream, pkt, no_eof)`:
/// 1. If decoding is needed, hand the packet to the decoder collaborator.
/// 2/3. `duration_exceeded` is precomputed by the caller from the packet's
///    `dts_est` against the file's recording-time limit.
/// 4. Every OutputStream consuming this InputStream raw is either closed
///    (duration exceeded) or forwarded the packet via stream-copy;
///    `record_mux` reports the dts/keyframe flag of whatever was actually
///    muxed back to the caller.
pub fn process_input_packet<F, M>(
    decoders: &mut dyn Decoders,
    muxer: &mut dyn Muxer,
    stream: &mut InputStream,
    pkt: Option<&PacketMeta>,
    duration_exceeded: bool,
    mut close_output: F,
    mut record_mux: M,
) -> Result<(), CoreError>
where
    F: FnMut(crate::ids::StreamId) -> Result<(), CoreError>,
    M: FnMut(crate::ids::StreamId, i64, bool),
{
    if stream.decoding_needed {
        match decoders.decode_packet(stream.id, pkt) {
            Ok(produced) => {
                if pkt.is_some() {
                    stream.frames_decoded += produced as u64;
                }
            }
            Err(CoreError::DecodeError(_)) => {
                stream.decode_errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for &out_id in &stream.copy_consumers {
        if duration_exceeded {
            close_output(out_id)?;
        } else if let Some(p) = pkt {
            muxer.streamcopy(out_id, p)?;
            record_mux(out_id, p.dts_est, p.is_keyframe);
        }
    }

    Ok(())
}

/// Pulls exactly one packet for `file` and dispatches it.
pub fn pull<F, M>(
    demuxer: &mut dyn Demuxer,
    engine: &mut dyn FilterGraphEngine,
    decoders: &mut dyn Decoders,
    muxer: &mut dyn Muxer,
    file: &mut InputFile,
    mut close_output: F,
    mut record_mux: M,
) -> Result<PullResult, CoreError>
where
    F: FnMut(crate::ids::StreamId) -> Result<(), CoreError>,
    M: FnMut(crate::ids::StreamId, i64, bool),
{
    match demuxer.get_packet(FileIndex(file.index))? {
        PullOutcome::RetryAgain => {
            file.eagain = true;
            Ok(PullResult::RetryAgain)
        }
        PullOutcome::LoopRestart => {
            // Looped-input signal: flush every decoder in this file before
            // any new packet from it is dispatched.
            for s in &file.streams {
                decoders.flush(s.id)?;
            }
            Ok(PullResult::RetryAgain)
        }
        PullOutcome::Eof => {
            for s in &mut file.streams {
                if s.discard {
                    continue;
                }
                process_input_packet(decoders, muxer, s, None, false, &mut close_output, &mut record_mux)?;
            }
            for s in &file.streams {
                for &out in &s.copy_consumers {
                    close_output(out)?;
                }
            }
            file.eof_reached = true;
            Ok(PullResult::Eof)
        }
        PullOutcome::Packet(meta) => {
            engine.sub2video_heartbeat(FileIndex(file.index), meta.dts_est)?;
            let duration_exceeded = file.duration_exceeded(meta.dts_est);
            let stream = file
                .streams
                .iter_mut()
                .find(|s| s.id == meta.stream)
                .ok_or_else(|| CoreError::FatalLibrary("packet for unknown stream".into()))?;
            process_input_packet(decoders, muxer, stream, Some(&meta), duration_exceeded, &mut close_output, &mut record_mux)?;
            Ok(PullResult::Dispatched)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StreamId;
    use std::cell::RefCell;

    struct FakeDemuxer {
        outcomes: RefCell<Vec<PullOutcome>>,
    }

    impl Demuxer for FakeDemuxer {
        fn get_packet(&mut self, _file: FileIndex) -> Result<PullOutcome, CoreError> {
            Ok(self.outcomes.borrow_mut().remove(0))
        }
    }

    struct FakeDecoders {
        flushed: RefCell<Vec<StreamId>>,
    }
    impl Decoders for FakeDecoders {
        fn decode_packet(&mut self, _s: StreamId, pkt: Option<&PacketMeta>) -> Result<usize, CoreError> {
            Ok(if pkt.is_some() { 1 } else { 0 })
        }
        fn flush(&mut self, s: StreamId) -> Result<(), CoreError> {
            self.flushed.borrow_mut().push(s);
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

    struct FakeMuxer {
        copied: RefCell<Vec<StreamId>>,
    }
    impl Muxer for FakeMuxer {
        fn streamcopy(&mut self, s: StreamId, _pkt: &PacketMeta) -> Result<(), CoreError> {
            self.copied.borrow_mut().push(s);
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

    fn file_with_one_copy_stream() -> InputFile {
        let mut f = InputFile::new(0);
        let mut s = InputStream::new(StreamId::new(0, 0));
        s.copy_consumers.push(StreamId::new(0, 0));
        f.streams.push(s);
        f
    }

    #[test]
    fn retry_again_marks_eagain() {
        let mut demuxer = FakeDemuxer {
            outcomes: RefCell::new(vec![PullOutcome::RetryAgain]),
        };
        let mut decoders = FakeDecoders { flushed: RefCell::new(vec![]) };
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer { copied: RefCell::new(vec![]) };
        let mut file = file_with_one_copy_stream();

        let r = pull(&mut demuxer, &mut engine, &mut decoders, &mut muxer, &mut file, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(r, PullResult::RetryAgain);
        assert!(file.eagain);
    }

    #[test]
    fn loop_restart_flushes_all_decoders_in_file() {
        let mut demuxer = FakeDemuxer {
            outcomes: RefCell::new(vec![PullOutcome::LoopRestart]),
        };
        let mut decoders = FakeDecoders { flushed: RefCell::new(vec![]) };
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer { copied: RefCell::new(vec![]) };
        let mut file = file_with_one_copy_stream();

        let r = pull(&mut demuxer, &mut engine, &mut decoders, &mut muxer, &mut file, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(r, PullResult::RetryAgain);
        assert_eq!(decoders.flushed.borrow().len(), 1);
    }

    #[test]
    fn eof_closes_every_copy_consumer_and_marks_file() {
        let mut demuxer = FakeDemuxer {
            outcomes: RefCell::new(vec![PullOutcome::Eof]),
        };
        let mut decoders = FakeDecoders { flushed: RefCell::new(vec![]) };
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer { copied: RefCell::new(vec![]) };
        let mut file = file_with_one_copy_stream();
        let closed = RefCell::new(vec![]);

        let r = pull(
            &mut demuxer,
            &mut engine,
            &mut decoders,
            &mut muxer,
            &mut file,
            |id| {
                closed.borrow_mut().push(id);
                Ok(())
            },
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(r, PullResult::Eof);
        assert!(file.eof_reached);
        assert_eq!(closed.borrow().len(), 1);
    }

    #[test]
    fn success_forwards_packet_to_copy_consumers() {
        let meta = PacketMeta {
            stream: StreamId::new(0, 0),
            dts_est: 0,
            is_keyframe: false,
        };
        let mut demuxer = FakeDemuxer {
            outcomes: RefCell::new(vec![PullOutcome::Packet(meta)]),
        };
        let mut decoders = FakeDecoders { flushed: RefCell::new(vec![]) };
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer { copied: RefCell::new(vec![]) };
        let mut file = file_with_one_copy_stream();

        let r = pull(&mut demuxer, &mut engine, &mut decoders, &mut muxer, &mut file, |_| Ok(()), |_, _, _| {}).unwrap();
        assert_eq!(r, PullResult::Dispatched);
        assert_eq!(muxer.copied.borrow().len(), 1);
    }

    #[test]
    fn duration_exceeded_closes_instead_of_copying() {
        let meta = PacketMeta {
            stream: StreamId::new(0, 0),
            dts_est: 10,
            is_keyframe: false,
        };
        let mut demuxer = FakeDemuxer {
            outcomes: RefCell::new(vec![PullOutcome::Packet(meta)]),
        };
        let mut decoders = FakeDecoders { flushed: RefCell::new(vec![]) };
        let mut engine = FakeEngine;
        let mut muxer = FakeMuxer { copied: RefCell::new(vec![]) };
        let mut file = file_with_one_copy_stream();
        file.recording_time = Some(0);
        let closed = RefCell::new(vec![]);

        pull(
            &mut demuxer,
            &mut engine,
            &mut decoders,
            &mut muxer,
            &mut file,
            |id| {
                closed.borrow_mut().push(id);
                Ok(())
            },
            |_, _, _| {},
        )
        .unwrap();

        assert_eq!(closed.borrow().len(), 1);
        assert!(muxer.copied.borrow().is_empty());
    }
}
