//! Per-trait borrows of a shared [`MediaBackend`].
//!
//! `Collaborators<'a>` needs eight independent `&'a mut dyn Trait`
//! borrows, but one `MediaBackend` implements all eight traits. Rust's
//! borrow checker won't let eight simultaneous `&mut` references into the
//! same value exist side by side, so each view below holds its own
//! `Rc<RefCell<MediaBackend>>` and takes the `RefCell` borrow only for the
//! duration of a single trait call. None of this is `Send`/`Sync` because
//! the orchestrator drives everything from one thread.

use std::cell::RefCell;
use std::rc::Rc;

use transcoder_core::collab::{
    Decoders, Demuxer, EncoderPool, FilterGraphEngine, HwDeviceRegistry, Muxer, NetworkStack, SubtitleBridge,
};
use transcoder_core::error::CoreError;
use transcoder_core::ids::{FileIndex, FilterGraphIndex, StreamId};
use transcoder_core::packet::PacketMeta;
use transcoder_core::subtitle::Subtitle;

use crate::backend::MediaBackend;

/// Shared handle plus one thin view per collaborator trait, all pointing
/// at the same backend.
pub struct BackendViews {
    pub demuxer: DemuxerView,
    pub decoders: DecodersView,
    pub engine: EngineView,
    pub muxer: MuxerView,
    pub encoders: EncoderPoolView,
    pub subtitles: SubtitleBridgeView,
    pub hw: HwDeviceView,
    pub network: NetworkStackView,
}

impl BackendViews {
    pub fn new(backend: MediaBackend) -> (Rc<RefCell<MediaBackend>>, Self) {
        let shared = Rc::new(RefCell::new(backend));
        let views = Self {
            demuxer: DemuxerView(shared.clone()),
            decoders: DecodersView(shared.clone()),
            engine: EngineView(shared.clone()),
            muxer: MuxerView(shared.clone()),
            encoders: EncoderPoolView(shared.clone()),
            subtitles: SubtitleBridgeView(shared.clone()),
            hw: HwDeviceView(shared.clone()),
            network: NetworkStackView(shared.clone()),
        };
        (shared, views)
    }
}

macro_rules! view {
    ($name:ident) => {
        pub struct $name(pub(crate) Rc<RefCell<MediaBackend>>);
    };
}

view!(DemuxerView);
view!(DecodersView);
view!(EngineView);
view!(MuxerView);
view!(EncoderPoolView);
view!(SubtitleBridgeView);
view!(HwDeviceView);
view!(NetworkStackView);

impl Demuxer for DemuxerView {
    fn get_packet(&mut self, file: FileIndex) -> Result<transcoder_core::packet::PullOutcome, CoreError> {
        self.0.borrow_mut().get_packet(file)
    }
}

impl Decoders for DecodersView {
    fn decode_packet(&mut self, stream: StreamId, pkt: Option<&PacketMeta>) -> Result<usize, CoreError> {
        self.0.borrow_mut().decode_packet(stream, pkt)
    }
    fn flush(&mut self, stream: StreamId) -> Result<(), CoreError> {
        self.0.borrow_mut().flush(stream)
    }
}

impl FilterGraphEngine for EngineView {
    fn transcode_step(&mut self, graph: FilterGraphIndex) -> Result<Option<StreamId>, CoreError> {
        self.0.borrow_mut().transcode_step(graph)
    }
    fn reap_filters(&mut self, graph: FilterGraphIndex) -> Result<(), CoreError> {
        self.0.borrow_mut().reap_filters(graph)
    }
    fn sub2video_heartbeat(&mut self, file: FileIndex, pts: i64) -> Result<(), CoreError> {
        self.0.borrow_mut().sub2video_heartbeat(file, pts)
    }
}

impl Muxer for MuxerView {
    fn streamcopy(&mut self, stream: StreamId, pkt: &PacketMeta) -> Result<(), CoreError> {
        self.0.borrow_mut().streamcopy(stream, pkt)
    }
    fn output_packet(&mut self, stream: StreamId) -> Result<(), CoreError> {
        self.0.borrow_mut().output_packet(stream)
    }
    fn write_trailer(&mut self, file: FileIndex) -> Result<(), CoreError> {
        self.0.borrow_mut().write_trailer(file)
    }
    fn close(&mut self, file: FileIndex) -> Result<(), CoreError> {
        self.0.borrow_mut().close(file)
    }
    fn filesize(&self, file: FileIndex) -> u64 {
        self.0.borrow().filesize(file)
    }
    fn sq_send_eof(&mut self, stream: StreamId, sq_idx: i32) -> Result<(), CoreError> {
        self.0.borrow_mut().sq_send_eof(stream, sq_idx)
    }
}

impl EncoderPool for EncoderPoolView {
    fn flush(&mut self) -> Result<(), CoreError> {
        self.0.borrow_mut().flush()
    }
    fn enc_stats_close(&mut self) -> Result<(), CoreError> {
        self.0.borrow_mut().enc_stats_close()
    }
}

impl SubtitleBridge for SubtitleBridgeView {
    fn process_subtitle(&mut self, stream: StreamId, sub: &Subtitle) -> Result<(), CoreError> {
        self.0.borrow_mut().process_subtitle(stream, sub)
    }
}

impl HwDeviceRegistry for HwDeviceView {
    fn free_all(&mut self) {
        self.0.borrow_mut().free_all()
    }
}

impl NetworkStack for NetworkStackView {
    fn deinit(&mut self) {
        self.0.borrow_mut().deinit()
    }
}
