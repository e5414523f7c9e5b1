//! SubtitleBridge collaborator (`process_subtitle`).
//!
//! Takes a core-owned, already deep-copied `Subtitle` and pushes it toward
//! whatever filter graph the owning stream feeds. A full
//! `sub2video_update` bitmap blit isn't implemented — this only carries the
//! pts forward, same simplification `filtergraph.rs`'s heartbeat makes.

use ffmpeg_the_third as ffmpeg;

use transcoder_core::collab::SubtitleBridge;
use transcoder_core::error::CoreError;
use transcoder_core::ids::StreamId;
use transcoder_core::subtitle::Subtitle;

use crate::backend::MediaBackend;

impl SubtitleBridge for MediaBackend {
    fn process_subtitle(&mut self, stream: StreamId, sub: &Subtitle) -> Result<(), CoreError> {
        let pts = sub.pts;
        self.push_to_filters(stream, |ctx| {
            let mut frame = ffmpeg::util::frame::video::Video::empty();
            frame.set_pts(Some(pts));
            ctx.source().add(&frame).map_err(|e| e.to_string())
        })
    }
}
