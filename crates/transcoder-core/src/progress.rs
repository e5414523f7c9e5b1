//! Progress Reporter.

use crate::ids::StreamId;

/// Drives the two emission triggers (periodic + final) and the `copy_ts`
/// pts rebasing latch. Pure computation lives in the free functions below
/// so it can be unit- and doc-tested without any collaborator.
pub struct ProgressReporter {
    stats_period_us: i64,
    last_emit_us: Option<i64>,
    copy_ts: bool,
    copy_ts_first_pts: Option<i64>,
}

impl ProgressReporter {
    pub fn new(stats_period_us: i64, copy_ts: bool) -> Self {
        Self {
            stats_period_us,
            last_emit_us: None,
            copy_ts,
            copy_ts_first_pts: None,
        }
    }

    /// Whether a periodic (non-final) report should fire at `now_us`.
    /// Suppressed until every output file has been "dumped".
    pub fn should_emit_periodic(&mut self, now_us: i64, all_outputs_dumped: bool) -> bool {
        if !all_outputs_dumped {
            return false;
        }
        match self.last_emit_us {
            None => {
                self.last_emit_us = Some(now_us);
                true
            }
            Some(last) if now_us - last >= self.stats_period_us => {
                self.last_emit_us = Some(now_us);
                true
            }
            Some(_) => false,
        }
    }

    /// Rebases `raw_pts` under `-copyts`: the first pts observed above 1 is
    /// latched as `copy_ts_first_pts` and subtracted from every report
    /// thereafter. Once assigned, immutable for the run.
    pub fn adjust_pts(&mut self, raw_pts: i64) -> i64 {
        if !self.copy_ts {
            return raw_pts;
        }
        if self.copy_ts_first_pts.is_none() && raw_pts > 1 {
            self.copy_ts_first_pts = Some(raw_pts);
        }
        raw_pts - self.copy_ts_first_pts.unwrap_or(0)
    }

    pub fn copy_ts_first_pts(&self) -> Option<i64> {
        self.copy_ts_first_pts
    }
}

/// `pts = max(last_mux_dts)` across OutputStreams, ignoring streams with no
/// known dts yet (`i64::MIN` sentinel).
pub fn max_pts<I: IntoIterator<Item = i64>>(dts_values: I) -> Option<i64> {
    dts_values.into_iter().filter(|&p| p != i64::MIN).max()
}

/// `speed = (pts / 1e6) / elapsed_seconds`; negative sentinel if elapsed
/// time is not yet meaningfully positive.
///
/// ```
/// use transcoder_core::progress::compute_speed;
/// assert!((compute_speed(2_000_000, 2.0) - 1.0).abs() < 1e-9);
/// assert_eq!(compute_speed(1_000_000, 0.0), -1.0);
/// ```
pub fn compute_speed(pts_us: i64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        -1.0
    } else {
        (pts_us as f64 / 1_000_000.0) / elapsed_secs
    }
}

/// `bitrate = total_size * 8 / pts_ms`; negative sentinel if pts is not
/// positive.
///
/// ```
/// use transcoder_core::progress::compute_bitrate;
/// assert!((compute_bitrate(125_000, 1_000_000) - 1000.0).abs() < 1e-6);
/// assert_eq!(compute_bitrate(1, 0), -1.0);
/// ```
pub fn compute_bitrate(total_size: u64, pts_us: i64) -> f64 {
    let pts_ms = pts_us as f64 / 1000.0;
    if pts_ms <= 0.0 {
        -1.0
    } else {
        (total_size as f64 * 8.0) / pts_ms
    }
}

/// `fps = frame_number / elapsed` once elapsed exceeds one second, else 0.
pub fn compute_fps(frame_number: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 1.0 {
        frame_number as f64 / elapsed_secs
    } else {
        0.0
    }
}

fn format_out_time(us: i64) -> String {
    let us = us.max(0);
    let total_ms = us / 1000;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let sec = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{h:02}:{m:02}:{sec:02}.{ms:03}")
}

/// Everything needed to render one report, already computed.
pub struct ProgressSnapshot {
    pub frame: u64,
    pub fps: f64,
    pub stream_quality: Vec<(StreamId, f64)>,
    pub total_size: u64,
    pub out_time_us: i64,
    pub bitrate: f64,
    pub dup_frames: u64,
    pub drop_frames: u64,
    pub speed: f64,
    pub is_final: bool,
}

/// The human-readable stderr line, `\r`-terminated except on the final
/// call where it ends in `\n`.
pub fn render_human(s: &ProgressSnapshot) -> String {
    let mut quality = String::new();
    for (i, (_, q)) in s.stream_quality.iter().enumerate() {
        if i > 0 {
            quality.push(',');
        }
        quality.push_str(&format!("{q:.1}"));
    }
    let mut line = format!(
        "frame={:6} fps={:3.0} q={quality} size={:>8}kB time={} bitrate={:7.1}kbits/s dup={} drop={} speed={:4.3}x",
        s.frame,
        s.fps,
        s.total_size / 1024,
        format_out_time(s.out_time_us),
        s.bitrate,
        s.dup_frames,
        s.drop_frames,
        s.speed,
    );
    line.push(if s.is_final { '\n' } else { '\r' });
    line
}

/// The machine-parseable `key=value` record, one key per line, ending in
/// `progress=continue` or `progress=end`.
pub fn render_machine(s: &ProgressSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("frame={}\n", s.frame));
    out.push_str(&format!("fps={:.2}\n", s.fps));
    for (id, q) in &s.stream_quality {
        out.push_str(&format!("stream_{}_{}_q={:.1}\n", id.file.0, id.stream.0, q));
    }
    out.push_str(&format!("bitrate={:.1}kbits/s\n", s.bitrate));
    out.push_str(&format!("total_size={}\n", s.total_size));
    out.push_str(&format!("out_time_us={}\n", s.out_time_us));
    out.push_str(&format!("out_time_ms={}\n", s.out_time_us / 1000));
    out.push_str(&format!("out_time={}\n", format_out_time(s.out_time_us)));
    out.push_str(&format!("dup_frames={}\n", s.dup_frames));
    out.push_str(&format!("drop_frames={}\n", s.drop_frames));
    out.push_str(&format!("speed={:.3}x\n", s.speed));
    out.push_str(if s.is_final { "progress=end\n" } else { "progress=continue\n" });
    out
}

/// Writes the human line and, if a sink is configured, the machine record.
pub fn emit(
    human: &mut dyn std::io::Write,
    machine: Option<&mut dyn std::io::Write>,
    snapshot: &ProgressSnapshot,
) -> std::io::Result<()> {
    human.write_all(render_human(snapshot).as_bytes())?;
    human.flush()?;
    if let Some(w) = machine {
        w.write_all(render_machine(snapshot).as_bytes())?;
        w.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_report_suppressed_until_all_outputs_dumped() {
        let mut r = ProgressReporter::new(500_000, false);
        assert!(!r.should_emit_periodic(0, false));
        assert!(r.should_emit_periodic(0, true));
    }

    #[test]
    fn periodic_report_respects_stats_period() {
        let mut r = ProgressReporter::new(500_000, false);
        assert!(r.should_emit_periodic(0, true));
        assert!(!r.should_emit_periodic(100_000, true));
        assert!(r.should_emit_periodic(500_000, true));
    }

    #[test]
    fn copy_ts_first_pts_is_immutable_once_assigned() {
        let mut r = ProgressReporter::new(500_000, true);
        assert_eq!(r.adjust_pts(100), 0);
        assert_eq!(r.copy_ts_first_pts(), Some(100));
        assert_eq!(r.adjust_pts(150), 50);
        assert_eq!(r.copy_ts_first_pts(), Some(100));
    }

    #[test]
    fn max_pts_ignores_unknown_sentinel() {
        assert_eq!(max_pts(vec![i64::MIN, 5, 9, i64::MIN]), Some(9));
        assert_eq!(max_pts(vec![i64::MIN, i64::MIN]), None);
    }

    #[test]
    fn two_final_reports_are_identical_modulo_timestamp() {
        let snap = |out_time_us| ProgressSnapshot {
            frame: 100,
            fps: 30.0,
            stream_quality: vec![],
            total_size: 2048,
            out_time_us,
            bitrate: 500.0,
            dup_frames: 0,
            drop_frames: 0,
            speed: 1.0,
            is_final: true,
        };
        let a = render_machine(&snap(1_000_000));
        let b = render_machine(&snap(2_000_000));
        let strip_time = |s: &str| -> String {
            s.lines()
                .filter(|l| !l.starts_with("out_time"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip_time(&a), strip_time(&b));
        assert!(a.ends_with("progress=end\n"));
        assert!(b.ends_with("progress=end\n"));
    }
}
