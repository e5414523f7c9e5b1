//! Output Selector: picks the output stream furthest behind in
//! media time.

use crate::filter::FilterGraph;
use crate::ids::StreamId;
use crate::output::{OutputFile, OutputKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorOutcome {
    Stream(StreamId),
    /// No candidate exists.
    Eof,
    /// A candidate was chosen but its `unavailable` flag is set.
    RetryAgain,
}

/// `opts`: `filter.last_pts` if the stream has an initialized filter with a
/// known output timestamp, else `last_mux_dts`, else `i64::MIN` if neither
/// is known yet. The exact sentinel value isn't contractual; `i64::MIN` is
/// used here as "any real dts beats this".
fn opts_for(file: &OutputFile, stream_idx: usize, filter_graphs: &[FilterGraph]) -> i64 {
    let stream = &file.streams[stream_idx];
    if let OutputKind::Encoded {
        filter_output: Some(fg_idx),
    } = &stream.kind
    {
        if let Some(fg) = filter_graphs.get(fg_idx.0) {
            if let Some(pts) = fg.last_pts {
                return pts;
            }
        }
    }
    if stream.last_mux_dts != i64::MIN {
        stream.last_mux_dts
    } else {
        i64::MIN
    }
}

/// Chooses which output stream should receive the next packet.
/// `filter_graphs` is indexed by `FilterGraphIndex`; pass an empty slice
/// if no stream has a filter.
pub fn choose_output(files: &[OutputFile], filter_graphs: &[FilterGraph]) -> SelectorOutcome {
    // Step 2: first-pass priming — any not-yet-initialized, not-finished
    // stream with no pending input completion is picked immediately,
    // in iteration order.
    for file in files {
        for (i, stream) in file.streams.iter().enumerate() {
            if !stream.initialized && !stream.finished.is_finished() && !stream.inputs_done {
                return SelectorOutcome::Stream(StreamId::new(file.index, i));
            }
        }
    }

    // Steps 3-4: among non-finished streams, the smallest `opts`, ties
    // broken by iteration order (file index then stream index — `files`
    // and each file's `streams` are already in that order).
    let mut best: Option<(StreamId, i64)> = None;
    for file in files {
        for (i, stream) in file.streams.iter().enumerate() {
            if stream.finished.is_finished() {
                continue;
            }
            let opts = opts_for(file, i, filter_graphs);
            let id = StreamId::new(file.index, i);
            match best {
                Some((_, best_opts)) if opts >= best_opts => {}
                _ => best = Some((id, opts)),
            }
        }
    }

    match best {
        None => SelectorOutcome::Eof,
        Some((id, _)) => {
            let stream = &files[id.file.0].streams[id.stream.0];
            if stream.unavailable {
                SelectorOutcome::RetryAgain
            } else {
                SelectorOutcome::Stream(id)
            }
        }
    }
}
