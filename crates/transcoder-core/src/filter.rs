//! FilterGraph: a box the core schedules but never builds.

use crate::ids::FilterGraphIndex;

/// External collaborator handle. The core only needs to know whether it
/// has been initialized yet and whether it is "simple" (single input,
/// single output, no explicit filter chain) — enough to drive transcode
/// stepping.
pub struct FilterGraph {
    pub index: FilterGraphIndex,
    /// `None` before the collaborator has built the real graph.
    pub handle: Option<Box<dyn std::any::Any + Send>>,
    pub is_simple: bool,
    /// Last output pts the graph reported, used by the output selector
    /// when this is non-`None`.
    pub last_pts: Option<i64>,
}

impl FilterGraph {
    pub fn new(index: FilterGraphIndex, is_simple: bool) -> Self {
        Self {
            index,
            handle: None,
            is_simple,
            last_pts: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.is_some()
    }
}
