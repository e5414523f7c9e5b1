//! Cleanup: ordered teardown, strictly inverse to
//! construction.
//!
//! The ordering itself — filter graphs, then output files, then input
//! files, then stats files, then hardware device registry, then misc
//! option storage, then network subsystem — is encoded as an explicit,
//! fallible `shutdown` sequence rather than left to field-declaration-order
//! `Drop`, because several of these steps (draining a muxer, writing a
//! trailer) can fail and the scheduler needs to fold those failures via
//! [`crate::error::err_merge`] rather than swallow them the way `Drop`
//! would, keeping an explicit, fallible `shutdown()` separate from a
//! best-effort `Drop` for the parts that can't fail.

use crate::error::{err_merge, CoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared with the platform console-control callback on systems that have
/// one: CLOSE/LOGOFF/SHUTDOWN events block until this is set, best-effort,
/// bounded by the OS's own grace period.
#[derive(Clone, Default)]
pub struct ExitFlag(Arc<AtomicBool>);

impl ExitFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the ordered teardown. Each step is idempotent by construction in
/// its caller (closing an already-closed file is a no-op); failures from
/// any step are folded with `err_merge` rather than short-circuiting, so
/// every step still runs once cleanup has started.
pub fn shutdown<FG, OF, IF, VS, HW, NS>(
    close_filter_graphs: FG,
    close_output_files: OF,
    close_input_files: IF,
    close_stats_files: VS,
    free_hw_devices: HW,
    deinit_network: NS,
    exited: &ExitFlag,
) -> Result<(), CoreError>
where
    FG: FnOnce() -> Result<(), CoreError>,
    OF: FnOnce() -> Result<(), CoreError>,
    IF: FnOnce() -> Result<(), CoreError>,
    VS: FnOnce() -> Result<(), CoreError>,
    HW: FnOnce(),
    NS: FnOnce(),
{
    let mut result = Ok(());
    result = err_merge(result, close_filter_graphs());
    result = err_merge(result, close_output_files());
    result = err_merge(result, close_input_files());
    result = err_merge(result, close_stats_files());
    free_hw_devices();
    deinit_network();
    exited.set();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_every_step_even_after_an_earlier_failure() {
        let mut ran = vec![];
        let exited = ExitFlag::new();
        let result = shutdown(
            || {
                ran.push("fg");
                Err(CoreError::OutOfMemory)
            },
            || {
                ran.push("of");
                Ok(())
            },
            || {
                ran.push("if");
                Ok(())
            },
            || {
                ran.push("stats");
                Ok(())
            },
            || ran.push("hw"),
            || ran.push("net"),
            &exited,
        );
        assert!(result.is_err());
        assert_eq!(ran, vec!["fg", "of", "if", "stats", "hw", "net"]);
        assert!(exited.is_set());
    }

    #[test]
    fn exit_flag_is_set_even_on_success() {
        let exited = ExitFlag::new();
        let _ = shutdown(|| Ok(()), || Ok(()), || Ok(()), || Ok(()), || {}, || {}, &exited);
        assert!(exited.is_set());
    }
}
