//! Error taxonomy and the exit-code mapping.

use thiserror::Error;

/// Everything that can come back out of a collaborator call or a scheduler
/// step. `RetryAgain` and `EndOfInput` are not failures, they are
/// control-flow signals the scheduler acts on.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No progress possible right now; caller should yield and retry later.
    #[error("retry-again")]
    RetryAgain,

    /// The producer behind this stream has nothing left to give.
    #[error("end of input")]
    EndOfInput,

    /// A single frame failed to decode. Counted against the stream's error
    /// rate; not fatal on its own.
    #[error("decode error on {0}")]
    DecodeError(crate::ids::StreamId),

    /// A demuxer/muxer/codec collaborator reported a hard failure.
    #[error("fatal library error: {0}")]
    FatalLibrary(String),

    /// Allocation failed, e.g. mid subtitle deep-copy.
    #[error("out of memory")]
    OutOfMemory,

    /// A termination signal was observed; the loop is unwinding.
    #[error("aborted by signal {0}")]
    SignalAbort(i32),

    /// Setup-time failure: bad options, no inputs, no outputs, leftover
    /// unconsumed option keys.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Whether this variant represents actual failure rather than ordinary
    /// control flow (`RetryAgain`/`EndOfInput` are not failures).
    pub fn is_failure(&self) -> bool {
        !matches!(self, CoreError::RetryAgain | CoreError::EndOfInput)
    }

    /// Maps a terminal error state to the process exit code: 0 success,
    /// 255 on any received signal, 69 on an exceeded decode-error rate,
    /// otherwise the first propagated error clamped to 1.
    pub fn exit_code(this: Option<&CoreError>, received_signal: bool, err_rate_exceeded: bool) -> i32 {
        if received_signal {
            return 255;
        }
        if err_rate_exceeded {
            return 69;
        }
        match this {
            None => 0,
            Some(_) => 1,
        }
    }
}

/// Associative fold over per-file trailer-write results: the first hard
/// failure wins, later successes never overwrite it.
///
/// ```
/// use transcoder_core::error::{err_merge, CoreError};
///
/// let a: Result<(), CoreError> = Ok(());
/// let b: Result<(), CoreError> = Err(CoreError::Configuration("no outputs".into()));
/// let c: Result<(), CoreError> = Ok(());
///
/// let merged = err_merge(err_merge(a, b), c);
/// assert!(merged.is_err());
/// ```
pub fn err_merge(first: Result<(), CoreError>, second: Result<(), CoreError>) -> Result<(), CoreError> {
    match first {
        Err(e) => Err(e),
        Ok(()) => second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_merge_keeps_first_failure() {
        let a: Result<(), CoreError> = Err(CoreError::OutOfMemory);
        let b: Result<(), CoreError> = Err(CoreError::Configuration("bad".into()));
        match err_merge(a, b) {
            Err(CoreError::OutOfMemory) => {}
            other => panic!("expected first failure preserved, got {other:?}"),
        }
    }

    #[test]
    fn err_merge_is_associative_with_single_fatal() {
        let ok: Result<(), CoreError> = Ok(());
        let fatal = || -> Result<(), CoreError> { Err(CoreError::OutOfMemory) };

        let left = err_merge(err_merge(ok_copy(&ok), fatal()), ok_copy(&ok));
        let right = err_merge(ok_copy(&ok), err_merge(fatal(), ok_copy(&ok)));
        assert_eq!(left.is_err(), right.is_err());
    }

    fn ok_copy(r: &Result<(), CoreError>) -> Result<(), CoreError> {
        match r {
            Ok(()) => Ok(()),
            Err(_) => unreachable!(),
        }
    }

    #[test]
    fn exit_code_precedence() {
        assert_eq!(CoreError::exit_code(None, true, true), 255);
        assert_eq!(CoreError::exit_code(None, false, true), 69);
        assert_eq!(CoreError::exit_code(None, false, false), 0);
        assert_eq!(
            CoreError::exit_code(Some(&CoreError::OutOfMemory), false, false),
            1
        );
    }
}
