//! Completion waiter: busy-polling cooperative wait on a single
//! outstanding asynchronous operation.
//!
//! The wait never blocks on a kernel primitive; it repeatedly executes one
//! non-blocking progress step on the worker and re-checks the request until
//! it completes. Single-threaded by construction: the worker forbids
//! concurrent access through its `&mut` receiver.

use std::io;
use tracing::warn;

/// Handle to one in-flight operation on a worker's ring. Transient;
/// consumed exactly once by [`wait_on_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest(pub(crate) u64);

/// Outcome of submitting an operation.
#[derive(Debug)]
pub enum RequestState {
    /// The operation finished at submission time; nothing to poll.
    Completed,
    /// The submission itself failed; the error is carried to the waiter.
    Failed(io::Error),
    /// The operation is in flight under the given token.
    Pending(PendingRequest),
}

/// A source of forward progress for in-flight operations.
///
/// One `step` advances every in-flight operation on the source without
/// blocking; `poll_request` consumes a finished request's raw result.
pub trait CompletionSource {
    /// Execute one non-blocking progress step. Returns the number of
    /// completions processed.
    fn step(&mut self) -> io::Result<usize>;

    /// Take the raw completion result if the request has finished,
    /// releasing the request's resources.
    fn poll_request(&mut self, request: &PendingRequest) -> Option<i32>;
}

/// Poll a single request to completion.
///
/// A request that failed synchronously returns the carried error without a
/// single progress step. A pending request is polled between progress steps
/// until it reports complete; a negative raw result maps to the
/// corresponding OS error, a non-negative one (bytes transferred for data
/// operations) is returned to the caller.
///
/// A pending request is never abandoned: once submitted, the kernel may
/// read or write the operation's buffers, which are only guaranteed to
/// live until this wait returns. Progress-step errors are therefore
/// logged and the wait continues until the completion arrives.
pub fn wait_on_request<S: CompletionSource>(
    source: &mut S,
    request: RequestState,
) -> io::Result<i32> {
    let pending = match request {
        RequestState::Completed => return Ok(0),
        RequestState::Failed(err) => return Err(err),
        RequestState::Pending(pending) => pending,
    };

    let mut step_error_logged = false;
    loop {
        if let Some(result) = source.poll_request(&pending) {
            if result < 0 {
                return Err(io::Error::from_raw_os_error(-result));
            }
            return Ok(result);
        }
        if let Err(e) = source.step() {
            if !step_error_logged {
                warn!(error = %e, "Progress step failed; continuing to wait");
                step_error_logged = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Completes a fixed request with `result` once `steps_needed` progress
    /// steps have run.
    struct ScriptedSource {
        steps_needed: usize,
        steps_taken: usize,
        result: i32,
    }

    impl ScriptedSource {
        fn new(steps_needed: usize, result: i32) -> Self {
            Self {
                steps_needed,
                steps_taken: 0,
                result,
            }
        }
    }

    impl CompletionSource for ScriptedSource {
        fn step(&mut self) -> io::Result<usize> {
            self.steps_taken += 1;
            Ok(1)
        }

        fn poll_request(&mut self, _request: &PendingRequest) -> Option<i32> {
            if self.steps_taken >= self.steps_needed {
                Some(self.result)
            } else {
                None
            }
        }
    }

    #[test]
    fn test_already_completed_request_skips_polling() {
        let mut source = ScriptedSource::new(10, 0);
        assert_eq!(
            wait_on_request(&mut source, RequestState::Completed).unwrap(),
            0
        );
        assert_eq!(source.steps_taken, 0);
    }

    #[test]
    fn test_synchronous_failure_returns_without_progress() {
        let mut source = ScriptedSource::new(10, 0);
        let carried = io::Error::new(io::ErrorKind::ConnectionRefused, "refused at submit");
        let err = wait_on_request(&mut source, RequestState::Failed(carried)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(source.steps_taken, 0);
    }

    #[test]
    fn test_completion_after_k_steps() {
        let mut source = ScriptedSource::new(3, 42);
        let request = RequestState::Pending(PendingRequest(0));
        assert_eq!(wait_on_request(&mut source, request).unwrap(), 42);
        assert_eq!(source.steps_taken, 3);
    }

    #[test]
    fn test_negative_result_maps_to_os_error() {
        let mut source = ScriptedSource::new(1, -libc::ECONNRESET);
        let request = RequestState::Pending(PendingRequest(0));
        let err = wait_on_request(&mut source, request).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ECONNRESET));
    }

    struct InterruptedSource {
        steps_taken: usize,
        steps_needed: usize,
    }

    impl CompletionSource for InterruptedSource {
        fn step(&mut self) -> io::Result<usize> {
            self.steps_taken += 1;
            if self.steps_taken == 1 {
                return Err(io::Error::from_raw_os_error(libc::EINTR));
            }
            Ok(1)
        }

        fn poll_request(&mut self, _request: &PendingRequest) -> Option<i32> {
            if self.steps_taken >= self.steps_needed {
                Some(7)
            } else {
                None
            }
        }
    }

    #[test]
    fn test_step_error_does_not_abandon_a_pending_request() {
        let mut source = InterruptedSource {
            steps_taken: 0,
            steps_needed: 3,
        };
        let request = RequestState::Pending(PendingRequest(0));
        assert_eq!(wait_on_request(&mut source, request).unwrap(), 7);
        assert_eq!(source.steps_taken, 3);
    }
}
