//! Single-slot hand-off cell for the server-side connection request.
//!
//! Written by the accept completion as a side effect of a progress step,
//! read by the accept loop. Exactly one writer-then-reader transition per
//! listener lifetime: the first writer wins, later offers are rejected.
//! A queue would only be warranted with multi-connection support.

use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

/// Sentinel for "no request captured". Accept results are a non-negative fd
/// or a small negated errno, so `i32::MIN` can never collide with one.
const EMPTY: i32 = i32::MIN;

/// Atomic single-slot cell holding one raw accept result.
#[derive(Debug)]
pub struct RequestSlot {
    raw: AtomicI32,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self {
            raw: AtomicI32::new(EMPTY),
        }
    }

    /// Store an accept result. Returns `false` if a request was already
    /// captured; the caller keeps ownership of the rejected result.
    pub fn offer(&self, result: i32) -> bool {
        self.raw
            .compare_exchange(EMPTY, result, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Consume the captured result, leaving the slot empty.
    pub fn take(&self) -> Option<i32> {
        match self.raw.swap(EMPTY, Ordering::AcqRel) {
            EMPTY => None,
            raw => Some(raw),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.load(Ordering::Acquire) == EMPTY
    }
}

impl Default for RequestSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot token for a pending incoming connection, owning the accepted
/// socket until an endpoint consumes it.
#[derive(Debug)]
pub struct ConnRequest {
    fd: OwnedFd,
}

impl ConnRequest {
    /// Take ownership of a raw fd delivered by an accept completion. The fd
    /// comes straight from the kernel and has no other owner.
    pub fn from_accepted(raw: RawFd) -> Self {
        Self {
            fd: unsafe { OwnedFd::from_raw_fd(raw) },
        }
    }

    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_empty() {
        let slot = RequestSlot::new();
        assert!(slot.is_empty());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_first_writer_wins() {
        let slot = RequestSlot::new();
        assert!(slot.offer(5));
        assert!(!slot.offer(6));
        assert!(!slot.is_empty());
        assert_eq!(slot.take(), Some(5));
    }

    #[test]
    fn test_take_consumes_exactly_once() {
        let slot = RequestSlot::new();
        assert!(slot.offer(9));
        assert_eq!(slot.take(), Some(9));
        assert_eq!(slot.take(), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_at_most_one_of_many_offers_is_captured() {
        let slot = RequestSlot::new();
        let accepted = (0..8).filter(|&fd| slot.offer(fd)).count();
        assert_eq!(accepted, 1);
        assert_eq!(slot.take(), Some(0));
    }

    #[test]
    fn test_error_results_pass_through() {
        let slot = RequestSlot::new();
        assert!(slot.offer(-libc::ECONNABORTED));
        assert_eq!(slot.take(), Some(-libc::ECONNABORTED));
    }
}
