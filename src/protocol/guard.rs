//! Reentrancy guard.
//!
//! Deposits and withdrawals hold a [`GuardToken`] from entry to return. A
//! second guarded call made while the token is alive, for instance from a
//! transfer service calling back into the bank, fails with
//! [`Error::ReentrantCall`].
//!
//! The flag is per bank, not per thread. A deposit or withdrawal started on
//! another thread while one is in flight is rejected the same way instead of
//! waiting its turn, so a host that shares a bank across threads must
//! serialize whole operations itself (or retry on `ReentrantCall`).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Busy flag shared by all guarded operations of one bank
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

impl ReentrancyGuard {
    /// Create an idle guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the bank busy until the returned token is dropped
    pub fn enter(&self) -> Result<GuardToken<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::ReentrantCall)?;
        Ok(GuardToken { guard: self })
    }

    /// Whether a guarded operation is in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_entry_rejected() {
        let guard = ReentrancyGuard::new();

        let token = guard.enter().unwrap();
        assert!(guard.is_busy());
        assert_eq!(guard.enter().unwrap_err(), Error::ReentrantCall);

        drop(token);
        assert!(!guard.is_busy());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn test_released_on_error_path() {
        let guard = ReentrancyGuard::new();

        let failing = || -> Result<()> {
            let _token = guard.enter()?;
            Err(Error::ContractPaused)
        };

        assert!(failing().is_err());
        assert!(!guard.is_busy());
    }

    #[test]
    fn test_other_thread_rejected_not_queued() {
        let guard = ReentrancyGuard::new();
        let token = guard.enter().unwrap();

        let from_other_thread = std::thread::scope(|s| {
            s.spawn(|| guard.enter().map(drop)).join().unwrap()
        });
        assert_eq!(from_other_thread, Err(Error::ReentrantCall));

        drop(token);
        let after_release = std::thread::scope(|s| {
            s.spawn(|| guard.enter().map(drop)).join().unwrap()
        });
        assert!(after_release.is_ok());
    }
}
