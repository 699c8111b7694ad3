// src/signal/shutdown.rs

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Why the pipeline was asked to stop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The consumer died during the health probe or the pipe looked unhealthy.
    UnhealthyStart,
    /// The overall run timeout elapsed.
    Timeout,
    /// A termination signal was delivered to the wrapper.
    Signal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::UnhealthyStart => "unhealthy start",
            ShutdownReason::Timeout => "timeout",
            ShutdownReason::Signal => "signal",
        };
        f.write_str(s)
    }
}

/// Process-wide shutdown flag guarded by the shared lock.
///
/// The flag goes from unset to set at most once; the first reason wins.
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    inner: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` if this call performed the transition.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let mut state = self.lock();
        if state.is_some() {
            return false;
        }
        *state = Some(reason);
        true
    }

    pub fn is_requested(&self) -> bool {
        self.lock().is_some()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.lock()
    }

    // A panic while holding the lock cannot leave a half-written Option.
    fn lock(&self) -> MutexGuard<'_, Option<ShutdownReason>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_requested());
        assert_eq!(handle.reason(), None);
    }

    #[test]
    fn first_reason_wins() {
        let handle = ShutdownHandle::new();
        assert!(handle.request(ShutdownReason::Signal));
        assert!(!handle.request(ShutdownReason::Timeout));
        assert_eq!(handle.reason(), Some(ShutdownReason::Signal));
    }

    #[test]
    fn clones_share_state_across_threads() {
        let handle = ShutdownHandle::new();
        let remote = handle.clone();
        std::thread::spawn(move || remote.request(ShutdownReason::Signal))
            .join()
            .unwrap();
        assert!(handle.is_requested());
    }
}
