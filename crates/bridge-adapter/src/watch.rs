// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What `watchSessions` reports. The orchestrator re-enumerates or
/// targeted-refreshes in response; the event itself carries no payload
/// beyond the id, by design — the source of truth is always a follow-up
/// read, since the watcher only promises at-least-once notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    SessionCreated(String),
    SessionUpdated(String),
    SessionRemoved(String),
}

/// Handle returned by `watch_sessions`. Dropping it does not stop the
/// watch — call [`WatchHandle::cancel`] explicitly. Cancelling twice is a
/// no-op.
#[derive(Clone)]
pub struct WatchHandle {
    cancelled: Arc<AtomicBool>,
    stop: Arc<dyn Fn() + Send + Sync>,
}

impl WatchHandle {
    pub fn new(stop: impl Fn() + Send + Sync + 'static) -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), stop: Arc::new(stop) }
    }

    /// Stop the underlying watch. Idempotent: only the first call invokes
    /// the stop closure.
    pub fn cancel(&self) {
        if self.cancelled.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            (self.stop)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("cancelled", &self.is_cancelled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_invokes_stop_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let handle = WatchHandle::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        handle.cancel();
        handle.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn fresh_handle_is_not_cancelled() {
        let handle = WatchHandle::new(|| {});
        assert!(!handle.is_cancelled());
    }
}
