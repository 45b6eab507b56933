use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics for a plaza socket.
/// These are shared between the driver task, the booth sessions and the socket.
#[derive(Debug, Default)]
pub struct PlazaStats {
    /// Number of booth sessions currently active
    active_sessions: AtomicUsize,
    /// Total number of accepted registrations
    registrations: AtomicUsize,
    /// Total number of rejected registrations
    rejected_registrations: AtomicUsize,
    /// Total number of requests handled
    requests: AtomicUsize,
    /// Total number of requests answered with a failure
    failed_requests: AtomicUsize,
    /// Total number of vehicles exited on behalf of disconnected booths
    forced_exits: AtomicUsize,
}

impl PlazaStats {
    #[inline]
    pub(crate) fn increment_active_sessions(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn decrement_active_sessions(&self) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_registrations(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_rejected_registrations(&self) {
        self.rejected_registrations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_failed_requests(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_forced_exits(&self, count: usize) {
        self.forced_exits.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn rejected_registrations(&self) -> usize {
        self.rejected_registrations.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failed_requests(&self) -> usize {
        self.failed_requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn forced_exits(&self) -> usize {
        self.forced_exits.load(Ordering::Relaxed)
    }
}
