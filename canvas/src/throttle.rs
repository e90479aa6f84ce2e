//! Throttle gate for high-frequency outbound streams.
//!
//! DESIGN
//! ======
//! The gate holds at most one payload. The first offer after an idle period
//! opens a window of one interval and is not sent immediately; later offers
//! inside the window overwrite the held payload. When the window closes the
//! latest payload is released and the gate goes idle again. Older payloads
//! are discarded, never queued.
//!
//! The clock is passed in by the caller, so the owning session loop decides
//! when to poll (see `next_deadline`) and tests can drive time explicitly.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ThrottleGate<T> {
    interval: Duration,
    pending: Option<T>,
    window_end: Option<Instant>,
}

impl<T> ThrottleGate<T> {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, pending: None, window_end: None }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Hand the gate a newer payload. Never blocks and never emits.
    pub fn offer(&mut self, payload: T, now: Instant) {
        if self.window_end.is_none() {
            self.window_end = Some(now + self.interval);
        }
        self.pending = Some(payload);
    }

    /// Release the held payload if its window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.window_end {
            Some(end) if now >= end => {
                self.window_end = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Release the held payload immediately, regardless of the window.
    pub fn flush(&mut self) -> Option<T> {
        self.window_end = None;
        self.pending.take()
    }

    /// Drop the held payload without releasing it.
    pub fn discard(&mut self) {
        self.window_end = None;
        self.pending = None;
    }

    /// When the held payload becomes due, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().and(self.window_end)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
    }
}
