//! Inbound liveness
//!
//! Inbound video counts as live while frames keep arriving at most
//! [`LIVENESS_WINDOW`] apart. This is a presentation decision, not a
//! transport timeout: the stream itself is never timed out.

use std::time::{Duration, Instant};

use crate::constants::LIVENESS_WINDOW;

/// Outcome of a liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Receiving, last frame within the window
    Live,
    /// Not receiving
    Idle,
    /// Was receiving until this check found the window exceeded
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct LivenessTracker {
    receiving: bool,
    last_inbound_at: Option<Instant>,
    window: Duration,
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(LIVENESS_WINDOW)
    }
}

impl LivenessTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            receiving: false,
            last_inbound_at: None,
            window,
        }
    }

    /// Note an inbound frame. Returns true if this starts a new inbound broadcast.
    pub fn record_inbound(&mut self, now: Instant) -> bool {
        let started = !self.receiving;
        self.last_inbound_at = Some(now);
        self.receiving = true;
        started
    }

    /// Force the inbound broadcast to end. Returns true if it was receiving.
    pub fn end(&mut self) -> bool {
        std::mem::replace(&mut self.receiving, false)
    }

    /// Check liveness at `now`, ending the broadcast if the window is exceeded
    pub fn check(&mut self, now: Instant) -> Liveness {
        if !self.receiving {
            return Liveness::Idle;
        }
        let fresh = self
            .last_inbound_at
            .map(|last| now.saturating_duration_since(last) <= self.window)
            .unwrap_or(false);
        if fresh {
            Liveness::Live
        } else {
            self.receiving = false;
            Liveness::Expired
        }
    }

    pub fn is_live(&mut self, now: Instant) -> bool {
        self.check(now) == Liveness::Live
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }
}
