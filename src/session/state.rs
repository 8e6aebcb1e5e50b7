//! Shared session state
//!
//! Every flag the concurrent parts of the client share sits in one
//! [`SessionState`] behind one lock. The lock is never held across an
//! `.await` or a device call.
//!
//! | field              | written by                         | read by                    |
//! |--------------------|------------------------------------|----------------------------|
//! | `broadcasting`     | controller (key input)             | controller                 |
//! | `camera_on`        | publisher video step               | controller (render)        |
//! | `mic_on`           | publisher                          | controller                 |
//! | `quit_requested`   | controller, cancellation           | controller                 |
//! | liveness           | dispatcher (record/end), render    | render                     |
//! | inbound preview    | dispatcher                         | render                     |
//! | outbound preview   | publisher video step               | render                     |
//! | display reset      | dispatcher, liveness expiry        | render                     |
//! | fatal error        | dispatcher                         | controller on exit         |

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::session::liveness::{Liveness, LivenessTracker};
use crate::video::frame::Frame;

#[derive(Debug, Default)]
struct SessionState {
    broadcasting: bool,
    camera_on: bool,
    mic_on: bool,
    quit_requested: bool,
    liveness: LivenessTracker,
    inbound_preview: Option<Arc<Frame>>,
    outbound_preview: Option<Arc<Frame>>,
    reset_pending: bool,
    fatal: Option<TransportError>,
}

/// What the compositor needs for one tick, read under a single lock
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    /// Inbound preview, only while the remote is live
    pub inbound: Option<Arc<Frame>>,
    /// Mirrored outbound preview, only while the camera is on
    pub outbound: Option<Arc<Frame>>,
    /// The display must be reset to the background before drawing
    pub reset: bool,
}

/// Cloneable handle to the state of one session
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            cancel,
        }
    }

    /// Process-wide cancellation signal
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn broadcasting(&self) -> bool {
        self.state.lock().broadcasting
    }

    /// Flip broadcasting and return the new value
    pub fn toggle_broadcasting(&self) -> bool {
        let mut state = self.state.lock();
        state.broadcasting = !state.broadcasting;
        state.broadcasting
    }

    pub fn request_quit(&self) {
        self.state.lock().quit_requested = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.state.lock().quit_requested
    }

    pub fn camera_on(&self) -> bool {
        self.state.lock().camera_on
    }

    pub fn set_camera_on(&self, on: bool) {
        self.state.lock().camera_on = on;
    }

    pub fn mic_on(&self) -> bool {
        self.state.lock().mic_on
    }

    pub fn set_mic_on(&self, on: bool) {
        self.state.lock().mic_on = on;
    }

    /// Publish a new inbound preview and mark inbound as live.
    ///
    /// The preview is swapped in whole, so a render never sees a partial frame.
    /// Returns true if this starts a new inbound broadcast.
    pub fn record_inbound(&self, preview: Frame, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.inbound_preview = Some(Arc::new(preview));
        state.liveness.record_inbound(now)
    }

    /// End the inbound broadcast now and reset the display.
    /// Returns true if it was receiving.
    pub fn end_inbound(&self) -> bool {
        let mut state = self.state.lock();
        state.inbound_preview = None;
        state.reset_pending = true;
        state.liveness.end()
    }

    pub fn receiving_inbound(&self) -> bool {
        self.state.lock().liveness.is_receiving()
    }

    /// Liveness check with its side effect: expiry ends the inbound
    /// broadcast and resets the display
    pub fn is_live(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        state.check_liveness(now) == Liveness::Live
    }

    pub fn request_display_reset(&self) {
        self.state.lock().reset_pending = true;
    }

    pub fn set_outbound_preview(&self, preview: Option<Frame>) {
        self.state.lock().outbound_preview = preview.map(Arc::new);
    }

    pub fn outbound_preview(&self) -> Option<Arc<Frame>> {
        self.state.lock().outbound_preview.clone()
    }

    /// Take everything a render needs in one consistent read
    pub fn render_snapshot(&self, now: Instant) -> RenderSnapshot {
        let mut state = self.state.lock();
        let live = state.check_liveness(now) == Liveness::Live;

        RenderSnapshot {
            inbound: if live { state.inbound_preview.clone() } else { None },
            outbound: if state.camera_on {
                state.outbound_preview.clone()
            } else {
                None
            },
            reset: std::mem::take(&mut state.reset_pending),
        }
    }

    /// Record a session-fatal error and cancel everything
    pub fn fail(&self, error: TransportError) {
        self.state.lock().fatal.get_or_insert(error);
        self.cancel.cancel();
    }

    pub fn take_fatal(&self) -> Option<TransportError> {
        self.state.lock().fatal.take()
    }
}

impl SessionState {
    fn check_liveness(&mut self, now: Instant) -> Liveness {
        let liveness = self.liveness.check(now);
        if liveness == Liveness::Expired {
            tracing::info!("Incoming broadcast went quiet");
            self.inbound_preview = None;
            self.reset_pending = true;
        }
        liveness
    }
}
