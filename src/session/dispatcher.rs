//! Inbound dispatcher
//!
//! The only reader of the receive half. Images become the inbound preview,
//! audio goes to the playback queue, and a failure of the stream itself ends
//! the session.

use std::time::Instant;
use tokio::io::AsyncRead;

use crate::audio::playback::AudioPlayback;
use crate::constants::{INBOUND_PREVIEW_ORIGIN, INBOUND_PREVIEW_WIDTH, SCREEN_HEIGHT};
use crate::error::TransportError;
use crate::network::transport::{Inbound, MessageReceiver};
use crate::protocol::{BroadcastMessage, ImagePayload};
use crate::session::state::Session;
use crate::video::frame::Frame;

pub struct Dispatcher<R> {
    receiver: MessageReceiver<R>,
    session: Session,
    playback: AudioPlayback,
    preview_width: u32,
    /// Rows between the preview origin and the bottom of the screen
    preview_max_height: u32,
}

impl<R: AsyncRead + Unpin> Dispatcher<R> {
    pub fn new(receiver: MessageReceiver<R>, session: Session, playback: AudioPlayback) -> Self {
        Self {
            receiver,
            session,
            playback,
            preview_width: INBOUND_PREVIEW_WIDTH,
            preview_max_height: SCREEN_HEIGHT - INBOUND_PREVIEW_ORIGIN.0,
        }
    }

    /// Receive until the session is cancelled or the stream fails.
    ///
    /// A stream failure is recorded on the session, which cancels it.
    pub async fn run(mut self) -> Result<(), TransportError> {
        let cancel = self.session.cancel_token().clone();
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Dispatcher stopped");
                    return Ok(());
                }
                received = self.receiver.recv() => received,
            };

            match received {
                Ok(inbound) => self.handle(inbound, Instant::now()),
                Err(e) => {
                    tracing::error!("Inbound stream failed: {}", e);
                    self.session.fail(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// Apply one inbound item received at `now`
    pub fn handle(&mut self, inbound: Inbound, now: Instant) {
        match inbound {
            Inbound::EndOfStream => {
                if self.session.end_inbound() {
                    tracing::info!("Incoming broadcast ended");
                }
            }
            Inbound::Malformed(e) => {
                tracing::warn!("Dropping malformed message: {}", e);
                self.session.request_display_reset();
            }
            Inbound::Message(BroadcastMessage::Image(payload)) => self.handle_image(&payload, now),
            Inbound::Message(BroadcastMessage::Audio(payload)) => {
                self.playback.enqueue(payload.samples);
            }
        }
    }

    fn handle_image(&mut self, payload: &ImagePayload, now: Instant) {
        let frame = match Frame::from_payload(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Error decoding image: {}", e);
                self.session.request_display_reset();
                return;
            }
        };

        if frame.is_empty() {
            if self.session.end_inbound() {
                tracing::info!("Incoming broadcast ended");
            }
            return;
        }

        let preview = frame.scale_to_width_clipped(self.preview_width, self.preview_max_height);
        if self.session.record_inbound(preview, now) {
            tracing::info!("Receiving incoming broadcast");
        }
    }
}
