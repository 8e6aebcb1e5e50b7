//! Session controller
//!
//! Runs on the main thread. Each tick polls for a key, applies it, drives
//! the publisher while broadcasting and presents one composited frame.

use std::time::Instant;

use crate::constants::INPUT_POLL;
use crate::error::TransportError;
use crate::session::publisher::Publisher;
use crate::session::state::Session;
use crate::video::compositor::{Compositor, Overlays};
use crate::video::display::{Display, Key};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Quit,
}

pub struct Controller<D> {
    session: Session,
    display: D,
    compositor: Compositor,
    publisher: Publisher,
}

impl<D: Display> Controller<D> {
    pub fn new(session: Session, display: D, compositor: Compositor, publisher: Publisher) -> Self {
        Self {
            session,
            display,
            compositor,
            publisher,
        }
    }

    /// Tick until quit or a fatal stream error, then shut the session down.
    ///
    /// Returns the fatal error, if that is what ended the session.
    pub fn run(mut self) -> Result<(), TransportError> {
        tracing::info!("Press space to toggle broadcasting, escape to quit");
        while self.tick() == Tick::Continue {}
        self.shutdown();

        match self.session.take_fatal() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn tick(&mut self) -> Tick {
        if self.session.cancel_token().is_cancelled() {
            self.session.request_quit();
        } else if let Some(key) = self.display.poll_key(INPUT_POLL) {
            self.apply_key(key);
        }
        if self.session.quit_requested() {
            return Tick::Quit;
        }

        if self.session.broadcasting() {
            self.publisher.step();
        } else {
            self.publisher.stop();
            self.compositor.reset_display();
        }

        self.render(Instant::now());
        Tick::Continue
    }

    fn apply_key(&mut self, key: Key) {
        match key {
            Key::Escape => self.session.request_quit(),
            Key::Space => {
                let on = self.session.toggle_broadcasting();
                tracing::info!("Broadcasting {}", if on { "on" } else { "off" });
            }
            Key::Char(c) => tracing::trace!("Ignoring key {:?}", c),
        }
    }

    fn render(&mut self, now: Instant) {
        let snapshot = self.session.render_snapshot(now);
        if snapshot.reset {
            self.compositor.reset_display();
        }

        let frame = self.compositor.render(&Overlays {
            inbound: snapshot.inbound.as_deref(),
            outbound: snapshot.outbound.as_deref(),
        });
        if let Err(e) = self.display.show(frame) {
            tracing::warn!("Display error: {}", e);
        }
    }

    fn shutdown(&mut self) {
        self.publisher.stop();
        self.session.cancel_token().cancel();
        tracing::info!("Session closed");
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::device::StreamParams;
    use crate::audio::playback::AudioPlayback;
    use crate::network::transport::{Inbound, MessageReceiver, OutboundSender};
    use crate::protocol::{BroadcastMessage, ImagePayload, PIXEL_FORMAT_RGB8};
    use crate::session::dispatcher::Dispatcher;
    use crate::testing::{MemoryAudioBackend, ScriptedCamera, ScriptedDisplay};
    use crate::video::compositor::Layout;
    use crate::video::frame::Frame;
    use std::sync::Arc;
    use tokio::io::DuplexStream;
    use tokio::runtime::Handle;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        controller: Controller<ScriptedDisplay>,
        session: Session,
        camera: ScriptedCamera,
        background: Frame,
        remote: MessageReceiver<DuplexStream>,
    }

    fn background() -> Frame {
        let data = [40u8, 50, 60].iter().copied().cycle().take(640 * 360 * 3).collect();
        Frame::new(640, 360, data).unwrap()
    }

    fn harness(keys: Vec<Key>) -> Harness {
        let session = Session::new(CancellationToken::new());
        let (local, remote) = tokio::io::duplex(1 << 22);
        let (outbound, _writer) = OutboundSender::spawn(local, session.cancel_token().clone());
        let camera = ScriptedCamera::new();
        let audio = MemoryAudioBackend::new();
        let publisher = Publisher::new(
            session.clone(),
            outbound,
            Handle::current(),
            Arc::new(camera.clone()),
            "0",
            Arc::new(audio),
            StreamParams::default(),
        );
        let background = background();
        let controller = Controller::new(
            session.clone(),
            ScriptedDisplay::with_keys(keys),
            Compositor::new(background.clone(), Layout::default()),
            publisher,
        );
        Harness {
            controller,
            session,
            camera,
            background,
            remote: MessageReceiver::new(remote),
        }
    }

    #[tokio::test]
    async fn test_idle_session_shows_background() {
        let mut h = harness(vec![]);
        assert_eq!(h.controller.tick(), Tick::Continue);

        assert_eq!(h.controller.display().last.as_ref(), Some(&h.background));
        assert!(!h.session.broadcasting());
        assert_eq!(h.controller.display().shown, 1);
    }

    #[tokio::test]
    async fn test_space_starts_broadcast_and_escape_quits() {
        let mut h = harness(vec![Key::Space]);
        h.controller.tick();

        assert!(h.session.broadcasting());
        assert!(h.session.camera_on());
        assert!(h.controller.publisher().audio_running());

        let shown = h.controller.display().last.clone().unwrap();
        let (row, col) = Layout::default().outbound_origin;
        // blank scripted camera frame lands in the self-view corner
        assert_eq!(shown.pixel(row, col), [0, 0, 0]);
        assert_eq!(shown.pixel(0, 0), [40, 50, 60]);

        match h.remote.recv().await.unwrap() {
            Inbound::Message(BroadcastMessage::Image(_)) => {}
            other => panic!("unexpected {:?}", other),
        }

        h.controller.display.keys.push_back(Key::Space);
        h.controller.tick();
        assert!(!h.session.broadcasting());
        assert!(!h.session.camera_on());
        assert_eq!(h.controller.display().last.as_ref(), Some(&h.background));

        h.controller.display.keys.push_back(Key::Escape);
        assert_eq!(h.controller.tick(), Tick::Quit);
    }

    #[tokio::test]
    async fn test_camera_failure_keeps_session_running() {
        let mut h = harness(vec![Key::Space]);
        h.camera.fail_open();

        for _ in 0..3 {
            assert_eq!(h.controller.tick(), Tick::Continue);
        }

        assert!(h.session.broadcasting());
        assert!(!h.session.camera_on());
        assert!(!h.session.cancel_token().is_cancelled());
        assert_eq!(h.camera.opens(), 0);
    }

    #[tokio::test]
    async fn test_inbound_preview_is_composited() {
        let mut h = harness(vec![]);
        let (_local, remote) = tokio::io::duplex(64);
        let playback = AudioPlayback::new(
            Arc::new(MemoryAudioBackend::new()),
            StreamParams::default(),
            h.session.cancel_token().clone(),
        );
        let mut dispatcher = Dispatcher::new(MessageReceiver::new(remote), h.session.clone(), playback);

        dispatcher.handle(
            Inbound::Message(
                ImagePayload {
                    height: 2,
                    width: 4,
                    pixel_format: PIXEL_FORMAT_RGB8,
                    bytes: vec![200; 4 * 2 * 3],
                }
                .into(),
            ),
            Instant::now(),
        );
        h.controller.tick();

        let shown = h.controller.display().last.clone().unwrap();
        let (row, col) = Layout::default().inbound_origin;
        assert_eq!(shown.pixel(row, col), [200, 200, 200]);
        assert_eq!(shown.pixel(row + 159, col + 319), [200, 200, 200]);
        assert_eq!(shown.pixel(row + 159, col + 320), [40, 50, 60]);
        assert_eq!(shown.pixel(row + 160, col), [40, 50, 60]);
    }

    #[tokio::test]
    async fn test_fatal_error_ends_run() {
        let h = harness(vec![]);
        h.session.fail(TransportError::Stream("connection reset".into()));

        assert_eq!(
            h.controller.run(),
            Err(TransportError::Stream("connection reset".into()))
        );
    }
}
