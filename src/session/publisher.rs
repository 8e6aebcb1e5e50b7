//! Outbound media publisher
//!
//! Video is captured synchronously, one frame per controller tick. Audio runs
//! in its own task so chunk capture never waits on rendering. Both send
//! through the shared [`OutboundSender`].
//!
//! A device that fails to open, or fails while running, stays off until
//! broadcasting is toggled off again. The session carries on without it.

use futures_util::FutureExt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::device::{AudioBackend, StreamParams};
use crate::constants::OUTBOUND_PREVIEW_WIDTH;
use crate::error::AudioError;
use crate::network::transport::OutboundSender;
use crate::protocol::AudioPayload;
use crate::session::state::Session;
use crate::video::capture::{VideoDevice, VideoSource};

struct AudioTask {
    stop: CancellationToken,
    handle: JoinHandle<Result<(), AudioError>>,
}

pub struct Publisher {
    session: Session,
    outbound: OutboundSender,
    runtime: Handle,

    video: Arc<dyn VideoDevice>,
    device_id: String,
    camera: Option<Box<dyn VideoSource>>,
    camera_disabled: bool,
    preview_width: u32,

    audio: Arc<dyn AudioBackend>,
    audio_params: StreamParams,
    audio_task: Option<AudioTask>,
    mic_disabled: bool,
}

impl Publisher {
    pub fn new(
        session: Session,
        outbound: OutboundSender,
        runtime: Handle,
        video: Arc<dyn VideoDevice>,
        device_id: impl Into<String>,
        audio: Arc<dyn AudioBackend>,
        audio_params: StreamParams,
    ) -> Self {
        Self {
            session,
            outbound,
            runtime,
            video,
            device_id: device_id.into(),
            camera: None,
            camera_disabled: false,
            preview_width: OUTBOUND_PREVIEW_WIDTH,
            audio,
            audio_params,
            audio_task: None,
            mic_disabled: false,
        }
    }

    /// One broadcasting tick: publish a camera frame and keep the microphone task running
    pub fn step(&mut self) {
        self.capture_video();
        self.ensure_audio();
    }

    /// Capture one frame, send it and refresh the outbound preview
    pub fn capture_video(&mut self) {
        if self.camera.is_none() && !self.open_camera() {
            return;
        }

        let frame = self.camera.as_mut().and_then(|camera| camera.read_frame());
        let frame = match frame {
            Some(frame) if !frame.is_empty() => frame,
            _ => {
                tracing::warn!("Didn't read from camera {}", self.device_id);
                self.close_camera();
                self.camera_disabled = true;
                return;
            }
        };

        if let Err(e) = self.outbound.try_send_video(frame.to_payload()) {
            tracing::warn!("Send error: {}", e);
        }

        let preview = frame.scale_to_width(self.preview_width).mirrored();
        self.session.set_outbound_preview(Some(preview));
    }

    fn open_camera(&mut self) -> bool {
        if self.camera_disabled {
            return false;
        }
        match self.video.open(&self.device_id) {
            Ok(camera) => {
                self.camera = Some(camera);
                self.session.set_camera_on(true);
                tracing::info!("Outgoing broadcast starting on camera {}", self.device_id);
                true
            }
            Err(e) => {
                tracing::warn!("Error opening video capture device: {}", e);
                self.camera_disabled = true;
                false
            }
        }
    }

    fn close_camera(&mut self) {
        if self.camera.take().is_some() {
            tracing::info!("Outgoing broadcast ended");
        }
        self.session.set_camera_on(false);
        self.session.set_outbound_preview(None);
    }

    /// Start the microphone task unless it is running or disabled
    pub fn ensure_audio(&mut self) {
        self.reap_audio();
        if self.audio_task.is_some() || self.mic_disabled {
            return;
        }

        let stop = self.session.cancel_token().child_token();
        let handle = self.runtime.spawn(publish_audio(
            self.audio.clone(),
            self.audio_params,
            self.outbound.clone(),
            stop.clone(),
        ));
        self.session.set_mic_on(true);
        self.audio_task = Some(AudioTask { stop, handle });
    }

    /// Collect the microphone task if it finished on its own
    fn reap_audio(&mut self) {
        let finished = match self.audio_task.as_mut() {
            Some(task) => (&mut task.handle).now_or_never(),
            None => return,
        };
        let Some(result) = finished else { return };

        self.audio_task = None;
        self.session.set_mic_on(false);
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Microphone disabled: {}", e);
                self.mic_disabled = true;
            }
            Err(e) => {
                tracing::warn!("Microphone task failed: {}", e);
                self.mic_disabled = true;
            }
        }
    }

    /// Broadcasting is off: release both devices and clear their latches
    pub fn stop(&mut self) {
        if let Some(task) = self.audio_task.take() {
            task.stop.cancel();
        }
        if self.session.mic_on() {
            self.session.set_mic_on(false);
        }
        self.mic_disabled = false;

        if self.camera.is_some() || self.session.camera_on() {
            self.close_camera();
        }
        self.camera_disabled = false;
    }

    pub fn camera_open(&self) -> bool {
        self.camera.is_some()
    }

    pub fn audio_running(&self) -> bool {
        self.audio_task.is_some()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if let Some(task) = self.audio_task.take() {
            task.stop.cancel();
        }
    }
}

/// Capture microphone chunks and queue them for sending until `stop` fires
async fn publish_audio(
    backend: Arc<dyn AudioBackend>,
    params: StreamParams,
    outbound: OutboundSender,
    stop: CancellationToken,
) -> Result<(), AudioError> {
    let opened = tokio::task::spawn_blocking(move || backend.open_input(params))
        .await
        .map_err(|e| AudioError::DeviceOpen(e.to_string()))?;
    let mut input = opened?;
    tracing::info!("Microphone broadcast started");

    let result = loop {
        let chunk = tokio::select! {
            _ = stop.cancelled() => break Ok(()),
            chunk = input.read() => chunk,
        };
        let samples = match chunk {
            Ok(samples) => samples,
            Err(e) => break Err(e),
        };

        tokio::select! {
            _ = stop.cancelled() => break Ok(()),
            sent = outbound.send_audio(AudioPayload { samples }) => {
                if let Err(e) = sent {
                    tracing::warn!("Send error: {}", e);
                }
            }
        }
    };

    input.close().await;
    tracing::info!("Microphone broadcast stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::{Inbound, MessageReceiver};
    use crate::protocol::BroadcastMessage;
    use crate::testing::{MemoryAudioBackend, ScriptedCamera};
    use crate::video::frame::Frame;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    struct Harness {
        publisher: Publisher,
        session: Session,
        camera: ScriptedCamera,
        audio: MemoryAudioBackend,
        remote: MessageReceiver<DuplexStream>,
    }

    fn harness() -> Harness {
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
            Arc::new(audio.clone()),
            StreamParams::default(),
        );
        Harness {
            publisher,
            session,
            camera,
            audio,
            remote: MessageReceiver::new(remote),
        }
    }

    #[tokio::test]
    async fn test_frame_is_sent_and_preview_mirrored() {
        let mut h = harness();
        let data: Vec<u8> = (0..320u32)
            .flat_map(|col| [(col / 2) as u8, 0, 0])
            .collect();
        let frame = Frame::new(320, 2, [data.clone(), data].concat()).unwrap();
        h.camera.push_read(Some(frame));

        h.publisher.capture_video();

        assert!(h.session.camera_on());
        let preview = h.session.outbound_preview().expect("outbound preview");
        assert_eq!(preview.width(), 160);
        // leftmost preview column comes from the right edge of the source
        assert!(preview.pixel(0, 0)[0] > preview.pixel(0, 159)[0]);

        match h.remote.recv().await.unwrap() {
            Inbound::Message(BroadcastMessage::Image(img)) => {
                assert_eq!((img.width, img.height), (320, 2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_camera_open_failure_latches_until_stop() {
        let mut h = harness();
        h.camera.fail_open();

        h.publisher.capture_video();
        h.publisher.capture_video();
        assert!(!h.session.camera_on());
        assert!(!h.publisher.camera_open());

        h.publisher.stop();
        assert!(!h.publisher.camera_disabled);
    }

    #[tokio::test]
    async fn test_camera_end_closes_and_clears_preview() {
        let mut h = harness();
        h.publisher.capture_video();
        assert!(h.session.outbound_preview().is_some());

        h.camera.push_read(None);
        h.publisher.capture_video();

        assert!(!h.session.camera_on());
        assert!(h.session.outbound_preview().is_none());
        assert!(!h.publisher.camera_open());

        // not reopened until broadcasting is toggled
        h.publisher.capture_video();
        assert_eq!(h.camera.opens(), 1);
    }

    #[tokio::test]
    async fn test_microphone_chunks_are_sent() {
        let mut h = harness();
        h.audio.script_input(vec![vec![1; 4], vec![2; 4]], false);

        h.publisher.ensure_audio();
        assert!(h.session.mic_on());

        let mut seen = Vec::new();
        while seen.len() < 2 {
            match h.remote.recv().await.unwrap() {
                Inbound::Message(BroadcastMessage::Audio(a)) => seen.push(a.samples[0]),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(h.audio.inputs_opened(), 1);

        h.publisher.stop();
        assert!(!h.session.mic_on());
        for _ in 0..100 {
            if h.audio.all_stopped() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.audio.all_stopped());
    }

    #[tokio::test]
    async fn test_microphone_error_while_running_latches_off() {
        let mut h = harness();
        h.audio.script_input(vec![vec![5; 4]], true);

        h.publisher.ensure_audio();
        match h.remote.recv().await.unwrap() {
            Inbound::Message(BroadcastMessage::Audio(a)) => assert_eq!(a.samples, vec![5; 4]),
            other => panic!("unexpected {:?}", other),
        }
        for _ in 0..100 {
            h.publisher.ensure_audio();
            if !h.publisher.audio_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!h.publisher.audio_running());
        assert!(!h.session.mic_on());
        assert!(h.publisher.mic_disabled);
        assert!(h.audio.all_stopped());
        assert!(!h.session.cancel_token().is_cancelled());

        // latched: further ticks leave the microphone closed
        h.publisher.ensure_audio();
        assert_eq!(h.audio.inputs_opened(), 1);

        h.publisher.capture_video();
        assert!(h.session.camera_on());
        match h.remote.recv().await.unwrap() {
            Inbound::Message(BroadcastMessage::Image(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_microphone_failure_disables_only_audio() {
        let mut h = harness();
        h.audio.fail_input_open();

        h.publisher.ensure_audio();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            h.publisher.ensure_audio();
            if !h.publisher.audio_running() {
                break;
            }
        }

        assert!(!h.publisher.audio_running());
        assert!(!h.session.mic_on());
        assert!(h.publisher.mic_disabled);

        h.publisher.capture_video();
        assert!(h.session.camera_on());
    }
}
