//! Bidirectional message transport
//!
//! The receive half is read by exactly one task (the inbound dispatcher).
//! The send half is owned by a writer task fed through a bounded queue, so
//! the video step and the audio publisher can send concurrently without ever
//! interleaving bytes of two frames.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use crate::error::TransportError;
use crate::network::framing::{FrameReader, FrameWriter};
use crate::protocol::{AudioPayload, BroadcastMessage, ImagePayload};

/// Result of one receive on the inbound stream
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(BroadcastMessage),
    /// The remote stopped broadcasting; more messages may follow later
    EndOfStream,
    /// A frame arrived intact but its body could not be decoded
    Malformed(String),
}

/// Receive half of the transport
pub struct MessageReceiver<R> {
    reader: FrameReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReceiver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: FrameReader::new(inner),
        }
    }

    /// Block until the next message, end-of-stream marker, or stream failure
    pub async fn recv(&mut self) -> Result<Inbound, TransportError> {
        match self.reader.read_frame().await? {
            None => Err(TransportError::Stream("connection closed by peer".into())),
            Some(body) if body.is_empty() => Ok(Inbound::EndOfStream),
            Some(body) => match BroadcastMessage::decode(&body) {
                Ok(msg) => Ok(Inbound::Message(msg)),
                Err(e) => Ok(Inbound::Malformed(e.to_string())),
            },
        }
    }
}

/// Cloneable handle for queueing outbound messages
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<BroadcastMessage>,
}

impl OutboundSender {
    /// Spawn the writer task that owns `writer`.
    ///
    /// The task exits when every sender is dropped or `cancel` fires.
    pub fn spawn<W>(writer: W, cancel: CancellationToken) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = tokio::spawn(write_loop(FrameWriter::new(writer), rx, cancel));
        (Self { tx }, handle)
    }

    /// Queue a video frame without waiting. A full queue skips the frame.
    pub fn try_send_video(&self, payload: ImagePayload) -> Result<(), TransportError> {
        self.tx
            .try_send(BroadcastMessage::Image(payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Send("outbound queue full".into()),
                TrySendError::Closed(_) => TransportError::Send("outbound writer stopped".into()),
            })
    }

    /// Queue an audio chunk, waiting for room in the queue
    pub async fn send_audio(&self, payload: AudioPayload) -> Result<(), TransportError> {
        self.tx
            .send(BroadcastMessage::Audio(payload))
            .await
            .map_err(|_| TransportError::Send("outbound writer stopped".into()))
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<BroadcastMessage>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let body = match msg.encode() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Dropping {} message, encode failed: {}", msg.kind(), e);
                continue;
            }
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = writer.write_frame(&body) => written,
        };
        if let Err(e) = written {
            tracing::warn!("Send error, skipping {} message: {}", msg.kind(), e);
        }
    }

    tracing::debug!("Outbound writer stopped");
}

/// Connect to the relay and split the connection into its two halves
pub async fn connect(
    addr: &str,
    cancel: CancellationToken,
) -> Result<(MessageReceiver<OwnedReadHalf>, OutboundSender, JoinHandle<()>), TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| TransportError::Connect(format!("{}: {}", addr, e)))?;
    stream
        .set_nodelay(true)
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    tracing::info!("Connected to {}", addr);

    let (read_half, write_half) = stream.into_split();
    let (sender, writer_handle) = OutboundSender::spawn(write_half, cancel);
    Ok((MessageReceiver::new(read_half), sender, writer_handle))
}
