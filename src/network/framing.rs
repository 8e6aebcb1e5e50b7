//! Length-delimited framing
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! body. A zero-length frame is the end-of-stream marker: the relay sends it
//! when the remote peer goes away, and the connection itself stays open.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::MAX_MESSAGE_SIZE;
use crate::error::TransportError;

const HEADER_LEN: usize = 4;

/// Reads frames from the receive half of a stream
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
        }
    }

    /// Read the next frame body.
    ///
    /// Returns `Ok(None)` when the peer closed the connection on a frame
    /// boundary. An empty body is the end-of-stream marker.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self
                .inner
                .read(&mut header[filled..])
                .await
                .map_err(|e| TransportError::Stream(e.to_string()))?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::Stream("truncated frame header".into()));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::Stream(format!(
                "frame of {} bytes exceeds limit of {}",
                len, MAX_MESSAGE_SIZE
            )));
        }

        self.buf.resize(len, 0);
        self.inner
            .read_exact(&mut self.buf[..])
            .await
            .map_err(|e| TransportError::Stream(format!("truncated frame body: {}", e)))?;

        Ok(Some(self.buf.split().freeze()))
    }
}

/// Writes frames to the send half of a stream
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, body: &[u8]) -> Result<(), TransportError> {
        if body.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::Send(format!(
                "frame of {} bytes exceeds limit of {}",
                body.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let header = (body.len() as u32).to_be_bytes();
        self.inner
            .write_all(&header)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.inner
            .write_all(body)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    /// Write the end-of-stream marker
    pub async fn write_end_of_stream(&mut self) -> Result<(), TransportError> {
        self.write_frame(&[]).await
    }
}
