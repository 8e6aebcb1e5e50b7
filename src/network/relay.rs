//! Relay server
//!
//! Forwards every frame one client sends to every other connected client,
//! byte for byte. When a client leaves, the others get an end-of-stream
//! marker so their displays reset.

use bytes::Bytes;
use dashmap::DashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::constants::OUTBOUND_QUEUE_CAPACITY;
use crate::network::framing::{FrameReader, FrameWriter};

type PeerMap = DashMap<Uuid, mpsc::Sender<Bytes>>;

#[derive(Clone, Default)]
pub struct Relay {
    peers: Arc<PeerMap>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Accept clients until `shutdown` completes
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Relay listening");
        }

        tokio::select! {
            _ = shutdown => tracing::info!("Shutdown signal received"),
            _ = self.accept_loop(&listener) => {}
        }
    }

    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::warn!(error = %e, "Failed to configure socket");
        }

        let id = Uuid::new_v4();
        let peers = Arc::clone(&self.peers);
        tracing::info!(peer = %peer_addr, id = %id, "Client connected");

        tokio::spawn(async move {
            serve_peer(id, socket, &peers).await;
            tracing::info!(peer = %peer_addr, id = %id, "Client disconnected");
        });
    }
}

async fn serve_peer(id: Uuid, socket: TcpStream, peers: &PeerMap) {
    let (read_half, write_half) = socket.into_split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE_CAPACITY);
    peers.insert(id, tx);

    let writer = tokio::spawn(async move {
        let mut writer = FrameWriter::new(write_half);
        while let Some(body) = rx.recv().await {
            if let Err(e) = writer.write_frame(&body).await {
                tracing::debug!(id = %id, error = %e, "Write failed");
                break;
            }
        }
    });

    let mut reader = FrameReader::new(read_half);
    loop {
        match reader.read_frame().await {
            Ok(Some(body)) => forward(peers, id, body),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(id = %id, error = %e, "Read failed");
                break;
            }
        }
    }

    peers.remove(&id);
    forward(peers, id, Bytes::new());
    writer.abort();
}

/// Queue `body` for every peer except the sender. A full queue drops the frame for that peer.
fn forward(peers: &PeerMap, from: Uuid, body: Bytes) {
    for peer in peers.iter() {
        if *peer.key() == from {
            continue;
        }
        if peer.value().try_send(body.clone()).is_err() {
            tracing::trace!(id = %peer.key(), "Peer queue full, frame dropped");
        }
    }
}
