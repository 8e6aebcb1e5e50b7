//! Network subsystem for the bidirectional message stream

pub mod framing;
pub mod relay;
pub mod transport;

pub use framing::{FrameReader, FrameWriter};
pub use relay::Relay;
pub use transport::{connect, Inbound, MessageReceiver, OutboundSender};
