//! Wire messages exchanged with the remote peer
//!
//! Every frame on the wire carries exactly one [`BroadcastMessage`], serialized
//! with bincode. Framing itself lives in [`crate::network::framing`].

use serde::{Deserialize, Serialize};

/// Pixel format code for packed 8-bit RGB (3 channels, unsigned)
pub const PIXEL_FORMAT_RGB8: i32 = 16;

/// One unit of broadcast media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BroadcastMessage {
    Image(ImagePayload),
    Audio(AudioPayload),
}

/// Raw video frame as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub height: i32,
    pub width: i32,
    pub pixel_format: i32,
    pub bytes: Vec<u8>,
}

/// One fixed-size chunk of mono audio samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPayload {
    pub samples: Vec<i32>,
}

impl BroadcastMessage {
    /// Serialize to a frame body
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from a frame body
    pub fn decode(body: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(body)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::Image(_) => "image",
            BroadcastMessage::Audio(_) => "audio",
        }
    }
}

impl From<ImagePayload> for BroadcastMessage {
    fn from(payload: ImagePayload) -> Self {
        BroadcastMessage::Image(payload)
    }
}

impl From<AudioPayload> for BroadcastMessage {
    fn from(payload: AudioPayload) -> Self {
        BroadcastMessage::Audio(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_survives_encoding() {
        let msg = BroadcastMessage::Image(ImagePayload {
            height: 2,
            width: 1,
            pixel_format: PIXEL_FORMAT_RGB8,
            bytes: vec![1, 2, 3, 4, 5, 6],
        });

        let body = msg.encode().unwrap();
        assert_eq!(BroadcastMessage::decode(&body).unwrap(), msg);
    }

    #[test]
    fn test_garbage_body_is_rejected() {
        assert!(BroadcastMessage::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }
}
