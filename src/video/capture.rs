//! Video capture devices
//!
//! A device is opened lazily by the publisher on first use and closed by
//! dropping the returned source.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::VideoError;
use crate::video::frame::Frame;

/// Device id of the built-in synthetic camera
pub const TEST_PATTERN_ID: &str = "test-pattern";

/// An open capture device
pub trait VideoSource {
    /// Read one frame. `None` means the device stopped producing frames.
    fn read_frame(&mut self) -> Option<Frame>;
}

/// Opens capture devices by id
pub trait VideoDevice: Send + Sync {
    fn open(&self, device_id: &str) -> Result<Box<dyn VideoSource>, VideoError>;
}

/// Resolves device ids against the test pattern and, with the `camera`
/// feature, the system webcams
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVideoDevice;

impl VideoDevice for SystemVideoDevice {
    fn open(&self, device_id: &str) -> Result<Box<dyn VideoSource>, VideoError> {
        if device_id == TEST_PATTERN_ID {
            return Ok(Box::new(TestPatternSource::new(640, 480, 30)));
        }

        #[cfg(feature = "camera")]
        {
            Ok(Box::new(webcam::WebcamSource::open(device_id)?))
        }

        #[cfg(not(feature = "camera"))]
        {
            Err(VideoError::DeviceOpen(format!(
                "{}: built without the `camera` feature, only `{}` is available",
                device_id, TEST_PATTERN_ID
            )))
        }
    }
}

/// Synthetic camera producing a moving gradient at a fixed frame rate
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_number: u64,
    interval: Duration,
    last_frame: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_number: 0,
            interval: Duration::from_secs(1) / fps.max(1),
            last_frame: None,
        }
    }

    /// Frame `n` of the pattern
    pub fn pattern(width: u32, height: u32, n: u64) -> Frame {
        let base = (n % 256) as u8;
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                data.push(base.wrapping_add((x % 256) as u8));
                data.push(base.wrapping_add((y % 256) as u8));
                data.push(base.wrapping_add(((x + y) % 256) as u8));
            }
        }
        Frame::new(width, height, data).unwrap_or_else(|_| Frame::blank(width, height))
    }
}

impl VideoSource for TestPatternSource {
    fn read_frame(&mut self) -> Option<Frame> {
        // Pace like a real camera: block until the next frame is due
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                thread::sleep(self.interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());

        let frame = Self::pattern(self.width, self.height, self.frame_number);
        self.frame_number += 1;
        Some(frame)
    }
}

#[cfg(feature = "camera")]
mod webcam {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;

    use super::VideoSource;
    use crate::error::VideoError;
    use crate::video::frame::Frame;

    pub struct WebcamSource {
        camera: Camera,
    }

    impl WebcamSource {
        pub fn open(device_id: &str) -> Result<Self, VideoError> {
            let index = match device_id.parse::<u32>() {
                Ok(i) => CameraIndex::Index(i),
                Err(_) => CameraIndex::String(device_id.to_string()),
            };
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

            let mut camera = Camera::new(index, format)
                .map_err(|e| VideoError::DeviceOpen(format!("{}: {}", device_id, e)))?;
            camera
                .open_stream()
                .map_err(|e| VideoError::DeviceOpen(format!("{}: {}", device_id, e)))?;

            tracing::info!("Opened webcam {}", device_id);
            Ok(Self { camera })
        }
    }

    impl VideoSource for WebcamSource {
        fn read_frame(&mut self) -> Option<Frame> {
            let buffer = match self.camera.frame() {
                Ok(buffer) => buffer,
                Err(e) => {
                    tracing::warn!("Webcam read failed: {}", e);
                    return None;
                }
            };
            let decoded = match buffer.decode_image::<RgbFormat>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::warn!("Webcam frame decode failed: {}", e);
                    return None;
                }
            };
            let (width, height) = (decoded.width(), decoded.height());
            Frame::new(width, height, decoded.into_raw()).ok()
        }
    }

    impl Drop for WebcamSource {
        fn drop(&mut self) {
            if let Err(e) = self.camera.stop_stream() {
                tracing::warn!("Failed to stop webcam stream: {}", e);
            }
        }
    }
}
