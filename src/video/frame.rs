//! Packed RGB8 frames and the pixel operations the session needs

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::VideoError;
use crate::protocol::{ImagePayload, PIXEL_FORMAT_RGB8};

const BYTES_PER_PIXEL: usize = 3;

/// A packed RGB8 frame, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap raw RGB8 bytes; the buffer must hold exactly `width * height` pixels
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, VideoError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(VideoError::Decode(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An all-black frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    /// A zero-sized frame
    pub fn empty() -> Self {
        Self::blank(0, 0)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGB value at (row, col)
    pub fn pixel(&self, row: u32, col: u32) -> [u8; 3] {
        let i = self.offset(row, col);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    fn offset(&self, row: u32, col: u32) -> usize {
        (row as usize * self.width as usize + col as usize) * BYTES_PER_PIXEL
    }

    /// Height that keeps the aspect ratio when scaled to `target_width`.
    ///
    /// Equal to `floor(target_width / (width / height))`, computed in integers
    /// so exact ratios such as 16:9 never round down a pixel. Never below 1.
    pub fn scaled_height(&self, target_width: u32) -> u32 {
        if self.width == 0 {
            return 0;
        }
        let h = target_width as u64 * self.height as u64 / self.width as u64;
        u32::try_from(h).unwrap_or(u32::MAX).max(1)
    }

    /// Aspect-preserving resize to `target_width`
    pub fn scale_to_width(&self, target_width: u32) -> Frame {
        if self.is_empty() || target_width == 0 {
            return Frame::empty();
        }
        let target_height = self.scaled_height(target_width);

        match self.view() {
            Some(view) => {
                let resized = imageops::resize(&view, target_width, target_height, FilterType::Triangle);
                Frame::from_rgb_image(resized)
            }
            None => Frame::blank(target_width, target_height),
        }
    }

    /// [`Frame::scale_to_width`] keeping only the top `max_height` rows.
    ///
    /// The source is cut to the rows that land inside `max_height` before
    /// resizing, so a tall, narrow frame costs no more than one that fits.
    pub fn scale_to_width_clipped(&self, target_width: u32, max_height: u32) -> Frame {
        if self.scaled_height(target_width) <= max_height {
            return self.scale_to_width(target_width);
        }
        if self.is_empty() || target_width == 0 || max_height == 0 {
            return Frame::empty();
        }

        let rows = (max_height as u64 * self.width as u64)
            .div_ceil(target_width as u64)
            .min(self.height as u64) as u32;
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        let top = Frame {
            width: self.width,
            height: rows,
            data: self.data[..rows as usize * row_bytes].to_vec(),
        };

        match top.view() {
            Some(view) => {
                let resized = imageops::resize(&view, target_width, max_height, FilterType::Triangle);
                Frame::from_rgb_image(resized)
            }
            None => Frame::blank(target_width, max_height),
        }
    }

    /// Horizontally mirrored copy: column `c` comes from source column `width - 1 - c`
    pub fn mirrored(&self) -> Frame {
        match self.view() {
            Some(view) => Frame::from_rgb_image(imageops::flip_horizontal(&view)),
            None => self.clone(),
        }
    }

    /// Overwrite pixels starting at (row, col) with `src`, clipped to this frame
    pub fn blit(&mut self, src: &Frame, row: u32, col: u32) {
        if row >= self.height || col >= self.width {
            return;
        }
        let rows = src.height.min(self.height - row);
        let cols = src.width.min(self.width - col) as usize;
        let span = cols * BYTES_PER_PIXEL;

        for r in 0..rows {
            let from = src.offset(r, 0);
            let to = self.offset(row + r, col);
            self.data[to..to + span].copy_from_slice(&src.data[from..from + span]);
        }
    }

    /// Overwrite every pixel with the pixels of `other`, which must share dimensions
    pub fn copy_from(&mut self, other: &Frame) {
        if self.width == other.width && self.height == other.height {
            self.data.copy_from_slice(&other.data);
        } else {
            *self = other.clone();
        }
    }

    /// Decode an inbound image payload.
    ///
    /// A payload with zero width or height and no bytes decodes to an empty
    /// frame, which the sender uses to say its broadcast ended.
    pub fn from_payload(payload: &ImagePayload) -> Result<Frame, VideoError> {
        if payload.width < 0 || payload.height < 0 {
            return Err(VideoError::Decode(format!(
                "negative dimensions {}x{}",
                payload.width, payload.height
            )));
        }
        if (payload.width == 0 || payload.height == 0) && payload.bytes.is_empty() {
            return Ok(Frame::empty());
        }
        if payload.pixel_format != PIXEL_FORMAT_RGB8 {
            return Err(VideoError::Decode(format!(
                "unsupported pixel format {}",
                payload.pixel_format
            )));
        }
        Frame::new(payload.width as u32, payload.height as u32, payload.bytes.clone())
    }

    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload {
            height: self.height as i32,
            width: self.width as i32,
            pixel_format: PIXEL_FORMAT_RGB8,
            bytes: self.data.clone(),
        }
    }

    pub fn from_rgb_image(img: RgbImage) -> Frame {
        let (width, height) = img.dimensions();
        Frame {
            width,
            height,
            data: img.into_raw(),
        }
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    fn view(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }
}
