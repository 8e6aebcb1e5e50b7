//! Background image loading

use std::path::Path;

use image::imageops::{self, FilterType};

use crate::video::frame::Frame;

/// Load the background and stretch it to the screen size.
///
/// Falls back to a blank frame when no path is given or the file cannot be read.
pub fn load_background(path: Option<&Path>, width: u32, height: u32) -> Frame {
    let Some(path) = path else {
        return Frame::blank(width, height);
    };

    match image::open(path) {
        Ok(img) => {
            tracing::info!(
                "Opening image from: {} ({}x{})",
                path.display(),
                img.width(),
                img.height()
            );
            let resized = imageops::resize(&img.to_rgb8(), width, height, FilterType::Triangle);
            Frame::from_rgb_image(resized)
        }
        Err(e) => {
            tracing::warn!("Error reading image from {}: {}", path.display(), e);
            Frame::blank(width, height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_blank() {
        let frame = load_background(Some(Path::new("/nonexistent/bg.png")), 64, 36);
        assert_eq!(frame, Frame::blank(64, 36));
    }

    #[test]
    fn test_image_is_stretched_to_screen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        image::RgbImage::from_pixel(10, 10, image::Rgb([50, 100, 150]))
            .save(&path)
            .unwrap();

        let frame = load_background(Some(&path), 64, 36);
        assert_eq!((frame.width(), frame.height()), (64, 36));
        assert_eq!(frame.pixel(20, 30), [50, 100, 150]);
    }
}
