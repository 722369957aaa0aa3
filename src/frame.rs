use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame unavailable: {0}")]
    Unavailable(String),
    #[error("Frame is {actual_width}x{actual_height}, viewport is {expected_width}x{expected_height}")]
    ViewportMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// One snapshot of the camera viewport, RGB, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self::captured(image, Local::now())
    }

    pub fn captured(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self { image, captured_at }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Time elapsed since the snapshot was taken.
    pub fn age(&self) -> TimeDelta {
        Local::now() - self.captured_at
    }

    pub fn ensure_viewport(&self, width: u32, height: u32) -> Result<(), FrameError> {
        if self.width() == width && self.height() == height {
            return Ok(());
        }
        Err(FrameError::ViewportMismatch {
            expected_width: width,
            expected_height: height,
            actual_width: self.width(),
            actual_height: self.height(),
        })
    }
}

/// Hands out still snapshots of a live camera stream.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    async fn capture_frame(&self) -> Result<Frame, FrameError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_follow_image() {
        let frame = Frame::new(RgbImage::new(4, 3));
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 3);
    }

    #[test]
    fn test_age_counts_from_capture_time() {
        let fresh = Frame::new(RgbImage::new(1, 1));
        assert!(fresh.age() < TimeDelta::seconds(1));

        let stale = Frame::captured(RgbImage::new(1, 1), Local::now() - TimeDelta::seconds(3));
        assert!(stale.age() >= TimeDelta::seconds(3));
    }

    #[test]
    fn test_ensure_viewport() {
        let frame = Frame::new(RgbImage::new(850, 540));
        assert!(frame.ensure_viewport(850, 540).is_ok());

        let err = frame.ensure_viewport(640, 480).unwrap_err();
        assert!(matches!(
            err,
            FrameError::ViewportMismatch {
                expected_width: 640,
                actual_width: 850,
                ..
            }
        ));
    }
}
