use crate::frame::Frame;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Face localizer unavailable: {0}")]
    Unavailable(String),
}

/// Face box in frame pixel coordinates, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
}

impl From<BoundingBox> for Detection {
    fn from(bbox: BoundingBox) -> Self {
        Self { bbox }
    }
}

/// Finds faces in a frame. Implementations load their model once, at construction.
#[async_trait]
pub trait FaceLocalizer: Send + Sync + 'static {
    async fn detect_faces(&self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}
