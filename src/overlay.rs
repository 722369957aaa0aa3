use crate::detection::BoundingBox;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const LIME: Color = Color::new(0, 255, 0);
    pub const RED: Color = Color::new(255, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub color: Color,
    pub line_width: u32,
    pub label: Option<Label>,
}

/// Display list drawn over the camera viewport.
///
/// Shares its width and height with the frame source, so annotation
/// coordinates are frame pixel coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct Overlay {
    width: u32,
    height: u32,
    annotations: Vec<Annotation>,
}

impl Overlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            annotations: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    pub fn draw(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// Clears the surface once, then draws one tick's annotations.
    pub fn present(&mut self, annotations: impl IntoIterator<Item = Annotation>) {
        self.clear();
        for annotation in annotations {
            self.draw(annotation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(x: f32) -> Annotation {
        Annotation {
            bbox: BoundingBox::new(x, 0.0, 10.0, 10.0),
            color: Color::RED,
            line_width: 3,
            label: None,
        }
    }

    #[test]
    fn test_present_replaces_previous_tick() {
        let mut overlay = Overlay::new(850, 540);
        overlay.present(vec![annotation(1.0), annotation(2.0)]);
        overlay.present(vec![annotation(3.0)]);

        assert_eq!(overlay.annotations(), &[annotation(3.0)]);
    }

    #[test]
    fn test_present_nothing_leaves_overlay_empty() {
        let mut overlay = Overlay::new(850, 540);
        overlay.draw(annotation(1.0));
        overlay.present(Vec::new());
        assert!(overlay.is_empty());
        assert_eq!(overlay.dimensions(), (850, 540));
    }

    #[test]
    fn test_serializes_for_clients() {
        let mut overlay = Overlay::new(4, 2);
        overlay.draw(annotation(1.0));
        let json = serde_json::to_value(&overlay).unwrap();
        assert_eq!(json["width"], 4);
        assert_eq!(json["annotations"][0]["color"]["red"], 255);
        assert!(json["annotations"][0]["label"].is_null());
    }
}
