use crate::{
    backend::RecognitionResult,
    detection::Detection,
    overlay::{Annotation, Color, Label},
};

const LINE_WIDTH: u32 = 3;
const LABEL_OFFSET: f32 = 25.0;

/// Turns a recognized detection into a box, and a label when accepted.
#[derive(Debug, Clone)]
pub struct AnnotationRenderer {
    display_threshold: f64,
    positive: Color,
    negative: Color,
}

impl AnnotationRenderer {
    pub fn new(display_threshold: f64) -> Self {
        Self {
            display_threshold,
            positive: Color::LIME,
            negative: Color::RED,
        }
    }

    pub fn is_positive(&self, result: &RecognitionResult) -> bool {
        result.confidence > self.display_threshold
    }

    pub fn annotate(&self, detection: &Detection, result: &RecognitionResult) -> Annotation {
        let bbox = detection.bbox;
        let (color, label) = if self.is_positive(result) {
            let label = Label {
                text: label_text(result),
                x: bbox.x,
                y: bbox.y - LABEL_OFFSET,
            };
            (self.positive, Some(label))
        } else {
            (self.negative, None)
        };

        Annotation {
            bbox,
            color,
            line_width: LINE_WIDTH,
            label,
        }
    }
}

pub fn label_text(result: &RecognitionResult) -> String {
    format!("{} ({:.2})", result.prediction, result.confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use rstest::rstest;

    fn result(prediction: &str, confidence: f64) -> RecognitionResult {
        RecognitionResult {
            prediction: prediction.to_string(),
            confidence,
        }
    }

    fn detection() -> Detection {
        BoundingBox::new(10.0, 20.0, 100.0, 100.0).into()
    }

    #[test]
    fn test_accepted_face_gets_positive_box_and_label() {
        let renderer = AnnotationRenderer::new(0.98);
        let annotation = renderer.annotate(&detection(), &result("Alice", 0.995));

        assert_eq!(annotation.color, Color::LIME);
        assert_eq!(annotation.bbox, BoundingBox::new(10.0, 20.0, 100.0, 100.0));
        let label = annotation.label.unwrap();
        assert_eq!(label.text, "Alice (99.50)");
        assert_eq!((label.x, label.y), (10.0, -5.0));
    }

    #[test]
    fn test_rejected_face_gets_negative_box_without_text() {
        let renderer = AnnotationRenderer::new(0.98);
        let annotation = renderer.annotate(&detection(), &result("Alice", 0.5));

        assert_eq!(annotation.color, Color::RED);
        assert_eq!(annotation.bbox, BoundingBox::new(10.0, 20.0, 100.0, 100.0));
        assert_eq!(annotation.line_width, 3);
        assert!(annotation.label.is_none());
    }

    #[rstest]
    #[case(0.0, false)]
    #[case(0.5, false)]
    #[case(0.98, false)]
    #[case(0.9801, true)]
    #[case(1.0, true)]
    fn test_threshold_is_strict(#[case] confidence: f64, #[case] positive: bool) {
        let renderer = AnnotationRenderer::new(0.98);
        let annotation = renderer.annotate(&detection(), &result("Bob", confidence));
        assert_eq!(annotation.label.is_some(), positive);
        assert_eq!(annotation.color == Color::LIME, positive);
    }

    #[test]
    fn test_label_text_formats_percentage() {
        assert_eq!(label_text(&result("Bob", 1.0)), "Bob (100.00)");
        assert_eq!(label_text(&result("Bob", 0.98764)), "Bob (98.76)");
    }
}
