use crate::{detection::Detection, frame::Frame};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("Invalid region ({x}, {y}, {width}, {height}) for a {frame_width}x{frame_height} frame")]
    InvalidRegion {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("Failed to encode face crop: {0}")]
    Encode(#[from] image::ImageError),
}

/// JPEG of a single face, base64 encoded without a data-URI prefix.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub width: u32,
    pub height: u32,
    pub image_base64: String,
}

/// Pixel rectangle covered by a detection: left/top floored, right/bottom ceiled.
fn pixel_region(frame: &Frame, detection: &Detection) -> Result<(u32, u32, u32, u32), CropError> {
    let bbox = detection.bbox;
    let invalid = || CropError::InvalidRegion {
        x: bbox.x,
        y: bbox.y,
        width: bbox.width,
        height: bbox.height,
        frame_width: frame.width(),
        frame_height: frame.height(),
    };

    if !bbox.is_finite() || bbox.width <= 0.0 || bbox.height <= 0.0 {
        return Err(invalid());
    }
    if bbox.x < 0.0
        || bbox.y < 0.0
        || bbox.right() > frame.width() as f32
        || bbox.bottom() > frame.height() as f32
    {
        return Err(invalid());
    }

    let left = bbox.x.floor() as u32;
    let top = bbox.y.floor() as u32;
    let right = (bbox.right().ceil() as u32).min(frame.width());
    let bottom = (bbox.bottom().ceil() as u32).min(frame.height());
    if right <= left || bottom <= top {
        return Err(invalid());
    }

    Ok((left, top, right - left, bottom - top))
}

pub fn crop_face(frame: &Frame, detection: &Detection, jpeg_quality: u8) -> Result<FaceCrop, CropError> {
    let (x, y, width, height) = pixel_region(frame, detection)?;
    let face = imageops::crop_imm(frame.image(), x, y, width, height).to_image();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality).encode_image(&face)?;

    Ok(FaceCrop {
        width,
        height,
        image_base64: STANDARD.encode(&jpeg),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;
    use image::{Rgb, RgbImage};
    use rstest::rstest;

    fn frame_with_red_square() -> Frame {
        // 100x80 black frame with a red 20x20 square at (40, 30)
        let mut image = RgbImage::new(100, 80);
        for y in 30..50 {
            for x in 40..60 {
                image.put_pixel(x, y, Rgb([255, 0, 0]));
            }
        }
        Frame::new(image)
    }

    fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
        BoundingBox::new(x, y, w, h).into()
    }

    fn decode(crop: &FaceCrop) -> RgbImage {
        let bytes = STANDARD.decode(&crop.image_base64).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgb8()
    }

    #[test]
    fn test_crop_extracts_box_region() {
        let frame = frame_with_red_square();
        let crop = crop_face(&frame, &detection(40.0, 30.0, 20.0, 20.0), 95).unwrap();

        assert_eq!((crop.width, crop.height), (20, 20));
        let decoded = decode(&crop);
        assert_eq!(decoded.dimensions(), (20, 20));
        let center = decoded.get_pixel(10, 10);
        assert!(center[0] > 200 && center[1] < 60 && center[2] < 60);
    }

    #[test]
    fn test_payload_has_no_data_uri_prefix() {
        let frame = frame_with_red_square();
        let crop = crop_face(&frame, &detection(0.0, 0.0, 10.0, 10.0), 90).unwrap();
        assert!(!crop.image_base64.starts_with("data:"));
        // JPEG SOI marker
        assert!(STANDARD
            .decode(&crop.image_base64)
            .unwrap()
            .starts_with(&[0xFF, 0xD8]));
    }

    #[test]
    fn test_fractional_box_covers_partial_pixels() {
        let frame = frame_with_red_square();
        let crop = crop_face(&frame, &detection(10.5, 10.2, 9.0, 9.6), 90).unwrap();
        // left 10, top 10, right ceil(19.5)=20, bottom ceil(19.8)=20
        assert_eq!((crop.width, crop.height), (10, 10));
    }

    #[test]
    fn test_box_touching_frame_edge_is_valid() {
        let frame = frame_with_red_square();
        let crop = crop_face(&frame, &detection(80.0, 60.0, 20.0, 20.0), 90).unwrap();
        assert_eq!((crop.width, crop.height), (20, 20));
    }

    #[rstest]
    #[case::negative_x(detection(-1.0, 0.0, 10.0, 10.0))]
    #[case::negative_y(detection(0.0, -5.0, 10.0, 10.0))]
    #[case::past_right_edge(detection(95.0, 0.0, 10.0, 10.0))]
    #[case::past_bottom_edge(detection(0.0, 75.0, 10.0, 10.0))]
    #[case::zero_width(detection(10.0, 10.0, 0.0, 10.0))]
    #[case::negative_height(detection(10.0, 10.0, 10.0, -3.0))]
    #[case::nan(detection(f32::NAN, 10.0, 10.0, 10.0))]
    fn test_invalid_regions_are_rejected(#[case] detection: Detection) {
        let frame = frame_with_red_square();
        let err = crop_face(&frame, &detection, 90).unwrap_err();
        assert!(matches!(err, CropError::InvalidRegion { .. }));
    }
}
