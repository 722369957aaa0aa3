use crate::{frame::Frame, overlay::Overlay};
use image::{imageops, RgbImage};
use opencv::{
    core::{Mat, Point, Rect, Scalar, Size, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CvUtilsError {
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(opencv::Error),
    #[error("OpenCV error: {0}")]
    OpenCvError(opencv::Error),
    #[error("Frame buffer does not match {width}x{height}")]
    BufferMismatch { width: u32, height: u32 },
}

impl From<opencv::Error> for CvUtilsError {
    fn from(err: opencv::Error) -> Self {
        CvUtilsError::OpenCvError(err)
    }
}

const FONT_SCALE: f64 = 0.7;
const FONT_THICKNESS: i32 = 2;

/// Resizes a captured BGR frame to the viewport when the device ignores the requested size.
pub fn fit_viewport(mat: Mat, viewport: (u32, u32)) -> Result<Mat, CvUtilsError> {
    let (width, height) = (viewport.0 as i32, viewport.1 as i32);
    if mat.cols() == width && mat.rows() == height {
        return Ok(mat);
    }
    let mut resized = Mat::default();
    imgproc::resize(
        &mat,
        &mut resized,
        Size::new(width, height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}

pub fn mat_to_frame(bgr: &Mat) -> Result<Frame, CvUtilsError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(bgr, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let bytes = rgb.data_bytes()?.to_vec();
    let image = RgbImage::from_raw(width, height, bytes)
        .ok_or(CvUtilsError::BufferMismatch { width, height })?;

    Ok(Frame::new(image))
}

/// Single-channel equalized copy of the frame, the input Haar cascades expect.
pub fn frame_to_gray_mat(frame: &Frame) -> Result<Mat, CvUtilsError> {
    let gray = imageops::grayscale(frame.image());
    let mat = Mat::new_rows_cols_with_data(gray.height() as i32, gray.width() as i32, gray.as_raw().as_slice())?;

    let mut equalized = Mat::default();
    imgproc::equalize_hist(&*mat, &mut equalized)?;
    Ok(equalized)
}

pub fn draw_overlay(mat: &mut Mat, overlay: &Overlay) -> Result<(), CvUtilsError> {
    for annotation in overlay.annotations() {
        let bbox = annotation.bbox;
        let color = Scalar::new(
            annotation.color.blue as f64,
            annotation.color.green as f64,
            annotation.color.red as f64,
            0.0,
        );

        imgproc::rectangle(
            mat,
            Rect::new(
                bbox.x.round() as i32,
                bbox.y.round() as i32,
                bbox.width.round() as i32,
                bbox.height.round() as i32,
            ),
            color,
            annotation.line_width as i32,
            imgproc::LINE_8,
            0,
        )?;

        if let Some(label) = &annotation.label {
            imgproc::put_text(
                mat,
                &label.text,
                Point::new(label.x.round() as i32, label.y.max(0.0).round() as i32),
                imgproc::FONT_HERSHEY_SIMPLEX,
                FONT_SCALE,
                color,
                FONT_THICKNESS,
                imgproc::LINE_AA,
                false,
            )?;
        }
    }
    Ok(())
}

pub fn encode_jpg(mat: &Mat) -> Result<Vec<u8>, CvUtilsError> {
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(".jpg", mat, &mut buf, &Vector::new())
        .map_err(CvUtilsError::EncodeFrameFailed)?;
    Ok(buf.into())
}
