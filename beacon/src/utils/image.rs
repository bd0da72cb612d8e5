use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

/// Single channel view of a frame, accepting BGR, BGRA or already
/// grayscale input.
pub fn to_grayscale(frame: &Mat) -> opencv::Result<Mat> {
    let code = match frame.channels() {
        1 => return frame.try_clone(),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(opencv::Error::new(
                core::StsBadArg,
                format!("Cannot convert a {n} channel frame to grayscale"),
            ))
        }
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(frame, &mut gray, code)?;
    Ok(gray)
}

/// Tightly packed, row major 8 bit grayscale pixels. Barcode decoders
/// outside of OpenCV want plain buffers rather than a `Mat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayBuffer {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayBuffer {
    /// Pixel at column `x` and row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Copy a frame into a `GrayBuffer`.
///
/// * `frame`: BGR, BGRA or grayscale 8 bit frame.
pub fn gray_buffer(frame: &Mat) -> opencv::Result<GrayBuffer> {
    let mut gray = to_grayscale(frame)?;
    // Regions of interest share the parent's stride, a clone packs the rows.
    if !gray.is_continuous() {
        gray = gray.try_clone()?;
    }
    #[allow(clippy::cast_sign_loss)]
    // Rows and cols of a valid Mat are never negative.
    let (width, height) = (gray.cols() as usize, gray.rows() as usize);
    let data = gray.data_bytes()?.to_vec();
    Ok(GrayBuffer {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::tests::{blank_frame, draw_disc};
    use opencv::core::Point;

    #[test]
    fn test_grayscale_of_colour_frame_is_single_channel() {
        let frame = blank_frame(64, 48);
        let gray = to_grayscale(&frame).unwrap();
        assert_eq!(gray.channels(), 1);
        assert_eq!((gray.cols(), gray.rows()), (64, 48));
    }

    #[test]
    fn test_gray_buffer_keeps_pixel_positions() {
        let mut frame = blank_frame(40, 30);
        draw_disc(&mut frame, Point::new(10, 20), 2, 255.0);
        let buffer = gray_buffer(&frame).unwrap();

        assert_eq!(buffer.data.len(), 40 * 30);
        assert_eq!(buffer.pixel(10, 20), 255);
        assert_eq!(buffer.pixel(30, 5), 0);
    }

    #[test]
    fn test_gray_buffer_of_region_of_interest() {
        let mut frame = blank_frame(40, 30);
        draw_disc(&mut frame, Point::new(25, 15), 1, 255.0);
        let roi = Mat::roi(&frame, core::Rect::new(20, 10, 10, 10))
            .unwrap()
            .try_clone()
            .unwrap();
        let buffer = gray_buffer(&roi).unwrap();

        assert_eq!((buffer.width, buffer.height), (10, 10));
        assert_eq!(buffer.pixel(5, 5), 255);
    }
}
