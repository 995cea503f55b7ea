//! Frame cropping

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::processing::geometry::CropBox;
use crate::types::ImageFrame;

/// Crop `source` to `crop`
///
/// Returns the source unchanged, borrowed or owned, when the box covers the
/// whole frame.
pub fn crop<'a>(
    source: Cow<'a, ImageFrame>,
    crop: &CropBox,
    alignment_boundary: usize,
) -> Result<Cow<'a, ImageFrame>> {
    if crop.is_full(source.width(), source.height()) {
        return Ok(source);
    }
    crop_frame(&source, crop, alignment_boundary).map(Cow::Owned)
}

/// Copy the `crop` region of `source` into a newly allocated frame
pub fn crop_frame(source: &ImageFrame, crop: &CropBox, alignment_boundary: usize) -> Result<ImageFrame> {
    if !crop.fits(source.width(), source.height()) {
        return Err(Error::InvalidGeometry(format!(
            "crop {}x{}+{}+{} exceeds frame {}x{}",
            crop.width,
            crop.height,
            crop.col_start,
            crop.row_start,
            source.width(),
            source.height()
        )));
    }
    let depth = source.byte_depth();
    if depth != 1 && depth != 2 {
        return Err(Error::UnsupportedFormat(format!(
            "crop needs a byte depth of 1 or 2, {} has {}",
            source.format(),
            depth
        )));
    }

    let mut cropped = ImageFrame::new(source.format(), crop.width, crop.height, alignment_boundary)?;
    let pixel_bytes = source.channels() * depth;
    let col_offset = crop.col_start as usize * pixel_bytes;
    let copy_len = cropped.row_bytes();
    let src = source.data();
    let src_step = source.width_step();

    for row in 0..crop.height as usize {
        let src_start = (crop.row_start as usize + row) * src_step + col_offset;
        cropped
            .row_mut(row)
            .copy_from_slice(&src[src_start..src_start + copy_len]);
    }

    Ok(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageFormat;

    fn gradient(width: u32, height: u32) -> ImageFrame {
        let mut frame = ImageFrame::new(ImageFormat::Srgb, width, height, 16).unwrap();
        for y in 0..height as usize {
            for (x, px) in frame.row_mut(y).chunks_exact_mut(3).enumerate() {
                px.copy_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        frame
    }

    #[test]
    fn test_full_box_is_borrowed() {
        let frame = gradient(6, 4);
        let out = crop(Cow::Borrowed(&frame), &CropBox::full(6, 4), 16).unwrap();
        match out {
            Cow::Borrowed(f) => assert!(std::ptr::eq(f, &frame)),
            Cow::Owned(_) => panic!("full crop must not copy"),
        }
    }

    #[test]
    fn test_full_box_keeps_owned_frame() {
        let frame = gradient(6, 4);
        let ptr = frame.data().as_ptr();
        match crop(Cow::Owned(frame), &CropBox::full(6, 4), 16).unwrap() {
            Cow::Owned(f) => assert_eq!(f.data().as_ptr(), ptr),
            Cow::Borrowed(_) => panic!("owned source must stay owned"),
        }
    }

    #[test]
    fn test_crop_copies_region() {
        let frame = gradient(6, 4);
        let region = CropBox {
            col_start: 2,
            row_start: 1,
            width: 3,
            height: 2,
        };
        let out = crop(Cow::Borrowed(&frame), &region, 8).unwrap().into_owned();
        assert_eq!(out.width(), 3);
        assert_eq!(out.height(), 2);
        assert_eq!(out.width_step(), 16);
        assert_eq!(out.row(0), &[2, 1, 7, 3, 1, 7, 4, 1, 7]);
        assert_eq!(out.row(1), &[2, 2, 7, 3, 2, 7, 4, 2, 7]);
    }

    #[test]
    fn test_crop_16_bit() {
        let data: Vec<u8> = (0..16).collect();
        let frame = ImageFrame::from_contiguous(ImageFormat::Gray16, 4, 2, data).unwrap();
        let region = CropBox {
            col_start: 1,
            row_start: 1,
            width: 2,
            height: 1,
        };
        let out = crop_frame(&frame, &region, 1).unwrap();
        assert_eq!(out.row(0), &[10, 11, 12, 13]);
    }

    #[test]
    fn test_out_of_bounds_box() {
        let frame = gradient(6, 4);
        let region = CropBox {
            col_start: 4,
            row_start: 0,
            width: 4,
            height: 4,
        };
        assert!(matches!(
            crop(Cow::Borrowed(&frame), &region, 16),
            Err(Error::InvalidGeometry(_))
        ));
    }
}
