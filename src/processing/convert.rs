//! Colorspace conversion (planar YUV 4:2:0 to packed RGB)

use yuvutils_rs::{YuvPlanarImage, YuvRange, YuvStandardMatrix};

use crate::error::Result;
use crate::types::{ImageFormat, ImageFrame, YuvImage};

/// Fixed-point (x256) limited-range YCbCr to RGB coefficients
#[derive(Debug, Clone, Copy)]
struct Coefficients {
    y: i32,
    r_v: i32,
    g_u: i32,
    g_v: i32,
    b_u: i32,
}

const BT601: Coefficients = Coefficients {
    y: 298,
    r_v: 409,
    g_u: 100,
    g_v: 208,
    b_u: 516,
};

const BT709: Coefficients = Coefficients {
    y: 298,
    r_v: 459,
    g_u: 55,
    g_v: 136,
    b_u: 541,
};

/// YUV to RGB converter
///
/// Uses FFmpeg swscale when built with the `ffmpeg` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorspaceConverter {
    use_bt709: bool,
}

impl ColorspaceConverter {
    pub fn new(use_bt709: bool) -> Self {
        Self { use_bt709 }
    }

    /// Convert a YUV image into a new SRGB frame
    #[cfg(not(feature = "ffmpeg"))]
    pub fn convert(&self, image: &YuvImage, alignment_boundary: usize) -> Result<ImageFrame> {
        yuv_to_rgb(image, self.use_bt709, alignment_boundary)
    }

    /// Convert a YUV image into a new SRGB frame
    #[cfg(feature = "ffmpeg")]
    pub fn convert(&self, image: &YuvImage, alignment_boundary: usize) -> Result<ImageFrame> {
        super::swscale::yuv_to_rgb(image, self.use_bt709, alignment_boundary)
    }
}

/// Convert planar YUV 4:2:0 to SRGB using BT.601 or BT.709 coefficients
pub fn yuv_to_rgb(image: &YuvImage, use_bt709: bool, alignment_boundary: usize) -> Result<ImageFrame> {
    let mut out = ImageFrame::new(ImageFormat::Srgb, image.width(), image.height(), alignment_boundary)?;
    let stride = out.width_step() as u32;

    let planar = YuvPlanarImage {
        y_plane: image.plane(0),
        y_stride: image.stride(0) as u32,
        u_plane: image.plane(1),
        u_stride: image.stride(1) as u32,
        v_plane: image.plane(2),
        v_stride: image.stride(2) as u32,
        width: image.width(),
        height: image.height(),
    };
    let matrix = if use_bt709 {
        YuvStandardMatrix::Bt709
    } else {
        YuvStandardMatrix::Bt601
    };

    if let Err(e) = yuvutils_rs::yuv420_to_rgb(&planar, out.data_mut(), stride, YuvRange::Limited, matrix) {
        tracing::debug!("yuv420_to_rgb failed ({:?}), using scalar conversion", e);
        convert_rows(image, if use_bt709 { &BT709 } else { &BT601 }, &mut out);
    }
    Ok(out)
}

#[inline(always)]
fn pixel(y: u8, u: u8, v: u8, c: &Coefficients) -> [u8; 3] {
    let luma = c.y * (y as i32 - 16).max(0);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (luma + c.r_v * e + 128) >> 8;
    let g = (luma - c.g_u * d - c.g_v * e + 128) >> 8;
    let b = (luma + c.b_u * d + 128) >> 8;
    [r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8]
}

fn convert_rows(image: &YuvImage, coeffs: &Coefficients, out: &mut ImageFrame) {
    let width = image.width() as usize;
    for row in 0..image.height() as usize {
        let y_line = &image.plane(0)[row * image.stride(0)..][..width];
        let u_line = &image.plane(1)[(row / 2) * image.stride(1)..];
        let v_line = &image.plane(2)[(row / 2) * image.stride(2)..];
        let dst = out.row_mut(row);
        for (x, px) in dst.chunks_exact_mut(3).enumerate() {
            px.copy_from_slice(&pixel(y_line[x], u_line[x / 2], v_line[x / 2], coeffs));
        }
    }
}
