//! Frame scaling

use std::borrow::Cow;

use fast_image_resize as fr;

use crate::error::{Error, Result};
use crate::processing::geometry::{Interpolation, UpscalePolicy};
use crate::types::{ImageFormat, ImageFrame, YuvImage};

/// Resampling kernels used by the rescaler
///
/// Implementations write into a destination that is already allocated at the
/// target size and format.
pub trait Resampler {
    /// Shrink `src` into `dst` with an area filter, then sharpen by `sharpening`
    fn downscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, sharpening: f32) -> Result<()>;

    /// Enlarge `src` into `dst` with the given interpolation kernel
    fn upscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, interpolation: Interpolation) -> Result<()>;

    /// Scale every plane of a YUV 4:2:0 image with a box filter
    fn scale_i420(&mut self, src: &YuvImage, dst: &mut YuvImage) -> Result<()>;
}

/// Direction a resize went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    /// Output is no larger than the source in either axis
    Down,
    /// Output is larger than the source in at least one axis
    Up,
}

impl ScaleDirection {
    fn between(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
        if src_w >= dst_w && src_h >= dst_h {
            ScaleDirection::Down
        } else {
            ScaleDirection::Up
        }
    }
}

/// Parameters for [`resize`]
#[derive(Debug, Clone, Copy)]
pub struct ResizeParams {
    pub upscale: UpscalePolicy,
    pub sharpening: f32,
    pub alignment_boundary: usize,
}

/// Resize a packed frame to `width` x `height`
pub fn resize<R: Resampler + ?Sized>(
    resampler: &mut R,
    frame: &ImageFrame,
    width: u32,
    height: u32,
    params: &ResizeParams,
) -> Result<(ImageFrame, ScaleDirection)> {
    let mut output = ImageFrame::new(frame.format(), width, height, params.alignment_boundary)?;
    let direction = ScaleDirection::between(frame.width(), frame.height(), width, height);
    match (direction, params.upscale) {
        (ScaleDirection::Down, _) => resampler.downscale(frame, &mut output, params.sharpening)?,
        (ScaleDirection::Up, UpscalePolicy::Interpolate(interpolation)) => {
            resampler.upscale(frame, &mut output, interpolation)?
        }
        (ScaleDirection::Up, UpscalePolicy::Disabled) => {
            return Err(Error::Scaling(format!(
                "upscaling {}x{} to {}x{} is disabled",
                frame.width(),
                frame.height(),
                width,
                height
            )))
        }
    }
    tracing::trace!(
        "Resized {}x{} -> {}x{} ({:?})",
        frame.width(),
        frame.height(),
        width,
        height,
        direction
    );
    Ok((output, direction))
}

/// Resize a YUV 4:2:0 image plane by plane
pub fn resize_i420<R: Resampler + ?Sized>(
    resampler: &mut R,
    image: &YuvImage,
    width: u32,
    height: u32,
) -> Result<(YuvImage, ScaleDirection)> {
    if width % 2 != 0 || height % 2 != 0 {
        return Err(Error::Scaling(format!(
            "YUV output dimensions must be even, got {}x{}",
            width, height
        )));
    }
    let mut output = YuvImage::new(width, height)?;
    resampler.scale_i420(image, &mut output)?;
    Ok((
        output,
        ScaleDirection::between(image.width(), image.height(), width, height),
    ))
}

/// CPU resampler backed by `fast_image_resize`
pub struct CpuResampler {
    resizer: fr::Resizer,
}

impl CpuResampler {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    /// Resize tightly packed `src` pixels into a new buffer
    fn run(
        &mut self,
        src: &[u8],
        (src_width, src_height): (u32, u32),
        (dst_width, dst_height): (u32, u32),
        pixel: fr::PixelType,
        algorithm: fr::ResizeAlg,
    ) -> Result<fr::images::Image<'static>> {
        let src_image = fr::images::ImageRef::new(src_width, src_height, src, pixel)
            .map_err(|e| Error::Scaling(format!("Invalid source buffer: {}", e)))?;
        let mut dst_image = fr::images::Image::new(dst_width, dst_height, pixel);
        let options = fr::ResizeOptions::new().resize_alg(algorithm);
        self.resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| Error::Scaling(format!("Resize failed: {}", e)))?;
        Ok(dst_image)
    }

    fn resize_packed(&mut self, src: &ImageFrame, dst: &mut ImageFrame, algorithm: fr::ResizeAlg) -> Result<()> {
        check_packed_pair(src, dst)?;
        let pixel = pixel_type(src.format())?;
        let packed: Cow<'_, [u8]> = if src.is_contiguous() {
            Cow::Borrowed(&src.data()[..src.row_bytes() * src.height() as usize])
        } else {
            Cow::Owned(src.to_contiguous_vec())
        };

        let out = self.run(
            &packed,
            (src.width(), src.height()),
            (dst.width(), dst.height()),
            pixel,
            algorithm,
        )?;
        let row_bytes = dst.row_bytes();
        for (y, line) in out.buffer().chunks_exact(row_bytes).enumerate() {
            dst.row_mut(y).copy_from_slice(line);
        }
        Ok(())
    }
}

impl Default for CpuResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for CpuResampler {
    fn downscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, sharpening: f32) -> Result<()> {
        self.resize_packed(src, dst, fr::ResizeAlg::Convolution(fr::FilterType::Box))?;
        if sharpening > 0.0 {
            sharpen(dst, sharpening);
        }
        Ok(())
    }

    fn upscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, interpolation: Interpolation) -> Result<()> {
        self.resize_packed(src, dst, resize_alg(interpolation))
    }

    fn scale_i420(&mut self, src: &YuvImage, dst: &mut YuvImage) -> Result<()> {
        let shrinking = src.width() >= dst.width() && src.height() >= dst.height();
        let filter = if shrinking {
            fr::FilterType::Box
        } else {
            fr::FilterType::Bilinear
        };
        let dims = |img: &YuvImage, plane: usize| {
            if plane == 0 {
                (img.width(), img.height())
            } else {
                (img.chroma_width(), img.chroma_height())
            }
        };

        for plane in 0..3 {
            let (sw, sh) = dims(src, plane);
            let (dw, dh) = dims(dst, plane);
            let packed = packed_plane(src.plane(plane), src.stride(plane), sw as usize, sh as usize);
            let out = self.run(&packed, (sw, sh), (dw, dh), fr::PixelType::U8, fr::ResizeAlg::Convolution(filter))?;

            let stride = dst.stride(plane);
            let target = dst.plane_mut(plane);
            for (y, line) in out.buffer().chunks_exact(dw as usize).enumerate() {
                target[y * stride..y * stride + dw as usize].copy_from_slice(line);
            }
        }
        Ok(())
    }
}

fn pixel_type(format: ImageFormat) -> Result<fr::PixelType> {
    match format {
        ImageFormat::Srgb => Ok(fr::PixelType::U8x3),
        ImageFormat::Srgba => Ok(fr::PixelType::U8x4),
        ImageFormat::Gray8 => Ok(fr::PixelType::U8),
        other => Err(Error::Scaling(format!("Unsupported format: {}", other))),
    }
}

fn resize_alg(interpolation: Interpolation) -> fr::ResizeAlg {
    match interpolation {
        Interpolation::Nearest => fr::ResizeAlg::Nearest,
        // Area enlarges like linear
        Interpolation::Linear | Interpolation::Area => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
        Interpolation::Cubic => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        Interpolation::Lanczos => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
    }
}

fn packed_plane(data: &[u8], stride: usize, width: usize, height: usize) -> Cow<'_, [u8]> {
    if stride == width {
        return Cow::Borrowed(&data[..width * height]);
    }
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        out.extend_from_slice(&data[y * stride..y * stride + width]);
    }
    Cow::Owned(out)
}

pub(crate) fn check_packed_pair(src: &ImageFrame, dst: &ImageFrame) -> Result<()> {
    if src.format() != dst.format() {
        return Err(Error::Scaling(format!(
            "source format {} does not match destination format {}",
            src.format(),
            dst.format()
        )));
    }
    if src.byte_depth() != 1 {
        return Err(Error::Scaling(format!(
            "only 8-bit formats can be resampled, got {}",
            src.format()
        )));
    }
    Ok(())
}

/// Unsharp mask against a 3x3 box blur
pub(crate) fn sharpen(frame: &mut ImageFrame, amount: f32) {
    let source = frame.clone();
    let channels = frame.channels();
    let (w, h) = (frame.width() as usize, frame.height() as usize);

    for y in 0..h {
        let rows = [y.saturating_sub(1), y, (y + 1).min(h - 1)];
        let out = frame.row_mut(y);
        for x in 0..w {
            let cols = [x.saturating_sub(1), x, (x + 1).min(w - 1)];
            for c in 0..channels {
                let mut sum = 0u32;
                for &ry in &rows {
                    let line = source.row(ry);
                    for &cx in &cols {
                        sum += line[cx * channels + c] as u32;
                    }
                }
                let blurred = sum as f32 / 9.0;
                let original = source.row(y)[x * channels + c] as f32;
                let value = original + amount * (original - blurred);
                out[x * channels + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
