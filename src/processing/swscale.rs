//! Resampling kernels backed by FFmpeg swscale

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as SwsContext, Flags as SwsFlags};

use crate::error::{Error, Result};
use crate::processing::geometry::Interpolation;
use crate::processing::scale::{check_packed_pair, sharpen, Resampler};
use crate::types::{ImageFormat, ImageFrame, YuvImage};

/// Map ImageFormat to FFmpeg Pixel format
fn format_to_pixel(format: ImageFormat) -> Option<Pixel> {
    match format {
        ImageFormat::Srgb => Some(Pixel::RGB24),
        ImageFormat::Srgba => Some(Pixel::RGBA),
        ImageFormat::Gray8 => Some(Pixel::GRAY8),
        ImageFormat::Ycbcr420p => Some(Pixel::YUV420P),
        ImageFormat::Gray16 | ImageFormat::Unknown => None,
    }
}

fn interpolation_flags(interpolation: Interpolation) -> SwsFlags {
    match interpolation {
        Interpolation::Nearest => SwsFlags::POINT,
        Interpolation::Linear => SwsFlags::BILINEAR,
        Interpolation::Cubic => SwsFlags::BICUBIC,
        Interpolation::Area => SwsFlags::AREA,
        Interpolation::Lanczos => SwsFlags::LANCZOS,
    }
}

#[derive(Clone, Copy, PartialEq)]
struct ContextKey {
    pixel: Pixel,
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    flags: SwsFlags,
}

/// Resampler using FFmpeg swscale
///
/// Keeps the last scaling context; a stream with fixed geometry reuses it for
/// every frame.
pub struct SwsResampler {
    cached: Option<(ContextKey, SwsContext)>,
}

impl SwsResampler {
    pub fn new() -> Self {
        // Initialize FFmpeg once
        let _ = ffmpeg::init();
        Self { cached: None }
    }

    fn context(&mut self, key: ContextKey) -> Result<&mut SwsContext> {
        let stale = self.cached.as_ref().map(|(k, _)| *k != key).unwrap_or(true);
        if stale {
            let context = SwsContext::get(
                key.pixel,
                key.src_width,
                key.src_height,
                key.pixel,
                key.dst_width,
                key.dst_height,
                key.flags,
            )
            .map_err(|e| Error::Scaling(format!("Failed to create scaler: {}", e)))?;
            self.cached = Some((key, context));
        }
        match self.cached.as_mut() {
            Some((_, context)) => Ok(context),
            None => Err(Error::Scaling("Scaler context missing".into())),
        }
    }

    fn run_packed(&mut self, src: &ImageFrame, dst: &mut ImageFrame, flags: SwsFlags) -> Result<()> {
        check_packed_pair(src, dst)?;
        let pixel = format_to_pixel(src.format())
            .ok_or_else(|| Error::Scaling(format!("Unsupported format: {}", src.format())))?;

        let mut src_frame = ffmpeg::frame::Video::new(pixel, src.width(), src.height());
        copy_plane_in(
            src.data(),
            src.width_step(),
            src.row_bytes(),
            src.height() as usize,
            &mut src_frame,
            0,
        );
        let mut dst_frame = ffmpeg::frame::Video::new(pixel, dst.width(), dst.height());

        let key = ContextKey {
            pixel,
            src_width: src.width(),
            src_height: src.height(),
            dst_width: dst.width(),
            dst_height: dst.height(),
            flags,
        };
        self.context(key)?
            .run(&src_frame, &mut dst_frame)
            .map_err(|e| Error::Scaling(format!("Scaling failed: {}", e)))?;

        let row_bytes = dst.row_bytes();
        for y in 0..dst.height() as usize {
            let start = y * dst_frame.stride(0);
            dst.row_mut(y)
                .copy_from_slice(&dst_frame.data(0)[start..start + row_bytes]);
        }
        Ok(())
    }
}

impl Default for SwsResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler for SwsResampler {
    fn downscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, sharpening: f32) -> Result<()> {
        self.run_packed(src, dst, SwsFlags::AREA)?;
        if sharpening > 0.0 {
            sharpen(dst, sharpening);
        }
        Ok(())
    }

    fn upscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, interpolation: Interpolation) -> Result<()> {
        self.run_packed(src, dst, interpolation_flags(interpolation))
    }

    fn scale_i420(&mut self, src: &YuvImage, dst: &mut YuvImage) -> Result<()> {
        let shrinking = src.width() >= dst.width() && src.height() >= dst.height();
        let flags = if shrinking { SwsFlags::AREA } else { SwsFlags::BILINEAR };

        let mut src_frame = ffmpeg::frame::Video::new(Pixel::YUV420P, src.width(), src.height());
        copy_yuv_in(src, &mut src_frame);
        let mut dst_frame = ffmpeg::frame::Video::new(Pixel::YUV420P, dst.width(), dst.height());

        let key = ContextKey {
            pixel: Pixel::YUV420P,
            src_width: src.width(),
            src_height: src.height(),
            dst_width: dst.width(),
            dst_height: dst.height(),
            flags,
        };
        self.context(key)?
            .run(&src_frame, &mut dst_frame)
            .map_err(|e| Error::Scaling(format!("Scaling failed: {}", e)))?;

        let dst_rows = [
            (dst.width() as usize, dst.height() as usize),
            (dst.chroma_width() as usize, dst.chroma_height() as usize),
            (dst.chroma_width() as usize, dst.chroma_height() as usize),
        ];
        for (plane, (w, h)) in dst_rows.iter().enumerate() {
            let src_stride = dst_frame.stride(plane);
            let dst_stride = dst.stride(plane);
            let data = dst_frame.data(plane);
            let out = dst.plane_mut(plane);
            for y in 0..*h {
                out[y * dst_stride..y * dst_stride + w]
                    .copy_from_slice(&data[y * src_stride..y * src_stride + w]);
            }
        }
        Ok(())
    }
}

/// Convert planar YUV 4:2:0 to SRGB with swscale
pub fn yuv_to_rgb(image: &YuvImage, use_bt709: bool, alignment_boundary: usize) -> Result<ImageFrame> {
    let _ = ffmpeg::init();
    let (width, height) = (image.width(), image.height());
    let mut converter = SwsContext::get(
        Pixel::YUV420P,
        width,
        height,
        Pixel::RGB24,
        width,
        height,
        SwsFlags::BILINEAR,
    )
    .map_err(|e| Error::Scaling(format!("Failed to create converter: {}", e)))?;
    set_yuv_matrix(&mut converter, use_bt709);

    let mut src_frame = ffmpeg::frame::Video::new(Pixel::YUV420P, width, height);
    copy_yuv_in(image, &mut src_frame);
    let mut dst_frame = ffmpeg::frame::Video::new(Pixel::RGB24, width, height);
    converter
        .run(&src_frame, &mut dst_frame)
        .map_err(|e| Error::Scaling(format!("Conversion failed: {}", e)))?;

    let mut out = ImageFrame::new(ImageFormat::Srgb, width, height, alignment_boundary)?;
    let row_bytes = out.row_bytes();
    for y in 0..height as usize {
        let start = y * dst_frame.stride(0);
        out.row_mut(y)
            .copy_from_slice(&dst_frame.data(0)[start..start + row_bytes]);
    }
    Ok(out)
}

/// Limited-range input, full-range RGB output, BT.601 or BT.709 matrix
fn set_yuv_matrix(converter: &mut SwsContext, use_bt709: bool) {
    let colorspace = if use_bt709 {
        ffmpeg::ffi::SWS_CS_ITU709
    } else {
        ffmpeg::ffi::SWS_CS_ITU601
    };
    // SAFETY: the context pointer is owned by `converter` and valid here;
    // sws_getCoefficients returns a pointer to a static table.
    unsafe {
        let table = ffmpeg::ffi::sws_getCoefficients(colorspace as std::os::raw::c_int);
        ffmpeg::ffi::sws_setColorspaceDetails(converter.as_mut_ptr(), table, 0, table, 1, 0, 1 << 16, 1 << 16);
    }
}

fn copy_yuv_in(image: &YuvImage, frame: &mut ffmpeg::frame::Video) {
    let rows = [
        (image.width() as usize, image.height() as usize),
        (image.chroma_width() as usize, image.chroma_height() as usize),
        (image.chroma_width() as usize, image.chroma_height() as usize),
    ];
    for (plane, (w, h)) in rows.iter().enumerate() {
        copy_plane_in(image.plane(plane), image.stride(plane), *w, *h, frame, plane);
    }
}

/// Copy `height` rows of `row_bytes` into plane `index` of an FFmpeg frame
fn copy_plane_in(
    input: &[u8],
    input_stride: usize,
    row_bytes: usize,
    height: usize,
    frame: &mut ffmpeg::frame::Video,
    index: usize,
) {
    let frame_stride = frame.stride(index);
    let plane = frame.data_mut(index);
    for y in 0..height {
        let src_start = y * input_stride;
        let dst_start = y * frame_stride;
        plane[dst_start..dst_start + row_bytes].copy_from_slice(&input[src_start..src_start + row_bytes]);
    }
}
