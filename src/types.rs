//! Common types used throughout GhostScale

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of an image or stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageFormat {
    /// Not declared
    #[default]
    Unknown,
    /// Packed 8-bit RGB
    Srgb,
    /// Packed 8-bit RGBA
    Srgba,
    /// Single channel 8-bit
    Gray8,
    /// Single channel 16-bit
    Gray16,
    /// Planar YUV 4:2:0 (Y plane + half-resolution U and V planes)
    Ycbcr420p,
}

impl ImageFormat {
    /// Channels per pixel for packed formats
    pub fn channels(&self) -> Option<usize> {
        match self {
            ImageFormat::Srgb => Some(3),
            ImageFormat::Srgba => Some(4),
            ImageFormat::Gray8 | ImageFormat::Gray16 => Some(1),
            ImageFormat::Unknown | ImageFormat::Ycbcr420p => None,
        }
    }

    /// Bytes per channel sample
    pub fn byte_depth(&self) -> usize {
        match self {
            ImageFormat::Gray16 => 2,
            _ => 1,
        }
    }

    /// Bytes per pixel for packed formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        self.channels().map(|c| c * self.byte_depth())
    }

    pub fn is_planar_yuv(&self) -> bool {
        matches!(self, ImageFormat::Ycbcr420p)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ImageFormat::Unknown)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Unknown => "UNKNOWN",
            ImageFormat::Srgb => "SRGB",
            ImageFormat::Srgba => "SRGBA",
            ImageFormat::Gray8 => "GRAY8",
            ImageFormat::Gray16 => "GRAY16",
            ImageFormat::Ycbcr420p => "YCBCR420P",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "srgb" | "rgb" | "rgb24" => Ok(ImageFormat::Srgb),
            "srgba" | "rgba" => Ok(ImageFormat::Srgba),
            "gray8" | "gray" => Ok(ImageFormat::Gray8),
            "gray16" => Ok(ImageFormat::Gray16),
            "ycbcr420p" | "yuv420p" | "i420" => Ok(ImageFormat::Ycbcr420p),
            other => Err(Error::UnsupportedFormat(format!("unknown format name: {}", other))),
        }
    }
}

/// Round `value` up to the next multiple of `boundary`
pub(crate) fn align_up(value: usize, boundary: usize) -> usize {
    if boundary <= 1 {
        value
    } else {
        value.div_ceil(boundary) * boundary
    }
}

/// A packed image frame
///
/// Rows are `width_step` bytes apart. The bytes between the end of a row's
/// pixels and the next row are alignment padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFrame {
    format: ImageFormat,
    width: u32,
    height: u32,
    width_step: usize,
    data: Vec<u8>,
}

impl ImageFrame {
    /// Allocate a zeroed frame whose rows are padded to `alignment_boundary` bytes
    pub fn new(format: ImageFormat, width: u32, height: u32, alignment_boundary: usize) -> Result<Self> {
        let row_bytes = packed_row_bytes(format, width, height)?;
        let width_step = align_up(row_bytes, alignment_boundary);
        Ok(Self {
            format,
            width,
            height,
            width_step,
            data: vec![0u8; width_step * height as usize],
        })
    }

    /// Wrap existing pixel data with an explicit row stride
    pub fn from_data(
        format: ImageFormat,
        width: u32,
        height: u32,
        width_step: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let row_bytes = packed_row_bytes(format, width, height)?;
        if width_step < row_bytes {
            return Err(Error::InvalidGeometry(format!(
                "stride {} is smaller than row size {}",
                width_step, row_bytes
            )));
        }
        let required = width_step * height as usize;
        if data.len() < required {
            return Err(Error::InvalidGeometry(format!(
                "buffer of {} bytes is too small for {}x{} {} (need {})",
                data.len(),
                width,
                height,
                format,
                required
            )));
        }
        Ok(Self {
            format,
            width,
            height,
            width_step,
            data,
        })
    }

    /// Wrap tightly packed pixel data
    pub fn from_contiguous(format: ImageFormat, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let row_bytes = packed_row_bytes(format, width, height)?;
        Self::from_data(format, width, height, row_bytes, data)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes
    pub fn width_step(&self) -> usize {
        self.width_step
    }

    pub fn channels(&self) -> usize {
        self.format.channels().unwrap_or(0)
    }

    pub fn byte_depth(&self) -> usize {
        self.format.byte_depth()
    }

    /// Logical bytes per row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels() * self.byte_depth()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel bytes of row `y`, excluding padding
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width_step;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.width_step;
        let len = self.row_bytes();
        &mut self.data[start..start + len]
    }

    /// No padding between rows
    pub fn is_contiguous(&self) -> bool {
        self.width_step == self.row_bytes()
    }

    /// Row stride is a multiple of `boundary`
    pub fn is_aligned(&self, boundary: usize) -> bool {
        boundary <= 1 || self.width_step % boundary == 0
    }

    /// Copy into a new frame whose rows are padded to `alignment_boundary`
    pub fn aligned_copy(&self, alignment_boundary: usize) -> Result<Self> {
        let mut out = Self::new(self.format, self.width, self.height, alignment_boundary)?;
        for y in 0..self.height as usize {
            out.row_mut(y).copy_from_slice(self.row(y));
        }
        Ok(out)
    }

    /// Zero the padding bytes at the end of every row
    pub fn set_alignment_padding_areas(&mut self) {
        let row_bytes = self.row_bytes();
        if self.width_step == row_bytes {
            return;
        }
        for row in self.data.chunks_exact_mut(self.width_step) {
            row[row_bytes..].fill(0);
        }
    }

    /// Tightly packed copy of the pixel data
    pub fn to_contiguous_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height as usize {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

fn packed_row_bytes(format: ImageFormat, width: u32, height: u32) -> Result<usize> {
    let bpp = format.bytes_per_pixel().ok_or_else(|| {
        Error::UnsupportedFormat(format!("{} is not a packed image format", format))
    })?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(width as usize * bpp)
}

/// A planar YUV 4:2:0 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {
    width: u32,
    height: u32,
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
}

impl YuvImage {
    /// Allocate a zeroed, tightly packed image
    pub fn new(width: u32, height: u32) -> Result<Self> {
        check_yuv_dims(width, height)?;
        let (cw, ch) = chroma_dims(width, height);
        let y_size = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            planes: [vec![0u8; y_size], vec![0u8; cw * ch], vec![0u8; cw * ch]],
            strides: [width as usize, cw, cw],
        })
    }

    /// Wrap separate planes with explicit strides
    pub fn from_planes(width: u32, height: u32, planes: [Vec<u8>; 3], strides: [usize; 3]) -> Result<Self> {
        check_yuv_dims(width, height)?;
        let (cw, ch) = chroma_dims(width, height);
        let dims = [(width as usize, height as usize), (cw, ch), (cw, ch)];
        for (i, (w, h)) in dims.iter().enumerate() {
            if strides[i] < *w {
                return Err(Error::InvalidGeometry(format!(
                    "plane {} stride {} is smaller than plane width {}",
                    i, strides[i], w
                )));
            }
            if planes[i].len() < strides[i] * h {
                return Err(Error::InvalidGeometry(format!(
                    "plane {} holds {} bytes, need {}",
                    i,
                    planes[i].len(),
                    strides[i] * h
                )));
            }
        }
        Ok(Self {
            width,
            height,
            planes,
            strides,
        })
    }

    /// Split a contiguous I420 buffer (Y, then U, then V) into planes
    pub fn from_i420(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        check_yuv_dims(width, height)?;
        let (cw, ch) = chroma_dims(width, height);
        let y_size = width as usize * height as usize;
        let c_size = cw * ch;
        if data.len() < y_size + 2 * c_size {
            return Err(Error::InvalidGeometry(format!(
                "I420 buffer of {} bytes is too small for {}x{}",
                data.len(),
                width,
                height
            )));
        }
        let planes = [
            data[..y_size].to_vec(),
            data[y_size..y_size + c_size].to_vec(),
            data[y_size + c_size..y_size + 2 * c_size].to_vec(),
        ];
        Self::from_planes(width, height, planes, [width as usize, cw, cw])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Chroma plane width, `ceil(width / 2)`
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    /// Chroma plane height, `ceil(height / 2)`
    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    /// Plane 0 is Y, 1 is U, 2 is V
    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }

    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        &mut self.planes[index]
    }

    pub fn stride(&self, index: usize) -> usize {
        self.strides[index]
    }

    /// Serialize to a contiguous I420 buffer
    pub fn to_i420_vec(&self) -> Vec<u8> {
        let (cw, ch) = chroma_dims(self.width, self.height);
        let dims = [(self.width as usize, self.height as usize), (cw, ch), (cw, ch)];
        let mut out = Vec::with_capacity(dims.iter().map(|(w, h)| w * h).sum());
        for (i, (w, h)) in dims.iter().enumerate() {
            for row in 0..*h {
                let start = row * self.strides[i];
                out.extend_from_slice(&self.planes[i][start..start + w]);
            }
        }
        out
    }
}

fn check_yuv_dims(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "YUV image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// A frame delivered to the stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFrame {
    Image(ImageFrame),
    Yuv(YuvImage),
}

impl InputFrame {
    pub fn width(&self) -> u32 {
        match self {
            InputFrame::Image(f) => f.width(),
            InputFrame::Yuv(f) => f.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            InputFrame::Image(f) => f.height(),
            InputFrame::Yuv(f) => f.height(),
        }
    }

    pub fn format(&self) -> ImageFormat {
        match self {
            InputFrame::Image(f) => f.format(),
            InputFrame::Yuv(_) => ImageFormat::Ycbcr420p,
        }
    }
}

impl From<ImageFrame> for InputFrame {
    fn from(frame: ImageFrame) -> Self {
        InputFrame::Image(frame)
    }
}

impl From<YuvImage> for InputFrame {
    fn from(image: YuvImage) -> Self {
        InputFrame::Yuv(image)
    }
}

/// Stream level metadata delivered before the first frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StreamHeader {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Frames per second, 0.0 when unknown
    #[serde(default)]
    pub frame_rate: f64,
}

impl StreamHeader {
    pub fn new(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            frame_rate: 0.0,
        }
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = fps;
        self
    }

    /// Carries enough information to fix the stream geometry
    pub fn is_complete(&self) -> bool {
        self.width > 0 && self.height > 0 && self.format.is_known()
    }
}

/// Counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounters {
    /// Data frames received
    pub inputs: u64,
    /// Frames that were cropped
    pub crops: u64,
    /// Frames resampled to a smaller or equal size
    pub downscales: u64,
    /// Frames resampled to a larger size
    pub upscales: u64,
    /// Frames whose alignment padding was cleared after rescaling
    pub pads: u64,
    /// Frames emitted after a rescale
    pub outputs_scaled: u64,
    /// Frames emitted after crop or conversion only
    pub outputs_cropped: u64,
    /// Input frames emitted untouched
    pub outputs_inputs: u64,
    /// Input frames emitted as a re-aligned copy
    pub outputs_aligned: u64,
}

impl StageCounters {
    /// Total frames emitted
    pub fn outputs(&self) -> u64 {
        self.outputs_scaled + self.outputs_cropped + self.outputs_inputs + self.outputs_aligned
    }
}
