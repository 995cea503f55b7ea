//! Crop window and output size calculation

use crate::config::{ScaleAlgorithm, StageOptions};
use crate::error::{Error, Result};
use crate::types::{ImageFormat, Resolution};

/// Slack for float products that should land on an integer
const EPSILON: f64 = 1e-9;

/// Sub-rectangle of a source frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropBox {
    pub col_start: u32,
    pub row_start: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    /// Box covering the whole frame
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            col_start: 0,
            row_start: 0,
            width,
            height,
        }
    }

    /// Box equals the bounds of a `width` x `height` frame
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }

    /// Box lies inside a `width` x `height` frame and is non-empty
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.col_start as u64 + self.width as u64 <= width as u64
            && self.row_start as u64 + self.height as u64 <= height as u64
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Interpolation kernel for enlarging frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Area,
    /// Lanczos with a 4-lobe window
    Lanczos,
}

/// Upscaling behaviour selected by the configured algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpscalePolicy {
    Interpolate(Interpolation),
    /// Output is clamped to the crop size
    Disabled,
}

/// Map the configured algorithm onto an upscaling policy
pub fn select_algorithm(algorithm: ScaleAlgorithm) -> UpscalePolicy {
    match algorithm {
        ScaleAlgorithm::Default | ScaleAlgorithm::Cubic => UpscalePolicy::Interpolate(Interpolation::Cubic),
        ScaleAlgorithm::Linear => UpscalePolicy::Interpolate(Interpolation::Linear),
        ScaleAlgorithm::Area => UpscalePolicy::Interpolate(Interpolation::Area),
        ScaleAlgorithm::Lanczos => UpscalePolicy::Interpolate(Interpolation::Lanczos),
        ScaleAlgorithm::DefaultWithoutUpscale => UpscalePolicy::Disabled,
    }
}

/// Compute a centered crop box that brings the aspect ratio within bounds
///
/// Both bounds must be set for any cropping to happen. With `even` set the
/// cropped dimension is rounded down to an even value.
pub fn compute_crop_box(
    input_width: u32,
    input_height: u32,
    min_aspect_ratio: Option<f64>,
    max_aspect_ratio: Option<f64>,
    even: bool,
) -> Result<CropBox> {
    if input_width == 0 || input_height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "input dimensions must be positive, got {}x{}",
            input_width, input_height
        )));
    }
    for (name, bound) in [("min", min_aspect_ratio), ("max", max_aspect_ratio)] {
        if let Some(value) = bound {
            if !(value > 0.0) {
                return Err(Error::InvalidGeometry(format!(
                    "{}_aspect_ratio must be positive, got {}",
                    name, value
                )));
            }
        }
    }
    let (min_ar, max_ar) = match (min_aspect_ratio, max_aspect_ratio) {
        (Some(min), Some(max)) => (min, max),
        _ => return Ok(CropBox::full(input_width, input_height)),
    };
    if min_ar > max_ar {
        return Err(Error::InvalidGeometry(format!(
            "min_aspect_ratio {} exceeds max_aspect_ratio {}",
            min_ar, max_ar
        )));
    }

    let mut crop_width = input_width;
    let mut crop_height = input_height;
    let aspect = input_width as f64 / input_height as f64;
    if aspect < min_ar {
        crop_height = ((input_width as f64 / min_ar) + EPSILON).floor() as u32;
        if even {
            crop_height &= !1;
        }
    } else if aspect > max_ar {
        crop_width = ((input_height as f64 * max_ar) + EPSILON).floor() as u32;
        if even {
            crop_width &= !1;
        }
    }
    let crop_width = crop_width.min(input_width);
    let crop_height = crop_height.min(input_height);
    if crop_width == 0 || crop_height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "aspect ratio bounds [{}, {}] leave an empty crop of {}x{}",
            min_ar, max_ar, input_width, input_height
        )));
    }

    Ok(CropBox {
        col_start: (input_width - crop_width) / 2,
        row_start: (input_height - crop_height) / 2,
        width: crop_width,
        height: crop_height,
    })
}

/// Compute output dimensions for a crop of `crop_width` x `crop_height`
pub fn compute_output_size(
    crop_width: u32,
    crop_height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
    preserve_aspect_ratio: bool,
    to_multiple_of_two: bool,
) -> Result<(u32, u32)> {
    let target_width = target_width.filter(|w| *w > 0);
    let target_height = target_height.filter(|h| *h > 0);
    let cw = crop_width as u64;
    let ch = crop_height as u64;

    let (width, height) = match (target_width, target_height) {
        (None, None) => (crop_width, crop_height),
        (tw, th) if !preserve_aspect_ratio => (tw.unwrap_or(crop_width), th.unwrap_or(crop_height)),
        (Some(tw), None) => (tw, (tw as u64 * ch / cw.max(1)) as u32),
        (None, Some(th)) => ((th as u64 * cw / ch.max(1)) as u32, th),
        (Some(tw), Some(th)) => {
            // Width-limited first, height-limited when that overflows the box.
            let fit_height = (tw as u64 * ch / cw.max(1)) as u32;
            if fit_height <= th {
                (tw, fit_height)
            } else {
                ((th as u64 * cw / ch.max(1)) as u32, th)
            }
        }
    };

    let (width, height) = if to_multiple_of_two {
        (width & !1, height & !1)
    } else {
        (width, height)
    };
    if width == 0 || height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "unable to derive a positive output size from crop {}x{} (got {}x{})",
            crop_width, crop_height, width, height
        )));
    }
    Ok((width, height))
}

/// Resolved geometry for one stream configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub input_format: ImageFormat,
    pub crop: CropBox,
    pub output_width: u32,
    pub output_height: u32,
    pub output_format: ImageFormat,
    pub upscale: UpscalePolicy,
}

impl GeometryConfig {
    /// Resolve crop, output size and algorithm for the given input
    pub fn resolve(
        input: Resolution,
        input_format: ImageFormat,
        output_format: ImageFormat,
        options: &StageOptions,
    ) -> Result<Self> {
        let crop = compute_crop_box(
            input.width,
            input.height,
            options.min_aspect_ratio,
            options.max_aspect_ratio,
            input_format.is_planar_yuv(),
        )?;
        let even = options.scale_to_multiple_of_two();
        let (mut output_width, mut output_height) = compute_output_size(
            crop.width,
            crop.height,
            options.target_width(),
            options.target_height(),
            options.preserve_aspect_ratio(),
            even,
        )?;

        let upscale = select_algorithm(options.algorithm());
        if upscale == UpscalePolicy::Disabled
            && (output_width > crop.width || output_height > crop.height)
        {
            output_width = crop.width;
            output_height = crop.height;
            if even {
                output_width &= !1;
                output_height &= !1;
            }
            if output_width == 0 || output_height == 0 {
                return Err(Error::InvalidGeometry(format!(
                    "crop {}x{} is too small for even output without upscaling",
                    crop.width, crop.height
                )));
            }
        }

        Ok(Self {
            input_width: input.width,
            input_height: input.height,
            input_format,
            crop,
            output_width,
            output_height,
            output_format,
            upscale,
        })
    }

    pub fn input(&self) -> Resolution {
        Resolution::new(self.input_width, self.input_height)
    }

    pub fn output(&self) -> Resolution {
        Resolution::new(self.output_width, self.output_height)
    }

    /// Crop box is smaller than the input
    pub fn crops(&self) -> bool {
        !self.crop.is_full(self.input_width, self.input_height)
    }

    /// Output differs from the crop size
    pub fn rescales(&self) -> bool {
        self.crop.width != self.output_width || self.crop.height != self.output_height
    }
}
