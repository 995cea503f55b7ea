//! Format and geometry validation

use crate::config::StageOptions;
use crate::error::{Error, Result};
use crate::processing::geometry::GeometryConfig;
use crate::types::ImageFormat;

/// How frames move between the input and output formats
///
/// Chosen once per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStrategy {
    /// SRGB in, SRGB out
    Packed,
    /// Planar YUV converted to SRGB before crop and scale
    YuvToRgb { use_bt709: bool },
    /// Planar YUV scaled directly, no crop
    YuvToYuv,
}

/// Where the fixed geometry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySource {
    Header,
    FirstFrame,
}

/// Geometry locked for the rest of the stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedGeometry {
    pub source: GeometrySource,
    pub geometry: GeometryConfig,
    pub strategy: ConversionStrategy,
}

impl FixedGeometry {
    /// Reject frames that disagree with the locked geometry
    pub fn check_frame(&self, width: u32, height: u32, format: ImageFormat) -> Result<()> {
        let g = &self.geometry;
        if width != g.input_width || height != g.input_height {
            let reason = match self.source {
                GeometrySource::Header => "the stream header",
                GeometrySource::FirstFrame => "the first frame",
            };
            return Err(Error::FrameMismatch(format!(
                "received frame of size {}x{} but {} fixed the size at {}x{}",
                width, height, reason, g.input_width, g.input_height
            )));
        }
        if format != g.input_format {
            return Err(Error::FrameMismatch(format!(
                "received frame with format {} but the stream format is {}",
                format, g.input_format
            )));
        }
        Ok(())
    }
}

/// Configuration state of a stage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ValidatorState {
    /// Waiting for a complete header or the first frame
    #[default]
    Unconfigured,
    Configured(FixedGeometry),
}

impl ValidatorState {
    pub fn fixed(&self) -> Option<&FixedGeometry> {
        match self {
            ValidatorState::Configured(fixed) => Some(fixed),
            ValidatorState::Unconfigured => None,
        }
    }

    /// Geometry was fixed by a stream header
    pub fn is_header_fixed(&self) -> bool {
        matches!(
            self,
            ValidatorState::Configured(FixedGeometry {
                source: GeometrySource::Header,
                ..
            })
        )
    }
}

/// Pick the conversion strategy for a format pair
///
/// Legal pairs are SRGB to SRGB, YUV to SRGB and YUV to YUV.
pub fn select_strategy(input: ImageFormat, output: ImageFormat, use_bt709: bool) -> Result<ConversionStrategy> {
    if !input.is_known() {
        return Err(Error::UnsupportedFormat("the input image format was UNKNOWN".into()));
    }
    if !output.is_known() {
        return Err(Error::UnsupportedFormat("the output image format was set to UNKNOWN".into()));
    }
    match (input, output) {
        (ImageFormat::Srgb, ImageFormat::Srgb) => Ok(ConversionStrategy::Packed),
        (ImageFormat::Ycbcr420p, ImageFormat::Srgb) => Ok(ConversionStrategy::YuvToRgb { use_bt709 }),
        (ImageFormat::Ycbcr420p, ImageFormat::Ycbcr420p) => Ok(ConversionStrategy::YuvToYuv),
        (from, to) => Err(Error::UnsupportedConversion { from, to }),
    }
}

/// Output format used when none is configured: same as the input
pub fn resolve_output_format(input: ImageFormat, options: &StageOptions) -> ImageFormat {
    options.output_format.unwrap_or(input)
}

/// The declared input format must agree with the `input_format` option
pub fn check_input_format(declared: ImageFormat, options: &StageOptions) -> Result<()> {
    match options.input_format {
        Some(expected) if expected != declared => Err(Error::Config(format!(
            "the input format {} does not match the input_format option {}",
            declared, expected
        ))),
        _ => Ok(()),
    }
}

/// Planar YUV output needs even dimensions
pub fn check_even_output(output: ImageFormat, options: &StageOptions) -> Result<()> {
    if output.is_planar_yuv() && !options.scale_to_multiple_of_two() {
        return Err(Error::Config(
            "YCBCR420P output always has even dimensions; enable scale_to_multiple_of_two \
             or output SRGB for odd sizes"
                .into(),
        ));
    }
    Ok(())
}

/// Checks that need only the options, run before any header or frame
pub fn check_options(options: &StageOptions) -> Result<()> {
    if options.input_format == Some(ImageFormat::Unknown) {
        return Err(Error::UnsupportedFormat("the input_format option is UNKNOWN".into()));
    }
    if let Some(output) = options.output_format {
        if !output.is_known() {
            return Err(Error::UnsupportedFormat("the output_format option is UNKNOWN".into()));
        }
        check_even_output(output, options)?;
        if let Some(input) = options.input_format {
            select_strategy(input, output, options.use_bt709())?;
        }
    }
    Ok(())
}

/// Validate a format pair and resolve its geometry
pub fn configure(
    source: GeometrySource,
    width: u32,
    height: u32,
    input_format: ImageFormat,
    options: &StageOptions,
) -> Result<FixedGeometry> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidGeometry(format!(
            "the input image did not have positive dimensions: {}x{}",
            width, height
        )));
    }
    check_input_format(input_format, options)?;
    let output_format = resolve_output_format(input_format, options);
    let strategy = select_strategy(input_format, output_format, options.use_bt709())?;
    check_even_output(output_format, options)?;

    let geometry = GeometryConfig::resolve(
        crate::types::Resolution::new(width, height),
        input_format,
        output_format,
        options,
    )?;
    if strategy == ConversionStrategy::YuvToYuv && geometry.crops() {
        return Err(Error::Config(
            "YCBCR420P to YCBCR420P only supports scaling; output SRGB to crop".into(),
        ));
    }

    Ok(FixedGeometry {
        source,
        geometry,
        strategy,
    })
}
