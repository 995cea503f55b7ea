//! Crop-and-scale stream stage
//!
//! Drives one stream: resolves options, fixes geometry from a header or the
//! first frame, then crops, converts and rescales every frame against it.
//!
//! ```rust
//! use ghostscale::{ImageFormat, ImageFrame, InputFrame, ScaleStage, StageOptions, StreamPorts};
//!
//! # fn main() -> ghostscale::Result<()> {
//! let options = StageOptions::default()
//!     .with_aspect_ratio_bounds(1.0, 1.0)
//!     .with_target_size(320, 320)
//!     .with_preserve_aspect_ratio(true)
//!     .with_multiple_of_two(true);
//! let mut stage = ScaleStage::new(options, StreamPorts::default())?;
//!
//! let frame = InputFrame::from(ImageFrame::new(ImageFormat::Srgb, 640, 480, 16)?);
//! let output = stage.process(&frame)?;
//! assert_eq!((output.width(), output.height()), (320, 320));
//! # Ok(())
//! # }
//! ```

pub mod validate;

use std::borrow::Cow;

use crate::config::StageOptions;
use crate::error::{Error, Result};
use crate::processing::convert::ColorspaceConverter;
use crate::processing::crop::crop;
use crate::processing::geometry::GeometryConfig;
use crate::processing::scale::{resize, resize_i420, CpuResampler, Resampler, ResizeParams, ScaleDirection};
use crate::types::{ImageFormat, ImageFrame, InputFrame, StageCounters, StreamHeader, YuvImage};

pub use validate::{ConversionStrategy, FixedGeometry, GeometrySource, ValidatorState};

/// Optional channels wired to a stage
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPorts {
    /// Header attached to the main input stream
    pub header: Option<StreamHeader>,
    /// An override options packet arrives at stream start
    pub override_options: bool,
    /// Emit the derived output header once geometry is known
    pub header_output: bool,
}

impl StreamPorts {
    pub fn with_header(mut self, header: StreamHeader) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_override_options(mut self) -> Self {
        self.override_options = true;
        self
    }

    pub fn with_header_output(mut self) -> Self {
        self.header_output = true;
        self
    }
}

/// Packets available at the start-of-stream position
#[derive(Debug, Clone, Default)]
pub struct StreamStart {
    pub override_options: Option<StageOptions>,
    pub header: Option<StreamHeader>,
}

/// A frame produced by the stage
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFrame<'a> {
    /// Packed output; `Cow::Borrowed` when the input passed through untouched
    Image(Cow<'a, ImageFrame>),
    /// Planar output; `Cow::Borrowed` when the size is unchanged
    Yuv(Cow<'a, YuvImage>),
}

impl OutputFrame<'_> {
    pub fn width(&self) -> u32 {
        match self {
            OutputFrame::Image(f) => f.width(),
            OutputFrame::Yuv(f) => f.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            OutputFrame::Image(f) => f.height(),
            OutputFrame::Yuv(f) => f.height(),
        }
    }

    pub fn format(&self) -> ImageFormat {
        match self {
            OutputFrame::Image(f) => f.format(),
            OutputFrame::Yuv(_) => ImageFormat::Ycbcr420p,
        }
    }

    /// The input buffer is emitted without a copy
    pub fn is_pass_through(&self) -> bool {
        matches!(
            self,
            OutputFrame::Image(Cow::Borrowed(_)) | OutputFrame::Yuv(Cow::Borrowed(_))
        )
    }

    pub fn as_image(&self) -> Option<&ImageFrame> {
        match self {
            OutputFrame::Image(f) => Some(f),
            OutputFrame::Yuv(_) => None,
        }
    }

    pub fn as_yuv(&self) -> Option<&YuvImage> {
        match self {
            OutputFrame::Yuv(f) => Some(f),
            OutputFrame::Image(_) => None,
        }
    }

    /// Raw bytes: tightly packed pixels or contiguous I420
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            OutputFrame::Image(f) => f.to_contiguous_vec(),
            OutputFrame::Yuv(f) => f.to_i420_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Start-of-stream packets may still arrive
    Open,
    Started,
    Running,
    /// A fatal error was returned; every later call fails
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HeaderPort {
    Absent,
    Waiting,
    Ready(StreamHeader),
    Sent,
}

/// Crop-and-scale stage for one stream
pub struct ScaleStage<R: Resampler = CpuResampler> {
    options: StageOptions,
    has_override_port: bool,
    state: ValidatorState,
    phase: Phase,
    header_template: StreamHeader,
    stream_header: Option<StreamHeader>,
    header_port: HeaderPort,
    resampler: R,
    counters: StageCounters,
}

impl ScaleStage<CpuResampler> {
    /// Open a stage with the CPU resampler
    pub fn new(options: StageOptions, ports: StreamPorts) -> Result<Self> {
        Self::with_resampler(options, ports, CpuResampler::new())
    }
}

impl<R: Resampler> ScaleStage<R> {
    /// Open a stage with a custom resampler
    pub fn with_resampler(options: StageOptions, ports: StreamPorts, resampler: R) -> Result<Self> {
        let mut stage = Self {
            options,
            has_override_port: ports.override_options,
            state: ValidatorState::Unconfigured,
            phase: Phase::Open,
            header_template: StreamHeader::default(),
            stream_header: None,
            header_port: if ports.header_output {
                HeaderPort::Waiting
            } else {
                HeaderPort::Absent
            },
            resampler,
            counters: StageCounters::default(),
        };

        // With an override port the options are only final at stream start.
        if !stage.has_override_port {
            validate::check_options(&stage.options)?;
        }

        if let Some(header) = ports.header {
            if stage.has_override_port {
                return Err(Error::Config(
                    "override options can't be used when the main input stream has a header".into(),
                ));
            }
            stage.apply_header(header)?;
        }

        Ok(stage)
    }

    /// Consume the start-of-stream packets
    pub fn start_stream(&mut self, start: StreamStart) -> Result<()> {
        self.check_not_aborted()?;
        let result = self.start_stream_inner(start);
        self.abort_on_error(result)
    }

    fn start_stream_inner(&mut self, start: StreamStart) -> Result<()> {
        if self.phase != Phase::Open {
            return Err(Error::Config(
                "start-of-stream packets must arrive before the first frame".into(),
            ));
        }
        self.phase = Phase::Started;

        match start.override_options {
            Some(overrides) => {
                if !self.has_override_port {
                    return Err(Error::Config("stage has no override options port".into()));
                }
                if self.state.is_header_fixed() {
                    return Err(Error::Config(
                        "override options can't change geometry fixed by a stream header".into(),
                    ));
                }
                self.options.merge_from(&overrides);
                validate::check_options(&self.options)?;
                self.state = ValidatorState::Unconfigured;
                tracing::debug!("Merged override options: {:?}", self.options);
            }
            None if self.has_override_port => {
                return Err(Error::Config(
                    "the override options packet must be present at stream start".into(),
                ));
            }
            None => {}
        }

        if let Some(header) = start.header {
            if self.state.fixed().is_some() {
                return Err(Error::Config("stream geometry is already fixed by a header".into()));
            }
            self.apply_header(header)?;
        }
        Ok(())
    }

    /// Process one frame, producing exactly one output frame
    pub fn process<'a>(&mut self, frame: &'a InputFrame) -> Result<OutputFrame<'a>> {
        self.check_not_aborted()?;
        let result = self.process_frame(frame);
        self.abort_on_error(result)
    }

    /// A fatal error stopped the stream
    pub fn is_aborted(&self) -> bool {
        self.phase == Phase::Aborted
    }

    fn check_not_aborted(&self) -> Result<()> {
        if self.is_aborted() {
            return Err(Error::Config("stage aborted after a fatal error".into()));
        }
        Ok(())
    }

    fn abort_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!("Aborting stream: {}", e);
            self.phase = Phase::Aborted;
        }
        result
    }

    fn process_frame<'a>(&mut self, frame: &'a InputFrame) -> Result<OutputFrame<'a>> {
        if self.phase == Phase::Open && self.has_override_port {
            return Err(Error::Config(
                "override options were expected at stream start".into(),
            ));
        }
        self.phase = Phase::Running;
        self.counters.inputs += 1;

        let fixed = self.validate(frame)?;
        let geometry = fixed.geometry;
        match (frame, fixed.strategy) {
            (InputFrame::Image(image), ConversionStrategy::Packed) => {
                self.process_image(Cow::Borrowed(image), &geometry).map(OutputFrame::Image)
            }
            (InputFrame::Yuv(image), ConversionStrategy::YuvToRgb { use_bt709 }) => {
                let converted = ColorspaceConverter::new(use_bt709).convert(image, self.options.alignment_boundary())?;
                self.process_image(Cow::Owned(converted), &geometry).map(OutputFrame::Image)
            }
            (InputFrame::Yuv(image), ConversionStrategy::YuvToYuv) => {
                self.scale_yuv(image, &geometry).map(OutputFrame::Yuv)
            }
            (frame, strategy) => Err(Error::FrameMismatch(format!(
                "{} frame does not fit the configured conversion {:?}",
                frame.format(),
                strategy
            ))),
        }
    }

    /// Derived output header, emitted once
    pub fn poll_header(&mut self) -> Option<StreamHeader> {
        match self.header_port {
            HeaderPort::Ready(header) => {
                self.header_port = HeaderPort::Sent;
                tracing::info!("Outputting header on stream");
                Some(header)
            }
            _ => None,
        }
    }

    /// Header of the output stream when the input stream carried one
    pub fn stream_header(&self) -> Option<&StreamHeader> {
        self.stream_header.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryConfig> {
        self.state.fixed().map(|f| &f.geometry)
    }

    pub fn state(&self) -> &ValidatorState {
        &self.state
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    pub fn counters(&self) -> &StageCounters {
        &self.counters
    }

    fn apply_header(&mut self, header: StreamHeader) -> Result<()> {
        self.header_template = header;
        if header.format.is_known() {
            validate::check_input_format(header.format, &self.options)?;
        }
        let output_format = validate::resolve_output_format(header.format, &self.options);

        if header.is_complete() && output_format.is_known() {
            let fixed = validate::configure(
                GeometrySource::Header,
                header.width,
                header.height,
                header.format,
                &self.options,
            )?;
            self.lock(fixed);
        } else {
            tracing::warn!(
                "Stream had a header which didn't have sufficient information ({}x{} {}); \
                 deducing geometry from the first frame",
                header.width,
                header.height,
                header.format
            );
            self.state = ValidatorState::Unconfigured;
        }
        Ok(())
    }

    fn lock(&mut self, fixed: FixedGeometry) {
        let g = &fixed.geometry;
        tracing::debug!(
            "Image scaling parameters: input {} {}, crop {}x{}+{}+{}, output {} {}, upscale {:?}",
            g.input(),
            g.input_format,
            g.crop.width,
            g.crop.height,
            g.crop.col_start,
            g.crop.row_start,
            g.output(),
            g.output_format,
            g.upscale
        );

        let header = StreamHeader {
            width: g.output_width,
            height: g.output_height,
            format: g.output_format,
            ..self.header_template
        };
        if fixed.source == GeometrySource::Header {
            self.stream_header = Some(header);
        }
        if self.header_port == HeaderPort::Waiting {
            self.header_port = HeaderPort::Ready(header);
        }
        self.state = ValidatorState::Configured(fixed);
    }

    fn validate(&mut self, frame: &InputFrame) -> Result<FixedGeometry> {
        let (width, height, format) = (frame.width(), frame.height(), frame.format());
        match self.state {
            ValidatorState::Configured(fixed) => {
                fixed.check_frame(width, height, format)?;
                Ok(fixed)
            }
            ValidatorState::Unconfigured => {
                let fixed = validate::configure(GeometrySource::FirstFrame, width, height, format, &self.options)?;
                self.lock(fixed);
                Ok(fixed)
            }
        }
    }

    fn needs_aligned_copy(&self, frame: &ImageFrame) -> bool {
        let misaligned =
            self.options.has_explicit_alignment() && !frame.is_aligned(self.options.alignment_boundary());
        let padded = self.options.set_alignment_padding() && !frame.is_contiguous();
        misaligned || padded
    }

    fn process_image<'a>(&mut self, current: Cow<'a, ImageFrame>, g: &GeometryConfig) -> Result<Cow<'a, ImageFrame>> {
        let alignment = self.options.alignment_boundary();
        let pad = self.options.set_alignment_padding();

        if g.crops() {
            self.counters.crops += 1;
        }
        let current = crop(current, &g.crop, alignment)?;

        if !g.rescales() {
            return match current {
                Cow::Owned(mut frame) => {
                    if pad {
                        frame.set_alignment_padding_areas();
                    }
                    self.counters.outputs_cropped += 1;
                    Ok(Cow::Owned(frame))
                }
                Cow::Borrowed(frame) if self.needs_aligned_copy(frame) => {
                    let mut copy = frame.aligned_copy(alignment)?;
                    if pad {
                        copy.set_alignment_padding_areas();
                    }
                    self.counters.outputs_aligned += 1;
                    Ok(Cow::Owned(copy))
                }
                Cow::Borrowed(frame) => {
                    tracing::trace!("Passing {}x{} frame through", frame.width(), frame.height());
                    self.counters.outputs_inputs += 1;
                    Ok(Cow::Borrowed(frame))
                }
            };
        }

        let params = ResizeParams {
            upscale: g.upscale,
            sharpening: self.options.post_sharpening_coefficient(),
            alignment_boundary: alignment,
        };
        let (mut output, direction) = resize(&mut self.resampler, &current, g.output_width, g.output_height, &params)?;
        self.count_direction(direction);
        if pad {
            self.counters.pads += 1;
            output.set_alignment_padding_areas();
        }
        self.counters.outputs_scaled += 1;
        Ok(Cow::Owned(output))
    }

    fn scale_yuv<'a>(&mut self, image: &'a YuvImage, g: &GeometryConfig) -> Result<Cow<'a, YuvImage>> {
        if !g.rescales() {
            tracing::trace!("Passing {}x{} YUV frame through", image.width(), image.height());
            self.counters.outputs_inputs += 1;
            return Ok(Cow::Borrowed(image));
        }
        let (output, direction) = resize_i420(&mut self.resampler, image, g.output_width, g.output_height)?;
        self.count_direction(direction);
        self.counters.outputs_scaled += 1;
        Ok(Cow::Owned(output))
    }

    fn count_direction(&mut self, direction: ScaleDirection) {
        match direction {
            ScaleDirection::Down => self.counters.downscales += 1,
            ScaleDirection::Up => self.counters.upscales += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScaleAlgorithm;
    use crate::processing::geometry::{CropBox, Interpolation};

    fn rgb_frame(width: u32, height: u32) -> InputFrame {
        let mut frame = ImageFrame::new(ImageFormat::Srgb, width, height, 16).unwrap();
        for y in 0..height as usize {
            for (x, px) in frame.row_mut(y).chunks_exact_mut(3).enumerate() {
                px.copy_from_slice(&[(x % 251) as u8, (y % 251) as u8, 99]);
            }
        }
        InputFrame::Image(frame)
    }

    fn yuv_frame(width: u32, height: u32) -> InputFrame {
        let mut image = YuvImage::new(width, height).unwrap();
        image.plane_mut(0).fill(180);
        image.plane_mut(1).fill(100);
        image.plane_mut(2).fill(150);
        InputFrame::Yuv(image)
    }

    /// Records every kernel call, then defers to the CPU resampler
    #[derive(Default)]
    struct Recording {
        inner: CpuResampler,
        calls: Vec<(&'static str, ImageFormat, u32, u32)>,
    }

    impl Resampler for Recording {
        fn downscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, sharpening: f32) -> Result<()> {
            self.calls.push(("down", src.format(), dst.width(), dst.height()));
            self.inner.downscale(src, dst, sharpening)
        }

        fn upscale(&mut self, src: &ImageFrame, dst: &mut ImageFrame, interpolation: Interpolation) -> Result<()> {
            self.calls.push(("up", src.format(), dst.width(), dst.height()));
            self.inner.upscale(src, dst, interpolation)
        }

        fn scale_i420(&mut self, src: &YuvImage, dst: &mut YuvImage) -> Result<()> {
            self.calls.push(("i420", ImageFormat::Ycbcr420p, dst.width(), dst.height()));
            self.inner.scale_i420(src, dst)
        }
    }

    #[test]
    fn test_square_crop_of_vga() {
        let options = StageOptions::default().with_aspect_ratio_bounds(1.0, 1.0);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = rgb_frame(640, 480);

        let output = stage.process(&input).unwrap();
        let image = output.as_image().unwrap();
        assert_eq!((image.width(), image.height()), (480, 480));
        // First output pixel is input column 80
        assert_eq!(&image.row(0)[..3], &[80, 0, 99]);
        assert_eq!(
            stage.geometry().unwrap().crop,
            CropBox {
                col_start: 80,
                row_start: 0,
                width: 480,
                height: 480
            }
        );
        assert_eq!(stage.counters().crops, 1);
        assert_eq!(stage.counters().outputs_cropped, 1);
    }

    #[test]
    fn test_crop_then_downscale() {
        let options = StageOptions::default()
            .with_aspect_ratio_bounds(1.0, 1.0)
            .with_target_size(320, 320)
            .with_preserve_aspect_ratio(true)
            .with_multiple_of_two(true);
        let mut stage = ScaleStage::with_resampler(options, StreamPorts::default(), Recording::default()).unwrap();
        let input = rgb_frame(640, 480);

        let output = stage.process(&input).unwrap();
        assert_eq!((output.width(), output.height()), (320, 320));
        assert_eq!(stage.counters().downscales, 1);
        assert_eq!(stage.counters().upscales, 0);
        assert_eq!(stage.counters().outputs_scaled, 1);
        assert_eq!(stage.resampler.calls, vec![("down", ImageFormat::Srgb, 320, 320)]);
    }

    #[test]
    fn test_yuv_converted_before_scaling() {
        let options = StageOptions::default()
            .with_output_format(ImageFormat::Srgb)
            .with_target_size(88, 72);
        let mut stage = ScaleStage::with_resampler(options, StreamPorts::default(), Recording::default()).unwrap();
        let input = yuv_frame(176, 144);

        let output = stage.process(&input).unwrap();
        assert_eq!(output.format(), ImageFormat::Srgb);
        assert_eq!((output.width(), output.height()), (88, 72));
        // The kernel only ever saw RGB data
        assert_eq!(stage.resampler.calls, vec![("down", ImageFormat::Srgb, 88, 72)]);
    }

    #[test]
    fn test_yuv_conversion_without_scaling() {
        let options = StageOptions::default().with_output_format(ImageFormat::Srgb);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = yuv_frame(176, 144);

        let output = stage.process(&input).unwrap();
        assert_eq!(output.format(), ImageFormat::Srgb);
        assert_eq!((output.width(), output.height()), (176, 144));
        assert!(!output.is_pass_through());
        assert_eq!(stage.counters().outputs_cropped, 1);
    }

    #[test]
    fn test_empty_header_falls_back_to_first_frame() {
        let ports = StreamPorts::default().with_header(StreamHeader::new(0, 0, ImageFormat::Srgb));
        let mut stage = ScaleStage::new(StageOptions::default().with_target_size(32, 24), ports).unwrap();
        assert!(stage.geometry().is_none());
        assert!(stage.stream_header().is_none());

        let input = rgb_frame(64, 48);
        let output = stage.process(&input).unwrap();
        assert_eq!((output.width(), output.height()), (32, 24));
        assert_eq!(stage.state().fixed().unwrap().source, GeometrySource::FirstFrame);
    }

    #[test]
    fn test_size_change_without_header_is_fatal() {
        let mut stage = ScaleStage::new(StageOptions::default(), StreamPorts::default()).unwrap();
        stage.process(&rgb_frame(64, 48)).unwrap();

        let err = stage.process(&rgb_frame(32, 48)).unwrap_err();
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_stage_stays_aborted_after_frame_error() {
        let mut stage = ScaleStage::new(StageOptions::default(), StreamPorts::default()).unwrap();
        stage.process(&rgb_frame(64, 48)).unwrap();
        assert!(stage.process(&rgb_frame(32, 48)).unwrap_err().is_frame_error());
        assert!(stage.is_aborted());

        // A frame matching the fixed geometry is still refused
        let err = stage.process(&rgb_frame(64, 48)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(stage.start_stream(StreamStart::default()).is_err());
        assert_eq!(stage.counters().outputs(), 1);
    }

    #[test]
    fn test_stage_stays_aborted_after_bad_override() {
        let ports = StreamPorts::default().with_override_options();
        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();

        // Planar output without even scaling fails after the merge
        let overrides = StageOptions::default().with_output_format(ImageFormat::Ycbcr420p);
        assert!(stage
            .start_stream(StreamStart {
                override_options: Some(overrides),
                header: None,
            })
            .is_err());
        assert!(stage.is_aborted());

        let err = stage.process(&yuv_frame(64, 48)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(stage.counters().inputs, 0);
    }

    #[test]
    fn test_pass_through_is_zero_copy() {
        let options = StageOptions::default()
            .with_target_size(64, 48)
            .with_preserve_aspect_ratio(false);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = rgb_frame(64, 48);

        let output = stage.process(&input).unwrap();
        assert!(output.is_pass_through());
        match (&output, &input) {
            (OutputFrame::Image(Cow::Borrowed(out)), InputFrame::Image(inp)) => assert!(std::ptr::eq(*out, inp)),
            _ => panic!("expected a borrowed frame"),
        }
        assert_eq!(stage.counters().outputs_inputs, 1);
        assert_eq!(stage.counters().crops, 0);
    }

    #[test]
    fn test_explicit_alignment_forces_copy() {
        let data: Vec<u8> = (0..30).collect();
        let frame = ImageFrame::from_contiguous(ImageFormat::Srgb, 5, 2, data).unwrap();
        let input = InputFrame::Image(frame);
        let options = StageOptions::default().with_alignment_boundary(16);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();

        let output = stage.process(&input).unwrap();
        let image = output.as_image().unwrap();
        assert!(!output.is_pass_through());
        assert_eq!(image.width_step(), 16);
        assert_eq!(image.row(1), &(15..30).collect::<Vec<u8>>()[..]);
        assert_eq!(stage.counters().outputs_aligned, 1);
    }

    #[test]
    fn test_aligned_input_passes_through() {
        let options = StageOptions::default().with_alignment_boundary(16);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = rgb_frame(5, 2);
        assert!(stage.process(&input).unwrap().is_pass_through());
    }

    #[test]
    fn test_padding_cleared_on_copy() {
        let frame = ImageFrame::from_data(ImageFormat::Srgb, 5, 2, 16, vec![0xFF; 32]).unwrap();
        let input = InputFrame::Image(frame);
        let options = StageOptions::default().with_alignment_padding(true);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();

        let output = stage.process(&input).unwrap();
        let image = output.as_image().unwrap();
        assert_eq!(image.data()[15], 0);
        assert_eq!(image.data()[31], 0);
        assert_eq!(image.row(0), &[0xFF; 15]);
    }

    #[test]
    fn test_padding_counted_after_rescale() {
        let options = StageOptions::default()
            .with_target_size(10, 10)
            .with_alignment_padding(true);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        stage.process(&rgb_frame(20, 20)).unwrap();
        assert_eq!(stage.counters().pads, 1);
    }

    #[test]
    fn test_header_fixes_geometry() {
        let header = StreamHeader::new(64, 48, ImageFormat::Srgb).with_frame_rate(30.0);
        let ports = StreamPorts::default().with_header(header).with_header_output();
        let options = StageOptions::default().with_target_size(32, 24);
        let mut stage = ScaleStage::new(options, ports).unwrap();

        let out_header = *stage.stream_header().unwrap();
        assert_eq!(out_header, StreamHeader::new(32, 24, ImageFormat::Srgb).with_frame_rate(30.0));
        assert_eq!(stage.poll_header(), Some(out_header));
        assert_eq!(stage.poll_header(), None);

        stage.process(&rgb_frame(64, 48)).unwrap();
        let err = stage.process(&rgb_frame(48, 64)).unwrap_err();
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_header_emitted_after_first_frame() {
        let ports = StreamPorts::default().with_header_output();
        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();
        assert_eq!(stage.poll_header(), None);

        stage.process(&rgb_frame(64, 48)).unwrap();
        assert_eq!(stage.poll_header(), Some(StreamHeader::new(64, 48, ImageFormat::Srgb)));
        stage.process(&rgb_frame(64, 48)).unwrap();
        assert_eq!(stage.poll_header(), None);
    }

    #[test]
    fn test_header_format_must_match_frames() {
        let ports = StreamPorts::default().with_header(StreamHeader::new(64, 48, ImageFormat::Srgb));
        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();
        let frame = ImageFrame::new(ImageFormat::Srgba, 64, 48, 16).unwrap();
        assert!(stage.process(&InputFrame::Image(frame)).unwrap_err().is_frame_error());
    }

    #[test]
    fn test_override_options_merge() {
        let ports = StreamPorts::default().with_override_options();
        let options = StageOptions::default()
            .with_target_size(16, 12)
            .with_algorithm(ScaleAlgorithm::Linear);
        let mut stage = ScaleStage::new(options, ports).unwrap();

        let overrides = StageOptions::default().with_target_width(32);
        stage
            .start_stream(StreamStart {
                override_options: Some(overrides),
                header: None,
            })
            .unwrap();
        assert_eq!(stage.options().target_width(), Some(32));
        assert_eq!(stage.options().target_height(), Some(12));
        assert_eq!(stage.options().algorithm(), ScaleAlgorithm::Linear);

        let input = rgb_frame(64, 48);
        let output = stage.process(&input).unwrap();
        assert_eq!((output.width(), output.height()), (32, 12));
    }

    #[test]
    fn test_override_port_requires_packet() {
        let ports = StreamPorts::default().with_override_options();
        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();
        assert!(stage.process(&rgb_frame(8, 8)).unwrap_err().is_configuration_error());

        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();
        assert!(stage.start_stream(StreamStart::default()).is_err());
    }

    #[test]
    fn test_override_with_header_is_fatal() {
        let ports = StreamPorts::default()
            .with_override_options()
            .with_header(StreamHeader::new(64, 48, ImageFormat::Srgb));
        let err = ScaleStage::new(StageOptions::default(), ports).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_override_after_header_fixed_geometry_is_fatal() {
        let ports = StreamPorts::default().with_header(StreamHeader::new(64, 48, ImageFormat::Srgb));
        let mut stage = ScaleStage::new(StageOptions::default(), ports).unwrap();
        let err = stage
            .start_stream(StreamStart {
                override_options: Some(StageOptions::default().with_target_width(8)),
                header: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_start_stream_header() {
        let mut stage = ScaleStage::new(StageOptions::default(), StreamPorts::default()).unwrap();
        stage
            .start_stream(StreamStart {
                override_options: None,
                header: Some(StreamHeader::new(64, 48, ImageFormat::Srgb)),
            })
            .unwrap();
        assert!(stage.state().is_header_fixed());
        assert!(stage.process(&rgb_frame(32, 32)).is_err());
    }

    #[test]
    fn test_start_stream_after_frames_is_fatal() {
        let mut stage = ScaleStage::new(StageOptions::default(), StreamPorts::default()).unwrap();
        stage.process(&rgb_frame(8, 8)).unwrap();
        assert!(stage.start_stream(StreamStart::default()).is_err());
    }

    #[test]
    fn test_rgb_to_yuv_rejected_at_open() {
        let options = StageOptions::default()
            .with_input_format(ImageFormat::Srgb)
            .with_output_format(ImageFormat::Ycbcr420p)
            .with_multiple_of_two(true);
        let err = ScaleStage::new(options, StreamPorts::default()).err().unwrap();
        assert!(matches!(err, Error::UnsupportedConversion { .. }));

        let options = StageOptions::default()
            .with_output_format(ImageFormat::Ycbcr420p)
            .with_multiple_of_two(true);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let err = stage.process(&rgb_frame(8, 8)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConversion { .. }));
    }

    #[test]
    fn test_yuv_output_without_even_scaling_rejected() {
        let options = StageOptions::default().with_output_format(ImageFormat::Ycbcr420p);
        assert!(ScaleStage::new(options, StreamPorts::default()).is_err());
    }

    #[test]
    fn test_yuv_to_yuv_scales_planes() {
        let options = StageOptions::default()
            .with_target_size(88, 72)
            .with_multiple_of_two(true);
        let mut stage = ScaleStage::with_resampler(options, StreamPorts::default(), Recording::default()).unwrap();

        let input = yuv_frame(176, 144);
        let output = stage.process(&input).unwrap();
        let image = output.as_yuv().unwrap();
        assert_eq!((image.width(), image.height()), (88, 72));
        assert!(image.plane(0).iter().all(|v| v.abs_diff(180) <= 1));
        assert_eq!(stage.resampler.calls, vec![("i420", ImageFormat::Ycbcr420p, 88, 72)]);
        assert_eq!(stage.counters().downscales, 1);
    }

    #[test]
    fn test_yuv_output_is_even() {
        let options = StageOptions::default().with_multiple_of_two(true);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = yuv_frame(175, 143);
        let output = stage.process(&input).unwrap();
        assert_eq!(output.format(), ImageFormat::Ycbcr420p);
        assert_eq!((output.width(), output.height()), (174, 142));
    }

    #[test]
    fn test_yuv_to_yuv_same_size_passes_through() {
        let options = StageOptions::default().with_multiple_of_two(true);
        let mut stage = ScaleStage::with_resampler(options, StreamPorts::default(), Recording::default()).unwrap();
        let input = yuv_frame(176, 144);

        let output = stage.process(&input).unwrap();
        assert!(output.is_pass_through());
        match (&output, &input) {
            (OutputFrame::Yuv(Cow::Borrowed(out)), InputFrame::Yuv(inp)) => assert!(std::ptr::eq(*out, inp)),
            _ => panic!("expected a borrowed YUV frame"),
        }
        assert!(stage.resampler.calls.is_empty());
        assert_eq!(stage.counters().outputs_inputs, 1);
        assert_eq!(stage.counters().outputs_scaled, 0);
    }

    #[test]
    fn test_yuv_to_yuv_crop_rejected() {
        let options = StageOptions::default()
            .with_aspect_ratio_bounds(1.0, 1.0)
            .with_multiple_of_two(true);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let err = stage.process(&yuv_frame(176, 144)).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_disabled_upscale_passes_through() {
        let options = StageOptions::default()
            .with_target_size(1280, 960)
            .with_algorithm(ScaleAlgorithm::DefaultWithoutUpscale);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        let input = rgb_frame(64, 48);

        let output = stage.process(&input).unwrap();
        assert!(output.is_pass_through());
        assert_eq!(stage.counters().upscales, 0);
    }

    #[test]
    fn test_upscale_uses_interpolation() {
        let options = StageOptions::default()
            .with_target_size(64, 48)
            .with_algorithm(ScaleAlgorithm::Linear);
        let mut stage = ScaleStage::with_resampler(options, StreamPorts::default(), Recording::default()).unwrap();
        stage.process(&rgb_frame(32, 24)).unwrap();
        assert_eq!(stage.counters().upscales, 1);
        assert_eq!(stage.resampler.calls, vec![("up", ImageFormat::Srgb, 64, 48)]);
    }

    #[test]
    fn test_image_frame_rejected_when_yuv_declared() {
        let options = StageOptions::default().with_input_format(ImageFormat::Ycbcr420p);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        assert!(stage.process(&rgb_frame(8, 8)).is_err());
    }

    #[test]
    fn test_one_output_per_input() {
        let options = StageOptions::default().with_target_size(16, 12);
        let mut stage = ScaleStage::new(options, StreamPorts::default()).unwrap();
        for _ in 0..5 {
            stage.process(&rgb_frame(64, 48)).unwrap();
        }
        assert_eq!(stage.counters().inputs, 5);
        assert_eq!(stage.counters().outputs(), 5);
    }
}
