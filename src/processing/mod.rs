//! Video processing module
//!
//! Provides the per-frame building blocks of the scale stage:
//! - Crop window and output size calculation
//! - Cropping
//! - Colorspace conversion (YUV 4:2:0 to RGB)
//! - Resolution scaling

pub mod convert;
pub mod crop;
pub mod geometry;
pub mod scale;
#[cfg(feature = "ffmpeg")]
pub mod swscale;

pub use convert::{yuv_to_rgb, ColorspaceConverter};
pub use crop::crop;
pub use geometry::{
    compute_crop_box, compute_output_size, select_algorithm, CropBox, GeometryConfig, Interpolation,
    UpscalePolicy,
};
pub use scale::{resize, resize_i420, CpuResampler, Resampler, ResizeParams, ScaleDirection};
#[cfg(feature = "ffmpeg")]
pub use swscale::SwsResampler;
