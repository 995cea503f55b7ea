//! GhostScale — per-frame crop and scale stage
//!
//! Normalizes a video stream to a fixed geometry before inference or display.
//!
//! # Features
//!
//! - **Crop**: centered aspect-ratio crop between configurable bounds
//! - **Convert**: planar YUV 4:2:0 to SRGB (BT.601 or BT.709)
//! - **Scale**: area downscaling, configurable upscaling, optional sharpening
//! - **Pass-through**: untouched frames are forwarded without a copy
//!
//! # Example
//!
//! ```rust
//! use ghostscale::{ImageFormat, ImageFrame, InputFrame, ScaleStage, StageOptions, StreamPorts};
//!
//! fn main() -> ghostscale::Result<()> {
//!     let options = StageOptions::default()
//!         .with_target_size(320, 240)
//!         .with_preserve_aspect_ratio(true);
//!     let mut stage = ScaleStage::new(options, StreamPorts::default())?;
//!
//!     let frame = InputFrame::from(ImageFrame::new(ImageFormat::Srgb, 1280, 720, 16)?);
//!     let output = stage.process(&frame)?;
//!     assert_eq!((output.width(), output.height()), (320, 180));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod processing;
pub mod stage;
pub mod types;

// Re-exports for convenience
pub use config::{ScaleAlgorithm, StageOptions};
pub use error::{Error, Result};
pub use stage::{OutputFrame, ScaleStage, StreamPorts, StreamStart};
pub use types::{ImageFormat, ImageFrame, InputFrame, Resolution, StageCounters, StreamHeader, YuvImage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
