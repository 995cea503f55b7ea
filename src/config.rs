//! Configuration types for GhostScale

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ImageFormat;

/// Alignment used for newly allocated frames when none is configured
pub const DEFAULT_ALIGNMENT_BOUNDARY: usize = 16;

/// Resampling algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleAlgorithm {
    /// Cubic when upscaling
    #[default]
    Default,
    Linear,
    Cubic,
    Area,
    Lanczos,
    /// Never upscale; output is clamped to the crop size
    DefaultWithoutUpscale,
}

impl ScaleAlgorithm {
    pub const ALL: [ScaleAlgorithm; 6] = [
        ScaleAlgorithm::Default,
        ScaleAlgorithm::Linear,
        ScaleAlgorithm::Cubic,
        ScaleAlgorithm::Area,
        ScaleAlgorithm::Lanczos,
        ScaleAlgorithm::DefaultWithoutUpscale,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScaleAlgorithm::Default => "DEFAULT",
            ScaleAlgorithm::Linear => "LINEAR",
            ScaleAlgorithm::Cubic => "CUBIC",
            ScaleAlgorithm::Area => "AREA",
            ScaleAlgorithm::Lanczos => "LANCZOS",
            ScaleAlgorithm::DefaultWithoutUpscale => "DEFAULT_WITHOUT_UPSCALE",
        }
    }
}

/// Scale stage options
///
/// Every field is optional so that an override record can carry only the
/// fields it changes. Use the accessor methods for the effective values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOptions {
    /// Output width; derived from the crop when unset
    pub target_width: Option<u32>,
    /// Output height; derived from the crop when unset
    pub target_height: Option<u32>,
    /// Keep the crop aspect ratio when fitting into the target size
    pub preserve_aspect_ratio: Option<bool>,
    /// Round output dimensions down to even values
    pub scale_to_multiple_of_two: Option<bool>,
    /// Narrowest allowed width/height ratio before cropping
    pub min_aspect_ratio: Option<f64>,
    /// Widest allowed width/height ratio before cropping
    pub max_aspect_ratio: Option<f64>,
    pub algorithm: Option<ScaleAlgorithm>,
    /// Row alignment in bytes for new frames; values <= 0 accept any alignment
    pub alignment_boundary: Option<i32>,
    /// Zero the row padding of every newly allocated output frame
    pub set_alignment_padding: Option<bool>,
    pub input_format: Option<ImageFormat>,
    pub output_format: Option<ImageFormat>,
    /// Use BT.709 instead of BT.601 for YUV to RGB
    pub use_bt709: Option<bool>,
    /// Unsharp amount applied after downscaling, 0 disables
    pub post_sharpening_coefficient: Option<f32>,
}

impl StageOptions {
    /// Parse options from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load options from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Overwrite fields with the ones set in `other`; unset fields keep their value
    pub fn merge_from(&mut self, other: &StageOptions) {
        self.target_width = other.target_width.or(self.target_width);
        self.target_height = other.target_height.or(self.target_height);
        self.preserve_aspect_ratio = other.preserve_aspect_ratio.or(self.preserve_aspect_ratio);
        self.scale_to_multiple_of_two = other
            .scale_to_multiple_of_two
            .or(self.scale_to_multiple_of_two);
        self.min_aspect_ratio = other.min_aspect_ratio.or(self.min_aspect_ratio);
        self.max_aspect_ratio = other.max_aspect_ratio.or(self.max_aspect_ratio);
        self.algorithm = other.algorithm.or(self.algorithm);
        self.alignment_boundary = other.alignment_boundary.or(self.alignment_boundary);
        self.set_alignment_padding = other.set_alignment_padding.or(self.set_alignment_padding);
        self.input_format = other.input_format.or(self.input_format);
        self.output_format = other.output_format.or(self.output_format);
        self.use_bt709 = other.use_bt709.or(self.use_bt709);
        self.post_sharpening_coefficient = other
            .post_sharpening_coefficient
            .or(self.post_sharpening_coefficient);
    }

    pub fn with_target_size(mut self, width: u32, height: u32) -> Self {
        self.target_width = Some(width);
        self.target_height = Some(height);
        self
    }

    pub fn with_target_width(mut self, width: u32) -> Self {
        self.target_width = Some(width);
        self
    }

    pub fn with_target_height(mut self, height: u32) -> Self {
        self.target_height = Some(height);
        self
    }

    pub fn with_preserve_aspect_ratio(mut self, preserve: bool) -> Self {
        self.preserve_aspect_ratio = Some(preserve);
        self
    }

    pub fn with_multiple_of_two(mut self, enabled: bool) -> Self {
        self.scale_to_multiple_of_two = Some(enabled);
        self
    }

    pub fn with_aspect_ratio_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_aspect_ratio = Some(min);
        self.max_aspect_ratio = Some(max);
        self
    }

    pub fn with_algorithm(mut self, algorithm: ScaleAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_alignment_boundary(mut self, boundary: i32) -> Self {
        self.alignment_boundary = Some(boundary);
        self
    }

    pub fn with_alignment_padding(mut self, enabled: bool) -> Self {
        self.set_alignment_padding = Some(enabled);
        self
    }

    pub fn with_input_format(mut self, format: ImageFormat) -> Self {
        self.input_format = Some(format);
        self
    }

    pub fn with_output_format(mut self, format: ImageFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_bt709(mut self, enabled: bool) -> Self {
        self.use_bt709 = Some(enabled);
        self
    }

    pub fn with_post_sharpening(mut self, coefficient: f32) -> Self {
        self.post_sharpening_coefficient = Some(coefficient);
        self
    }

    /// Target width, `None` when unset or non-positive
    pub fn target_width(&self) -> Option<u32> {
        self.target_width.filter(|w| *w > 0)
    }

    pub fn target_height(&self) -> Option<u32> {
        self.target_height.filter(|h| *h > 0)
    }

    pub fn preserve_aspect_ratio(&self) -> bool {
        self.preserve_aspect_ratio.unwrap_or(false)
    }

    pub fn scale_to_multiple_of_two(&self) -> bool {
        self.scale_to_multiple_of_two.unwrap_or(false)
    }

    pub fn algorithm(&self) -> ScaleAlgorithm {
        self.algorithm.unwrap_or_default()
    }

    /// Alignment for newly allocated frames
    pub fn alignment_boundary(&self) -> usize {
        match self.alignment_boundary {
            Some(b) if b > 0 => b as usize,
            _ => DEFAULT_ALIGNMENT_BOUNDARY,
        }
    }

    /// An alignment requirement was configured explicitly
    pub fn has_explicit_alignment(&self) -> bool {
        matches!(self.alignment_boundary, Some(b) if b > 0)
    }

    pub fn set_alignment_padding(&self) -> bool {
        self.set_alignment_padding.unwrap_or(false)
    }

    pub fn use_bt709(&self) -> bool {
        self.use_bt709.unwrap_or(false)
    }

    pub fn post_sharpening_coefficient(&self) -> f32 {
        self.post_sharpening_coefficient.unwrap_or(0.0)
    }
}
