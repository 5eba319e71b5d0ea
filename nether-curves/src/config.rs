//! Compression configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! fitter = "bit-budget"
//! adjust_children = true
//! bucket_len = 256
//! bit_widths = [0, 2, 4, 8]
//!
//! [error_bounds]
//! translation = 0.1
//! rotation = 0.0009765625
//! ```

use serde::{Deserialize, Serialize};

use crate::cubic::CubicOptions;
use crate::error::{CurveError, Result};
use crate::fitter::{
    BitBudgetFitter, ChannelFitter, ChebyshevFitter, CubicFitter, DEFAULT_WINDOW_COUNTS,
    KnotFitter, UniformQuantizer, WindowedChebyshevFitter,
};
use crate::knots::KnotOptions;
use crate::math::DET_EPSILON;
use crate::property::PropertyKind;
use crate::quantizer::{DEFAULT_BIT_WIDTHS, MAX_RESIDUAL_BITS};
use crate::spline::Interpolation;
use crate::stream::MAX_RECORD_SPAN;

/// Smallest bucket worth fitting.
const MIN_BUCKET_LEN: usize = 5;

/// Largest coefficient count a windowed record can hold.
const MAX_WINDOW_COUNT: usize = 256;

/// Which [`ChannelFitter`] compresses the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitterKind {
    #[default]
    BitBudget,
    Chebyshev,
    Windowed,
    Knots,
    Cubic,
    Quantize,
}

impl FitterKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "bit-budget" => Ok(Self::BitBudget),
            "chebyshev" => Ok(Self::Chebyshev),
            "windowed" => Ok(Self::Windowed),
            "knots" => Ok(Self::Knots),
            "cubic" => Ok(Self::Cubic),
            "quantize" => Ok(Self::Quantize),
            other => Err(CurveError::InvalidConfig(format!("unknown fitter '{other}'"))),
        }
    }
}

/// Max allowed absolute error per property, in fit space.
///
/// Rotation bounds apply to quaternion log components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorBounds {
    pub translation: f64,
    pub rotation: f64,
    pub scale: f64,
    pub weights: f64,
}

impl Default for ErrorBounds {
    fn default() -> Self {
        Self {
            translation: 0.1,
            rotation: 1.0 / 1024.0,
            scale: 0.01,
            weights: 0.01,
        }
    }
}

impl ErrorBounds {
    pub fn get(&self, property: PropertyKind) -> f64 {
        match property {
            PropertyKind::Translation => self.translation,
            PropertyKind::Rotation => self.rotation,
            PropertyKind::Scale => self.scale,
            PropertyKind::Weights => self.weights,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub fitter: FitterKind,
    /// Rewrite descendants so world transforms survive the parent's error.
    pub adjust_children: bool,
    /// Samples per bucket; each bucket is fitted independently.
    pub bucket_len: usize,
    /// Residual widths the bit-budget fitter chooses from.
    pub bit_widths: Vec<u8>,
    /// Coefficient caps the windowed fitter tries.
    pub window_counts: Vec<usize>,
    /// Seed sets the knot fitter refines.
    pub seed_trials: usize,
    pub seed: u64,
    pub knot_interpolation: Interpolation,
    /// Signed residual width for knot fits; 0 stores none.
    pub knot_residual_bits: u8,
    /// Constrain cubic segments to continue the previous slope.
    pub cubic_continuous: bool,
    pub error_bounds: ErrorBounds,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            fitter: FitterKind::default(),
            adjust_children: true,
            bucket_len: MAX_RECORD_SPAN,
            bit_widths: DEFAULT_BIT_WIDTHS.to_vec(),
            window_counts: DEFAULT_WINDOW_COUNTS.to_vec(),
            seed_trials: 8,
            seed: 0,
            knot_interpolation: Interpolation::default(),
            knot_residual_bits: 0,
            cubic_continuous: false,
            error_bounds: ErrorBounds::default(),
        }
    }
}

impl CompressionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CurveError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CurveError::InvalidConfig(msg));

        if !(MIN_BUCKET_LEN..=MAX_RECORD_SPAN).contains(&self.bucket_len) {
            return invalid(format!(
                "bucket_len must be in {MIN_BUCKET_LEN}..={MAX_RECORD_SPAN}, got {}",
                self.bucket_len
            ));
        }
        if self.bit_widths.is_empty() {
            return invalid("bit_widths must not be empty".to_string());
        }
        if let Some(&bits) = self.bit_widths.iter().find(|&&b| b > MAX_RESIDUAL_BITS) {
            return invalid(format!(
                "bit width {bits} exceeds {MAX_RESIDUAL_BITS} bits"
            ));
        }
        if !self.bit_widths.is_sorted() {
            return invalid("bit_widths must be in ascending order".to_string());
        }
        if self.window_counts.is_empty()
            || self
                .window_counts
                .iter()
                .any(|&c| c == 0 || c > MAX_WINDOW_COUNT)
        {
            return invalid(format!(
                "window_counts must be non-empty and within 1..={MAX_WINDOW_COUNT}"
            ));
        }
        if self.seed_trials == 0 {
            return invalid("seed_trials must be at least 1".to_string());
        }
        if self.knot_residual_bits > MAX_RESIDUAL_BITS {
            return invalid(format!(
                "knot_residual_bits exceeds {MAX_RESIDUAL_BITS} bits"
            ));
        }
        for property in PropertyKind::ALL {
            let bound = self.error_bounds.get(property);
            if !(bound.is_finite() && bound > 0.0) {
                return invalid(format!(
                    "{property} error bound must be positive, got {bound}"
                ));
            }
        }
        Ok(())
    }

    /// Build the configured strategy.
    pub fn build_fitter(&self) -> Result<Box<dyn ChannelFitter>> {
        self.validate()?;
        let bounds = self.error_bounds;
        Ok(match self.fitter {
            FitterKind::BitBudget => Box::new(BitBudgetFitter::new(
                bounds,
                self.bucket_len,
                self.bit_widths.clone(),
            )?),
            FitterKind::Chebyshev => Box::new(ChebyshevFitter::new(bounds, self.bucket_len)),
            FitterKind::Windowed => Box::new(WindowedChebyshevFitter::new(
                bounds,
                self.bucket_len,
                self.window_counts.clone(),
            )),
            FitterKind::Knots => Box::new(KnotFitter::new(
                bounds,
                self.bucket_len,
                self.knot_residual_bits,
                KnotOptions {
                    interpolation: self.knot_interpolation,
                    trials: self.seed_trials,
                    seed: self.seed,
                },
            )),
            FitterKind::Cubic => Box::new(CubicFitter::new(
                bounds,
                self.bucket_len,
                CubicOptions {
                    continuous: self.cubic_continuous,
                    det_epsilon: DET_EPSILON,
                },
            )),
            FitterKind::Quantize => Box::new(UniformQuantizer::new(self.bucket_len)),
        })
    }
}
