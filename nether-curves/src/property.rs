//! Animated properties and their per-property constants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CurveError, Result};

/// Local-transform property a channel animates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Translation,
    Rotation,
    Scale,
    Weights,
}

/// Uniform quantization parameters for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationSpec {
    /// Magnitude bits; codes span `[-2^bits, 2^bits - 1]`.
    pub bits: u32,
    /// Multiplier applied before rounding.
    pub scale: f64,
}

impl QuantizationSpec {
    pub fn min_code(&self) -> i64 {
        -(1i64 << self.bits)
    }

    pub fn max_code(&self) -> i64 {
        (1i64 << self.bits) - 1
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Translation codes per meter.
const MILLIMETERS_PER_METER: f64 = 1000.0;

/// Translations are authored in centimeters and quantized to millimeters.
const TRANSLATION_SCALE: f64 = 10.0;

/// Range of a root translation in meters, -50 m to +50 m.
const ROOT_TRANSLATION_RANGE: f64 = 100.0;

/// Range of a child translation relative to its parent, in meters.
const CHILD_TRANSLATION_RANGE: f64 = 3.0;

const ROTATION_BITS: u32 = 11;
const SCALE_BITS: u32 = 8;
const WEIGHT_BITS: u32 = 10;

impl PropertyKind {
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::Translation,
        PropertyKind::Rotation,
        PropertyKind::Scale,
        PropertyKind::Weights,
    ];

    /// Parse a glTF-style target path.
    pub fn from_path(path: &str) -> Result<Self> {
        match path {
            "translation" => Ok(Self::Translation),
            "rotation" => Ok(Self::Rotation),
            "scale" => Ok(Self::Scale),
            "weights" => Ok(Self::Weights),
            other => Err(CurveError::UnknownProperty(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
            Self::Weights => "weights",
        }
    }

    /// Stable index used for per-node channel tables and stream headers.
    pub fn index(self) -> usize {
        match self {
            Self::Translation => 0,
            Self::Rotation => 1,
            Self::Scale => 2,
            Self::Weights => 3,
        }
    }

    pub fn from_index(index: u8) -> Result<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| CurveError::UnknownProperty(format!("#{index}")))
    }

    /// Values per sample, or `None` for morph weights (one per target).
    pub fn fixed_dimension(self) -> Option<usize> {
        match self {
            Self::Translation | Self::Scale => Some(3),
            Self::Rotation => Some(4),
            Self::Weights => None,
        }
    }

    /// Uniform quantization table.
    ///
    /// | Property    | Bits                                   | Scale    |
    /// |-------------|----------------------------------------|----------|
    /// | translation | ceil(log2(range * 1000)), range 100/3  | 10       |
    /// | rotation    | 11                                     | 2^11 - 1 |
    /// | scale       | 8                                      | 2^6 - 1  |
    /// | weights     | 10                                     | 2^9 - 1  |
    pub fn quantization(self, is_root: bool) -> QuantizationSpec {
        match self {
            Self::Translation => {
                let range = if is_root {
                    ROOT_TRANSLATION_RANGE
                } else {
                    CHILD_TRANSLATION_RANGE
                };
                QuantizationSpec {
                    bits: (range * MILLIMETERS_PER_METER).log2().ceil() as u32,
                    scale: TRANSLATION_SCALE,
                }
            }
            Self::Rotation => QuantizationSpec {
                bits: ROTATION_BITS,
                scale: ((1u32 << ROTATION_BITS) - 1) as f64,
            },
            Self::Scale => QuantizationSpec {
                bits: SCALE_BITS,
                scale: ((1u32 << (SCALE_BITS - 2)) - 1) as f64,
            },
            Self::Weights => QuantizationSpec {
                bits: WEIGHT_BITS,
                scale: ((1u32 << (WEIGHT_BITS - 1)) - 1) as f64,
            },
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
