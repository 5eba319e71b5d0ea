//! Error type shared by every stage of the compression pipeline.

use crate::property::PropertyKind;

/// Errors raised while fitting, correcting, or decoding animation channels.
///
/// All of these abort the current compression call. Per-bucket fallbacks
/// (raw encoding when no approximation fits) are not errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error(
        "node {node} {property} channel has {actual} samples but the timeline has {expected}"
    )]
    SampleCountMismatch {
        node: usize,
        property: PropertyKind,
        expected: usize,
        actual: usize,
    },

    #[error("{property} channel has {actual} values per sample, expected {expected}")]
    DimensionMismatch {
        property: PropertyKind,
        expected: usize,
        actual: usize,
    },

    #[error("timeline is not strictly increasing at sample {index}")]
    NonIncreasingTimes { index: usize },

    #[error("timeline sample {index} is not a finite time")]
    NonFiniteTime { index: usize },

    #[error("unknown animated property '{0}'")]
    UnknownProperty(String),

    #[error("world transform of node {node} is not invertible at frame {frame}")]
    SingularTransform { node: usize, frame: usize },

    #[error("residual width of {bits} bits exceeds the {max}-bit limit")]
    ResidualWidth { bits: u8, max: u8 },

    #[error("residual code {code} does not fit in {bits} bits")]
    ResidualOutOfRange { code: f64, bits: u8 },

    #[error("value {value} does not fit in the signed {bits}-bit quantized range")]
    ValueOutOfRange { value: f32, bits: u32 },

    #[error("invalid compression config: {0}")]
    InvalidConfig(String),

    #[error("channel stream ended unexpectedly")]
    Truncated,

    #[error("unknown channel record kind {0}")]
    UnknownRecord(u8),
}

pub type Result<T> = std::result::Result<T, CurveError>;
