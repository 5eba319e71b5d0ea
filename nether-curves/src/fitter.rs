//! Channel fitting strategies.
//!
//! A [`ChannelFitter`] replaces one channel's samples with the values its
//! encoding reproduces and appends that encoding to the output streams. The
//! hierarchy processor is agnostic to the strategy; it only needs the
//! rewritten samples to correct descendants.
//!
//! | Strategy                  | Record kinds             | Fit space      |
//! |---------------------------|--------------------------|----------------|
//! | [`BitBudgetFitter`]       | Chebyshev + residuals    | quaternion log |
//! | [`ChebyshevFitter`]       | Chebyshev                | quaternion log |
//! | [`WindowedChebyshevFitter`] | FixedChebyshev         | quaternion log |
//! | [`KnotFitter`]            | Knots                    | quaternion log |
//! | [`CubicFitter`]           | Cubic                    | quaternion log |
//! | [`UniformQuantizer`]      | Quantized                | raw components |

mod bit_budget;
mod chebyshev;
mod cubic;
mod knots;
mod quantize;
mod windowed;

pub use bit_budget::BitBudgetFitter;
pub use chebyshev::ChebyshevFitter;
pub use cubic::CubicFitter;
pub use knots::KnotFitter;
pub use quantize::UniformQuantizer;
pub use windowed::{DEFAULT_WINDOW_COUNTS, WindowedChebyshevFitter};

use std::ops::Range;

use crate::error::{CurveError, Result};
use crate::math::{align_hemisphere, quat_from_slice, quat_log};
use crate::property::PropertyKind;
use crate::scene::NodeId;
use crate::stream::{ChannelHeader, EncodedStreams, FLAG_LOG_ROTATION, from_fit_space};

/// What a fitter knows about the channel it is compressing.
#[derive(Debug, Clone, Copy)]
pub struct ChannelContext<'a> {
    pub node: NodeId,
    pub property: PropertyKind,
    /// Values per sample in the channel (4 for rotations).
    pub dimension: usize,
    /// Root nodes get a wider translation range when quantizing.
    pub is_root: bool,
    pub times: &'a [f32],
}

/// Byte accounting for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FitReport {
    /// Size of the channel as raw `f32` samples.
    pub input_bytes: usize,
    /// Bytes appended to the curve and residual streams.
    pub output_bytes: usize,
}

impl std::ops::AddAssign for FitReport {
    fn add_assign(&mut self, other: Self) {
        self.input_bytes += other.input_bytes;
        self.output_bytes += other.output_bytes;
    }
}

/// Compresses a single channel in place.
pub trait ChannelFitter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Encode `values` (sample-major, `ctx.dimension` per sample) into
    /// `streams` and overwrite them with the decoded reconstruction.
    fn fit_channel(
        &self,
        ctx: &ChannelContext<'_>,
        values: &mut [f32],
        streams: &mut EncodedStreams,
    ) -> Result<FitReport>;
}

// ============================================================================
// Fit space
// ============================================================================

/// Channel samples split into per-axis curves.
///
/// Rotations are fitted as quaternion logarithms: three unconstrained
/// components that stay continuous as long as consecutive samples share a
/// hemisphere.
#[derive(Debug, Clone)]
pub(crate) struct FitChannel {
    pub header: ChannelHeader,
    pub xs: Vec<f64>,
    pub axes: Vec<Vec<f64>>,
}

impl FitChannel {
    pub fn new(ctx: &ChannelContext<'_>, values: &[f32], log_rotation: bool) -> Result<Self> {
        let n = ctx.times.len();
        if ctx.dimension == 0 || values.len() != n * ctx.dimension {
            return Err(CurveError::SampleCountMismatch {
                node: ctx.node,
                property: ctx.property,
                expected: n,
                actual: values.len() / ctx.dimension.max(1),
            });
        }

        let xs = ctx.times.iter().map(|&t| t as f64).collect();
        let log = log_rotation && ctx.property == PropertyKind::Rotation;
        let axes = if log {
            rotation_log_axes(values)
        } else {
            (0..ctx.dimension)
                .map(|axis| {
                    values
                        .iter()
                        .skip(axis)
                        .step_by(ctx.dimension)
                        .map(|&v| v as f64)
                        .collect()
                })
                .collect()
        };

        let header = ChannelHeader {
            node: ctx.node as u32,
            property: ctx.property,
            axes: if log { 3 } else { ctx.dimension as u8 },
            flags: if log { FLAG_LOG_ROTATION } else { 0 },
            sample_count: n as u32,
        };
        Ok(Self { header, xs, axes })
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Overwrite `values` with the decoded form of `fit`.
    pub fn commit(&self, fit: &[Vec<f64>], values: &mut [f32]) {
        values.copy_from_slice(&from_fit_space(&self.header, fit));
    }
}

fn rotation_log_axes(values: &[f32]) -> Vec<Vec<f64>> {
    let n = values.len() / 4;
    let mut axes = vec![Vec::with_capacity(n); 3];
    let mut previous = None;
    for sample in values.chunks_exact(4) {
        let mut q = quat_from_slice(sample);
        if let Some(prev) = previous {
            q = align_hemisphere(q, prev);
        }
        previous = Some(q);
        let log = quat_log(q);
        axes[0].push(log.x);
        axes[1].push(log.y);
        axes[2].push(log.z);
    }
    axes
}

/// Consecutive sample ranges of at most `len` samples.
pub(crate) fn buckets(n: usize, len: usize) -> impl Iterator<Item = Range<usize>> {
    let len = len.max(1);
    (0..n).step_by(len).map(move |start| start..(start + len).min(n))
}

/// Round through `f32`, the precision bounds and steps are stored at.
pub(crate) fn storage_precision(value: f64) -> f64 {
    value as f32 as f64
}

#[cfg(test)]
mod tests;
