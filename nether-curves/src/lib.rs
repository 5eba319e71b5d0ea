//! Nether-Curves: keyframe compression for skeletal and morph animation
//!
//! Replaces densely sampled animation channels with compact curve records
//! and rewrites the samples with what those records decode to. Descendants
//! of every compressed node are corrected so their world transforms survive
//! the parent's approximation error.
//!
//! # Pipeline
//!
//! ```text
//! Scene (AnimationData)
//!   -> root-first traversal           hierarchy::compress_hierarchy
//!   -> per channel fit                fitter::ChannelFitter
//!   -> curve + residual streams       stream::EncodedStreams
//!   -> child correction               inverse(parent') * child_world
//! ```
//!
//! # Strategies
//!
//! | Name         | Idea                                                  |
//! |--------------|-------------------------------------------------------|
//! | `bit-budget` | Chebyshev series + 0/2/4/8-bit residuals, fewest bytes |
//! | `chebyshev`  | Shortest truncated Chebyshev series within the bound  |
//! | `windowed`   | Variable windows of 16-bit fixed-point coefficients   |
//! | `knots`      | Shared knots refined over random seeds, Akima/linear  |
//! | `cubic`      | Greedy piecewise cubic least squares                  |
//! | `quantize`   | Per-sample uniform quantization                       |
//!
//! Error bounds are absolute and apply per axis in fit space; rotations are
//! fitted as quaternion logarithms.

pub mod chebyshev;
pub mod config;
pub mod cubic;
pub mod error;
pub mod fitter;
pub mod hierarchy;
pub mod knots;
pub mod math;
pub mod property;
pub mod quantizer;
pub mod scene;
pub mod spline;
pub mod stream;

pub use config::{CompressionConfig, ErrorBounds, FitterKind};
pub use error::{CurveError, Result};
pub use fitter::{ChannelContext, ChannelFitter, FitReport};
pub use hierarchy::{CompressionStats, compress_hierarchy};
pub use property::PropertyKind;
pub use scene::{AnimationData, NodeId, RestPose, Scene};
pub use stream::{ChannelReader, DecodedChannel, EncodedStreams};
