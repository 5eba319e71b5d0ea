//! Hierarchy-aware channel compression.
//!
//! Nodes are processed root-first. After a node's channels are replaced by
//! their compressed reconstruction, its descendants' local transforms are
//! rewritten against the reconstructed parent so their world transforms
//! stay where they were before compression:
//!
//! ```text
//! child_local' = inverse(parent_world') * child_world
//! ```
//!
//! A descendant without a channel for some property cannot absorb the
//! correction there. If its rest value no longer matches, the mismatch is
//! pushed one level further down to that descendant's own children.

use glam::{DMat4, DQuat, DVec3};

use crate::error::{CurveError, Result};
use crate::fitter::{ChannelContext, ChannelFitter, FitReport};
use crate::math::{
    align_hemisphere, compose, decompose, quat_distance_squared, quat_from_slice, try_inverse,
    vec3_from_slice,
};
use crate::property::PropertyKind;
use crate::scene::{AnimationData, NodeId, validate_times};
use crate::stream::EncodedStreams;

/// Squared distance beyond which a rest value counts as changed.
const REST_MISMATCH_EPSILON: f64 = 1e-9;

/// Processing stage of a node; stages only advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeState {
    Pending,
    WorldComputed,
    ChannelsCompressed,
    ChildrenCorrected,
}

/// Totals over every compressed channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub channels: usize,
    pub input_bytes: usize,
    pub output_bytes: usize,
}

impl CompressionStats {
    /// Input size divided by output size.
    pub fn ratio(&self) -> f64 {
        if self.output_bytes == 0 {
            return 0.0;
        }
        self.input_bytes as f64 / self.output_bytes as f64
    }
}

/// Compress every animated channel of `data` in place.
///
/// # Arguments
/// * `data` - Scene whose channels are overwritten with their reconstruction
/// * `fitter` - Strategy used for every channel
/// * `adjust_children` - Rewrite descendants to preserve world transforms
/// * `streams` - Receives the encoded channels in processing order
pub fn compress_hierarchy<A: AnimationData + ?Sized>(
    data: &mut A,
    fitter: &dyn ChannelFitter,
    adjust_children: bool,
    streams: &mut EncodedStreams,
) -> Result<CompressionStats> {
    let times = data.times().to_vec();
    validate_times(&times)?;
    validate_channels(data, times.len())?;

    let order = root_first_order(data);
    let mut states = vec![NodeState::Pending; data.node_count()];
    let mut world: Vec<Vec<DMat4>> = vec![Vec::new(); data.node_count()];

    for &node in &order {
        let parent_world = data.parent(node).map(|p| world[p].as_slice());
        world[node] = world_transforms(data, node, parent_world, times.len());
        states[node] = NodeState::WorldComputed;
    }

    tracing::info!(
        "Compressing {} nodes over {} samples with {}",
        order.len(),
        times.len(),
        fitter.name()
    );

    let mut stats = CompressionStats::default();
    for &node in &order {
        debug_assert!(
            data.parent(node)
                .is_none_or(|p| states[p] >= NodeState::ChannelsCompressed)
        );

        let mut node_report = FitReport::default();
        let mut channels = 0;
        for property in PropertyKind::ALL {
            let Some(dimension) = data.channel_dimension(node, property) else {
                continue;
            };
            let ctx = ChannelContext {
                node,
                property,
                dimension,
                is_root: data.parent(node).is_none(),
                times: &times,
            };
            let Some(values) = data.samples_mut(node, property) else {
                continue;
            };
            node_report += fitter.fit_channel(&ctx, values, streams)?;
            channels += 1;

            let (min, max) = axis_bounds(values, dimension);
            data.set_bounds(node, property, min, max);
        }
        states[node] = NodeState::ChannelsCompressed;

        if channels == 0 {
            continue;
        }
        tracing::info!(
            "Node '{}': {} channels, {} -> {} bytes",
            data.node_name(node),
            channels,
            node_report.input_bytes,
            node_report.output_bytes
        );
        stats.channels += channels;
        stats.input_bytes += node_report.input_bytes;
        stats.output_bytes += node_report.output_bytes;

        if adjust_children {
            correct_descendants(data, node, &mut world, &mut states, times.len())?;
        }
    }

    tracing::info!(
        "Compressed {} channels: {} -> {} bytes ({:.2}x)",
        stats.channels,
        stats.input_bytes,
        stats.output_bytes,
        stats.ratio()
    );
    Ok(stats)
}

fn validate_channels<A: AnimationData + ?Sized>(data: &A, frames: usize) -> Result<()> {
    for node in 0..data.node_count() {
        for property in PropertyKind::ALL {
            let (Some(dimension), Some(values)) = (
                data.channel_dimension(node, property),
                data.samples(node, property),
            ) else {
                continue;
            };
            if let Some(expected) = property.fixed_dimension()
                && expected != dimension
            {
                return Err(CurveError::DimensionMismatch {
                    property,
                    expected,
                    actual: dimension,
                });
            }
            if dimension == 0 || values.len() != frames * dimension {
                return Err(CurveError::SampleCountMismatch {
                    node,
                    property,
                    expected: frames,
                    actual: values.len() / dimension.max(1),
                });
            }
        }
    }
    Ok(())
}

/// Nodes sorted by distance from their root; ties keep index order.
pub fn root_first_order<A: AnimationData + ?Sized>(data: &A) -> Vec<NodeId> {
    let count = data.node_count();
    let depth = |mut node: NodeId| {
        let mut d = 0usize;
        while let Some(parent) = data.parent(node) {
            node = parent;
            d += 1;
            if d > count {
                break;
            }
        }
        d
    };
    let mut order: Vec<NodeId> = (0..count).collect();
    order.sort_by_cached_key(|&n| depth(n));
    order
}

/// Local transform of `node` at `frame`, using rest values for missing channels.
pub fn local_transform<A: AnimationData + ?Sized>(data: &A, node: NodeId, frame: usize) -> DMat4 {
    let translation = match data.samples(node, PropertyKind::Translation) {
        Some(values) => vec3_from_slice(&values[frame * 3..frame * 3 + 3]),
        None => vec3_from_slice(&data.default_local(node, PropertyKind::Translation)),
    };
    let rotation = match data.samples(node, PropertyKind::Rotation) {
        Some(values) => quat_from_slice(&values[frame * 4..frame * 4 + 4]),
        None => quat_from_slice(&data.default_local(node, PropertyKind::Rotation)),
    };
    let scale = match data.samples(node, PropertyKind::Scale) {
        Some(values) => vec3_from_slice(&values[frame * 3..frame * 3 + 3]),
        None => vec3_from_slice(&data.default_local(node, PropertyKind::Scale)),
    };
    compose(translation, rotation, scale)
}

/// World transform of `node` for every frame.
pub fn world_transforms<A: AnimationData + ?Sized>(
    data: &A,
    node: NodeId,
    parent_world: Option<&[DMat4]>,
    frames: usize,
) -> Vec<DMat4> {
    (0..frames)
        .map(|frame| {
            let local = local_transform(data, node, frame);
            match parent_world {
                Some(parent) => parent[frame] * local,
                None => local,
            }
        })
        .collect()
}

fn axis_bounds(values: &[f32], dimension: usize) -> (Vec<f32>, Vec<f32>) {
    let mut min = vec![f32::INFINITY; dimension];
    let mut max = vec![f32::NEG_INFINITY; dimension];
    for sample in values.chunks_exact(dimension) {
        for (axis, &v) in sample.iter().enumerate() {
            min[axis] = min[axis].min(v);
            max[axis] = max[axis].max(v);
        }
    }
    (min, max)
}

/// Rewrite the children of `node` (and, where needed, deeper descendants)
/// against `node`'s reconstructed world transform.
///
/// `world` holds each node's pre-compression world transform until that node
/// is visited here, at which point it is replaced by the reconstructed one.
fn correct_descendants<A: AnimationData + ?Sized>(
    data: &mut A,
    node: NodeId,
    world: &mut [Vec<DMat4>],
    states: &mut [NodeState],
    frames: usize,
) -> Result<()> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let parent_world = data.parent(current).map(|p| world[p].as_slice());
        let rebuilt = world_transforms(data, current, parent_world, frames);
        world[current] = rebuilt;

        let inverses = world[current]
            .iter()
            .enumerate()
            .map(|(frame, m)| {
                try_inverse(m).ok_or(CurveError::SingularTransform {
                    node: current,
                    frame,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let children = data.children(current).to_vec();
        for child in children {
            let locals: Vec<(DVec3, DQuat, DVec3)> = (0..frames)
                .map(|frame| decompose(&(inverses[frame] * world[child][frame])))
                .collect();

            let translation_moved =
                absorb_vec3(data, child, PropertyKind::Translation, &locals, |l| l.0);
            let rotation_moved = absorb_rotation(data, child, &locals);
            let scale_moved = absorb_vec3(data, child, PropertyKind::Scale, &locals, |l| l.2);

            if translation_moved || rotation_moved || scale_moved {
                tracing::debug!(
                    "Node '{}' has no channel to absorb its parent's error, pushing to its children",
                    data.node_name(child)
                );
                stack.push(child);
            }
        }
        states[current] = NodeState::ChildrenCorrected;
    }
    Ok(())
}

/// Write corrected vectors into the child's channel.
///
/// Returns `true` when the child has no channel and its rest value differs
/// from the corrected value on some frame.
fn absorb_vec3<A: AnimationData + ?Sized>(
    data: &mut A,
    child: NodeId,
    property: PropertyKind,
    locals: &[(DVec3, DQuat, DVec3)],
    pick: impl Fn(&(DVec3, DQuat, DVec3)) -> DVec3,
) -> bool {
    match data.samples_mut(child, property) {
        Some(values) => {
            for (sample, local) in values.chunks_exact_mut(3).zip(locals) {
                let v = pick(local);
                sample.copy_from_slice(&[v.x as f32, v.y as f32, v.z as f32]);
            }
            false
        }
        None => {
            let rest = vec3_from_slice(&data.default_local(child, property));
            locals
                .iter()
                .any(|l| (pick(l) - rest).length_squared() > REST_MISMATCH_EPSILON)
        }
    }
}

fn absorb_rotation<A: AnimationData + ?Sized>(
    data: &mut A,
    child: NodeId,
    locals: &[(DVec3, DQuat, DVec3)],
) -> bool {
    match data.samples_mut(child, PropertyKind::Rotation) {
        Some(values) => {
            for (sample, local) in values.chunks_exact_mut(4).zip(locals) {
                let q = align_hemisphere(local.1, quat_from_slice(sample));
                sample.copy_from_slice(&[q.x as f32, q.y as f32, q.z as f32, q.w as f32]);
            }
            false
        }
        None => {
            let rest = quat_from_slice(&data.default_local(child, PropertyKind::Rotation));
            locals
                .iter()
                .any(|l| quat_distance_squared(l.1, rest) > REST_MISMATCH_EPSILON)
        }
    }
}
