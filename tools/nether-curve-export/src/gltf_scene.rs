//! glTF adapter
//!
//! Builds an arena [`Scene`] from one glTF animation and writes the
//! compressed samples back into the asset's buffers.
//!
//! Node ids match glTF node indices. All channels of the animation must
//! share the timeline of its first channel.

use anyhow::{Context, Result, bail};
use glam::{Quat, Vec3};
use hashbrown::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use nether_curves::{AnimationData, NodeId, PropertyKind, RestPose, Scene};

// ============================================================================
// Buffers
// ============================================================================

/// Where an accessor's float elements live inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorLocation {
    pub buffer: usize,
    /// Byte offset of the first element.
    pub offset: usize,
    /// Bytes between consecutive elements.
    pub stride: usize,
    /// Floats per element.
    pub components: usize,
    pub count: usize,
}

impl AccessorLocation {
    /// Locate a dense `f32` accessor.
    pub fn from_accessor(accessor: &gltf::Accessor) -> Result<Self> {
        if accessor.sparse().is_some() {
            bail!("Accessor {} is sparse, which is not supported", accessor.index());
        }
        if accessor.data_type() != gltf::accessor::DataType::F32 {
            bail!(
                "Accessor {} has {:?} components, expected F32",
                accessor.index(),
                accessor.data_type()
            );
        }
        let view = accessor
            .view()
            .with_context(|| format!("Accessor {} has no buffer view", accessor.index()))?;
        let components = accessor.dimensions().multiplicity();
        Ok(Self {
            buffer: view.buffer().index(),
            offset: view.offset() + accessor.offset(),
            stride: view.stride().unwrap_or(components * 4),
            components,
            count: accessor.count(),
        })
    }

    /// Total floats covered by the accessor.
    pub fn len(&self) -> usize {
        self.count * self.components
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn byte_offset(&self, index: usize) -> usize {
        let (element, component) = (index / self.components, index % self.components);
        self.offset + element * self.stride + component * 4
    }
}

/// Byte contents of every buffer of one asset.
///
/// Loaded once per export and shared by every channel read and write.
#[derive(Debug, Default)]
pub struct BufferSet {
    buffers: Vec<Vec<u8>>,
    dirty: HashSet<usize>,
}

impl BufferSet {
    pub fn new(buffers: Vec<Vec<u8>>) -> Self {
        Self {
            buffers,
            dirty: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty.contains(&index)
    }

    pub fn read_f32s(&self, location: &AccessorLocation) -> Result<Vec<f32>> {
        let buffer = self
            .get(location.buffer)
            .with_context(|| format!("Buffer {} not loaded", location.buffer))?;
        (0..location.len())
            .map(|i| {
                let at = location.byte_offset(i);
                let bytes = buffer
                    .get(at..at + 4)
                    .with_context(|| format!("Buffer {} too short", location.buffer))?;
                Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            })
            .collect()
    }

    pub fn write_f32s(&mut self, location: &AccessorLocation, values: &[f32]) -> Result<()> {
        if values.len() != location.len() {
            bail!(
                "Writing {} floats into an accessor of {}",
                values.len(),
                location.len()
            );
        }
        let buffer = self
            .buffers
            .get_mut(location.buffer)
            .with_context(|| format!("Buffer {} not loaded", location.buffer))?;
        for (i, value) in values.iter().enumerate() {
            let at = location.byte_offset(i);
            buffer
                .get_mut(at..at + 4)
                .with_context(|| format!("Buffer {} too short", location.buffer))?
                .copy_from_slice(&value.to_le_bytes());
        }
        self.dirty.insert(location.buffer);
        Ok(())
    }

    /// Write every modified buffer to `dir/buffer<N>.bin`.
    pub fn write_dirty(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut indices: Vec<usize> = self.dirty.iter().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|index| {
                let path = dir.join(format!("buffer{index}.bin"));
                std::fs::write(&path, &self.buffers[index])
                    .with_context(|| format!("Failed to write {:?}", path))?;
                Ok(path)
            })
            .collect()
    }
}

// ============================================================================
// Scene
// ============================================================================

/// Accessor backing one animated (node, property) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelBinding {
    pub node: NodeId,
    pub property: PropertyKind,
    pub location: AccessorLocation,
}

/// One glTF animation loaded as a [`Scene`].
#[derive(Debug)]
pub struct GltfAnimation {
    pub name: Option<String>,
    pub scene: Scene,
    pub bindings: Vec<ChannelBinding>,
    pub buffers: BufferSet,
}

impl GltfAnimation {
    /// Load `input` and select an animation by name (first if `None`).
    pub fn load(input: &Path, animation: Option<&str>) -> Result<Self> {
        let (document, buffers, _images) =
            gltf::import(input).with_context(|| format!("Failed to load glTF: {:?}", input))?;
        let buffers = buffers.into_iter().map(|data| data.0).collect();
        Self::from_document(&document, buffers, animation)
    }

    pub fn from_document(
        document: &gltf::Document,
        buffers: Vec<Vec<u8>>,
        animation_name: Option<&str>,
    ) -> Result<Self> {
        let buffers = BufferSet::new(buffers);

        let animation = match animation_name {
            Some(name) => document
                .animations()
                .find(|a| a.name() == Some(name))
                .with_context(|| {
                    let available: Vec<_> =
                        document.animations().filter_map(|a| a.name()).collect();
                    format!(
                        "Animation '{}' not found in glTF. Available animations: {:?}",
                        name, available
                    )
                })?,
            None => document
                .animations()
                .next()
                .context("No animations found in glTF file")?,
        };

        let times = read_timeline(&animation, &buffers)?;
        let mut scene = Scene::new(times.clone())
            .with_context(|| format!("Animation {} has unordered keyframes", animation.index()))?;

        for node in document.nodes() {
            let (translation, rotation, scale) = node.transform().decomposed();
            let weights = match node.weights() {
                Some(weights) => weights.to_vec(),
                None => node
                    .mesh()
                    .and_then(|m| m.weights().map(<[f32]>::to_vec))
                    .unwrap_or_default(),
            };
            let name = node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node{}", node.index()));
            scene.add_node(
                name,
                None,
                RestPose {
                    translation: Vec3::from_array(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from_array(scale),
                    weights,
                },
            );
        }
        for node in document.nodes() {
            for child in node.children() {
                scene.attach(child.index(), node.index());
            }
        }

        let mut bound: HashMap<(NodeId, PropertyKind), usize> = HashMap::new();
        let mut bindings = Vec::new();
        for (index, channel) in animation.channels().enumerate() {
            let sampler = channel.sampler();
            if sampler.interpolation() == gltf::animation::Interpolation::CubicSpline {
                bail!("Channel {index} uses cubic-spline interpolation, which is not supported");
            }
            let input = sampler.input();
            if input.count() != times.len() {
                bail!(
                    "Channel {index} has {} keyframes, expected {} like the first channel",
                    input.count(),
                    times.len()
                );
            }

            let node = channel.target().node().index();
            let property = match channel.target().property() {
                gltf::animation::Property::Translation => PropertyKind::Translation,
                gltf::animation::Property::Rotation => PropertyKind::Rotation,
                gltf::animation::Property::Scale => PropertyKind::Scale,
                gltf::animation::Property::MorphTargetWeights => PropertyKind::Weights,
            };
            if let Some(previous) = bound.insert((node, property), index) {
                bail!("Channels {previous} and {index} both animate {property} of node {node}");
            }

            let location = AccessorLocation::from_accessor(&sampler.output())
                .with_context(|| format!("Channel {index} output"))?;
            let values = buffers.read_f32s(&location)?;
            let dimension = values.len() / times.len().max(1);
            scene
                .set_channel(node, property, dimension, values)
                .with_context(|| format!("Channel {index} of node {node}"))?;
            bindings.push(ChannelBinding {
                node,
                property,
                location,
            });
        }

        tracing::info!(
            "Loaded animation {:?}: {} nodes, {} channels, {} keyframes",
            animation.name().unwrap_or("<unnamed>"),
            scene.node_count(),
            bindings.len(),
            times.len()
        );

        Ok(Self {
            name: animation.name().map(str::to_string),
            scene,
            bindings,
            buffers,
        })
    }

    /// Copy the scene's channel samples back into the buffers.
    pub fn write_back(&mut self) -> Result<()> {
        for binding in &self.bindings {
            let values = self
                .scene
                .samples(binding.node, binding.property)
                .with_context(|| {
                    format!("Node {} lost its {} channel", binding.node, binding.property)
                })?;
            self.buffers.write_f32s(&binding.location, values)?;
        }
        Ok(())
    }
}

fn read_timeline(animation: &gltf::Animation, buffers: &BufferSet) -> Result<Vec<f32>> {
    let channel = animation
        .channels()
        .next()
        .context("Animation has no channels")?;
    let input = channel.sampler().input();
    if input.dimensions() != gltf::accessor::Dimensions::Scalar {
        bail!("Time accessor {} is not scalar", input.index());
    }
    let location = AccessorLocation::from_accessor(&input).context("Time accessor")?;
    buffers.read_f32s(&location)
}

/// Indented hierarchy listing; `A` marks animated nodes, `S` static ones.
pub fn format_hierarchy(scene: &Scene) -> String {
    let mut out = String::new();
    let mut stack: Vec<(NodeId, usize)> = scene.roots().map(|n| (n, 0)).collect();
    stack.reverse();
    while let Some((node, depth)) = stack.pop() {
        let marker = if scene.is_animated(node) { 'A' } else { 'S' };
        out.push_str(&format!(
            "{}[{}] {}\n",
            "  ".repeat(depth),
            marker,
            scene.node_name(node)
        ));
        stack.extend(scene.children(node).iter().rev().map(|&c| (c, depth + 1)));
    }
    out
}
