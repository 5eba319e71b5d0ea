//! In-memory animated scene graph.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. All channels
//! share one timeline; a node animates any subset of its properties and
//! falls back to its rest pose for the rest.

use glam::{Quat, Vec3};

use crate::error::{CurveError, Result};
use crate::property::PropertyKind;

pub type NodeId = usize;

/// Access to an animated hierarchy.
///
/// The hierarchy processor only talks to scenes through this trait, so asset
/// loaders can expose their own storage without copying it.
pub trait AnimationData {
    /// Shared sample times, strictly increasing.
    fn times(&self) -> &[f32];

    fn node_count(&self) -> usize;

    fn node_name(&self, node: NodeId) -> &str;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> &[NodeId];

    /// Values per sample, or `None` if the property is not animated.
    fn channel_dimension(&self, node: NodeId, property: PropertyKind) -> Option<usize>;

    fn samples(&self, node: NodeId, property: PropertyKind) -> Option<&[f32]>;

    fn samples_mut(&mut self, node: NodeId, property: PropertyKind) -> Option<&mut [f32]>;

    /// Rest-pose value used when the property is not animated.
    fn default_local(&self, node: NodeId, property: PropertyKind) -> Vec<f32>;

    /// Record per-axis value bounds of a channel.
    fn set_bounds(&mut self, node: NodeId, property: PropertyKind, min: Vec<f32>, max: Vec<f32>);

    fn is_animated(&self, node: NodeId) -> bool {
        PropertyKind::ALL
            .iter()
            .any(|&p| self.channel_dimension(node, p).is_some())
    }
}

/// Local transform used when a property has no channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RestPose {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub weights: Vec<f32>,
}

impl Default for RestPose {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            weights: Vec::new(),
        }
    }
}

/// Sampled values of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub dimension: usize,
    /// `times.len() * dimension` values, sample-major.
    pub values: Vec<f32>,
    /// Per-axis bounds, filled in after compression.
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub rest: RestPose,
    channels: [Option<Channel>; 4],
}

impl SceneNode {
    pub fn channel(&self, property: PropertyKind) -> Option<&Channel> {
        self.channels[property.index()].as_ref()
    }
}

/// Check that `times` is finite and strictly increasing.
pub fn validate_times(times: &[f32]) -> Result<()> {
    if let Some(index) = times.iter().position(|t| !t.is_finite()) {
        return Err(CurveError::NonFiniteTime { index });
    }
    if let Some(index) = times.windows(2).position(|w| w[1] <= w[0]) {
        return Err(CurveError::NonIncreasingTimes { index: index + 1 });
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    times: Vec<f32>,
    nodes: Vec<SceneNode>,
}

impl Scene {
    /// Empty scene over `times`, which must be strictly increasing.
    pub fn new(times: Vec<f32>) -> Result<Self> {
        validate_times(&times)?;
        Ok(Self {
            times,
            nodes: Vec::new(),
        })
    }

    /// Append a node. A parent must already exist.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        rest: RestPose,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SceneNode {
            name: name.into(),
            parent,
            rest,
            ..SceneNode::default()
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    /// Make `child` a child of `parent`, for loaders that list children
    /// before their parents.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) {
        if let Some(old) = self.nodes[child].parent.replace(parent) {
            self.nodes[old].children.retain(|&c| c != child);
        }
        self.nodes[parent].children.push(child);
    }

    /// Attach sampled values for `property`.
    pub fn set_channel(
        &mut self,
        node: NodeId,
        property: PropertyKind,
        dimension: usize,
        values: Vec<f32>,
    ) -> Result<()> {
        if let Some(expected) = property.fixed_dimension()
            && expected != dimension
        {
            return Err(CurveError::DimensionMismatch {
                property,
                expected,
                actual: dimension,
            });
        }
        if dimension == 0 || values.len() != self.times.len() * dimension {
            return Err(CurveError::SampleCountMismatch {
                node,
                property,
                expected: self.times.len(),
                actual: values.len() / dimension.max(1),
            });
        }
        self.nodes[node].channels[property.index()] = Some(Channel {
            dimension,
            values,
            min: Vec::new(),
            max: Vec::new(),
        });
        Ok(())
    }

    pub fn node(&self, node: NodeId) -> &SceneNode {
        &self.nodes[node]
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn channel(&self, node: NodeId, property: PropertyKind) -> Option<&Channel> {
        self.nodes[node].channel(property)
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }
}

impl AnimationData for Scene {
    fn times(&self) -> &[f32] {
        &self.times
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_name(&self, node: NodeId) -> &str {
        &self.nodes[node].name
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    fn channel_dimension(&self, node: NodeId, property: PropertyKind) -> Option<usize> {
        self.channel(node, property).map(|c| c.dimension)
    }

    fn samples(&self, node: NodeId, property: PropertyKind) -> Option<&[f32]> {
        self.channel(node, property).map(|c| c.values.as_slice())
    }

    fn samples_mut(&mut self, node: NodeId, property: PropertyKind) -> Option<&mut [f32]> {
        self.nodes[node].channels[property.index()]
            .as_mut()
            .map(|c| c.values.as_mut_slice())
    }

    fn default_local(&self, node: NodeId, property: PropertyKind) -> Vec<f32> {
        let rest = &self.nodes[node].rest;
        match property {
            PropertyKind::Translation => rest.translation.to_array().to_vec(),
            PropertyKind::Rotation => rest.rotation.to_array().to_vec(),
            PropertyKind::Scale => rest.scale.to_array().to_vec(),
            PropertyKind::Weights => rest.weights.clone(),
        }
    }

    fn set_bounds(&mut self, node: NodeId, property: PropertyKind, min: Vec<f32>, max: Vec<f32>) {
        if let Some(channel) = self.nodes[node].channels[property.index()].as_mut() {
            channel.min = min;
            channel.max = max;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_increasing_times() {
        assert!(matches!(
            Scene::new(vec![0.0, 1.0, 1.0]),
            Err(CurveError::NonIncreasingTimes { index: 2 })
        ));
        assert!(Scene::new(vec![0.0, 0.5, 1.0]).is_ok());
    }

    #[test]
    fn test_rejects_non_finite_times() {
        assert!(matches!(
            Scene::new(vec![f32::NAN]),
            Err(CurveError::NonFiniteTime { index: 0 })
        ));
        assert!(matches!(
            Scene::new(vec![0.0, f32::INFINITY]),
            Err(CurveError::NonFiniteTime { index: 1 })
        ));
        assert!(matches!(
            Scene::new(vec![f32::NEG_INFINITY, 0.0]),
            Err(CurveError::NonFiniteTime { index: 0 })
        ));
        assert!(Scene::new(vec![2.5]).is_ok());
    }

    #[test]
    fn test_add_node_links_children() {
        let mut scene = Scene::new(vec![0.0]).unwrap();
        let root = scene.add_node("root", None, RestPose::default());
        let child = scene.add_node("child", Some(root), RestPose::default());
        assert_eq!(scene.children(root), &[child]);
        assert_eq!(scene.parent(child), Some(root));
        assert_eq!(scene.roots().collect::<Vec<_>>(), vec![root]);
    }

    #[test]
    fn test_attach_moves_child() {
        let mut scene = Scene::new(vec![0.0]).unwrap();
        let leaf = scene.add_node("leaf", None, RestPose::default());
        let a = scene.add_node("a", None, RestPose::default());
        let b = scene.add_node("b", None, RestPose::default());
        scene.attach(leaf, a);
        scene.attach(leaf, b);
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), &[leaf]);
        assert_eq!(scene.roots().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn test_set_channel_validates_shape() {
        let mut scene = Scene::new(vec![0.0, 1.0]).unwrap();
        let node = scene.add_node("n", None, RestPose::default());

        assert!(matches!(
            scene.set_channel(node, PropertyKind::Rotation, 3, vec![0.0; 6]),
            Err(CurveError::DimensionMismatch { expected: 4, actual: 3, .. })
        ));
        assert!(matches!(
            scene.set_channel(node, PropertyKind::Translation, 3, vec![0.0; 9]),
            Err(CurveError::SampleCountMismatch { expected: 2, actual: 3, .. })
        ));
        scene
            .set_channel(node, PropertyKind::Weights, 2, vec![0.0; 4])
            .unwrap();
        assert_eq!(
            scene.channel_dimension(node, PropertyKind::Weights),
            Some(2)
        );
        assert!(scene.is_animated(node));
    }

    #[test]
    fn test_default_local_uses_rest_pose() {
        let mut scene = Scene::new(vec![0.0]).unwrap();
        let node = scene.add_node(
            "n",
            None,
            RestPose {
                translation: Vec3::new(0.0, 1.0, 0.0),
                ..RestPose::default()
            },
        );
        assert_eq!(
            scene.default_local(node, PropertyKind::Translation),
            vec![0.0, 1.0, 0.0]
        );
        assert_eq!(
            scene.default_local(node, PropertyKind::Rotation),
            vec![0.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            scene.default_local(node, PropertyKind::Scale),
            vec![1.0, 1.0, 1.0]
        );
    }
}
