//! Programmatic glTF generation for integration tests.
//!
//! Writes a `.gltf` + `.bin` pair with:
//! - 3-node chain (Root -> Spine -> Head)
//! - Root translation and Spine rotation channels sharing one timeline
//! - Head left static

use gltf_json as json;
use json::validation::Checked::Valid;
use std::path::{Path, PathBuf};

/// Keyframes in the generated animation
pub const FRAME_COUNT: usize = 90;
/// Buffer file referenced by the generated glTF
pub const BIN_NAME: &str = "anim.bin";

/// Byte offsets of the animated outputs inside the buffer
pub const ROOT_TRANSLATION_OFFSET: usize = FRAME_COUNT * 4;
pub const SPINE_ROTATION_OFFSET: usize = ROOT_TRANSLATION_OFFSET + FRAME_COUNT * 12;

/// Options that break the asset in specific ways
#[derive(Debug, Clone, Copy, Default)]
pub struct Variant {
    /// Use cubic-spline interpolation on the rotation sampler
    pub cubic_spline: bool,
    /// Give the rotation sampler a shorter time accessor
    pub short_rotation_times: bool,
}

pub fn root_translation(frame: usize) -> [f32; 3] {
    let t = frame as f32 / 30.0;
    [(t * 2.0).sin() * 2.0, 1.0 + 0.1 * t, (t * 1.5).cos() * 0.5]
}

pub fn spine_rotation(frame: usize) -> [f32; 4] {
    let half = (frame as f32 / 30.0 * 1.7).sin() * 0.4;
    [0.0, 0.0, half.sin(), half.cos()]
}

/// Write `scene.gltf` and its buffer into `dir`, returning the glTF path.
pub fn write_chain_gltf(dir: &Path, variant: Variant) -> PathBuf {
    let times: Vec<f32> = (0..FRAME_COUNT).map(|i| i as f32 / 30.0).collect();
    let short_times = &times[..FRAME_COUNT / 2];

    let mut buffer = Vec::new();
    for t in &times {
        buffer.extend_from_slice(&t.to_le_bytes());
    }
    for frame in 0..FRAME_COUNT {
        buffer.extend_from_slice(bytemuck::cast_slice(&root_translation(frame)));
    }
    for frame in 0..FRAME_COUNT {
        buffer.extend_from_slice(bytemuck::cast_slice(&spine_rotation(frame)));
    }
    let short_offset = buffer.len();
    for t in short_times {
        buffer.extend_from_slice(&t.to_le_bytes());
    }

    let views = vec![
        view(0, FRAME_COUNT * 4),
        view(ROOT_TRANSLATION_OFFSET, FRAME_COUNT * 12),
        view(SPINE_ROTATION_OFFSET, FRAME_COUNT * 16),
        view(short_offset, short_times.len() * 4),
    ];
    let accessors = vec![
        time_accessor(0, &times),
        accessor(1, FRAME_COUNT, json::accessor::Type::Vec3),
        accessor(2, FRAME_COUNT, json::accessor::Type::Vec4),
        time_accessor(3, short_times),
    ];

    let nodes = vec![
        node("Root", Some(1), [0.0, 0.0, 0.0]),
        node("Spine", Some(2), [0.0, 1.0, 0.0]),
        node("Head", None, [0.0, 0.5, 0.0]),
    ];

    let rotation_interpolation = if variant.cubic_spline {
        json::animation::Interpolation::CubicSpline
    } else {
        json::animation::Interpolation::Linear
    };
    let rotation_times = if variant.short_rotation_times { 3 } else { 0 };
    let samplers = vec![
        sampler(0, 1, json::animation::Interpolation::Linear),
        sampler(rotation_times, 2, rotation_interpolation),
    ];
    let channels = vec![
        channel(0, 0, json::animation::Property::Translation),
        channel(1, 1, json::animation::Property::Rotation),
    ];

    let root = json::Root {
        accessors,
        animations: vec![json::Animation {
            channels,
            extensions: Default::default(),
            extras: Default::default(),
            name: Some("Sway".to_string()),
            samplers,
        }],
        asset: json::Asset {
            copyright: None,
            extensions: Default::default(),
            extras: Default::default(),
            generator: Some("nether-curve-export-test".to_string()),
            min_version: None,
            version: "2.0".to_string(),
        },
        buffers: vec![json::Buffer {
            byte_length: buffer.len().into(),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: Some(BIN_NAME.to_string()),
        }],
        buffer_views: views,
        cameras: Vec::new(),
        extensions: Default::default(),
        extras: Default::default(),
        extensions_required: Vec::new(),
        extensions_used: Vec::new(),
        images: Vec::new(),
        materials: Vec::new(),
        meshes: Vec::new(),
        nodes,
        samplers: Vec::new(),
        scene: Some(json::Index::new(0)),
        scenes: vec![json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some("TestScene".to_string()),
            nodes: vec![json::Index::new(0)],
        }],
        skins: Vec::new(),
        textures: Vec::new(),
    };

    std::fs::write(dir.join(BIN_NAME), &buffer).expect("Failed to write buffer");
    let path = dir.join("scene.gltf");
    let text = json::serialize::to_string_pretty(&root).expect("Failed to serialize JSON");
    std::fs::write(&path, text).expect("Failed to write glTF");
    path
}

fn view(offset: usize, length: usize) -> json::buffer::View {
    json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: length.into(),
        byte_offset: Some(offset.into()),
        byte_stride: None,
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: None,
    }
}

fn accessor(view: u32, count: usize, type_: json::accessor::Type) -> json::Accessor {
    json::Accessor {
        buffer_view: Some(json::Index::new(view)),
        byte_offset: Some(0u64.into()),
        count: count.into(),
        component_type: Valid(json::accessor::GenericComponentType(
            json::accessor::ComponentType::F32,
        )),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: None,
        max: None,
        name: None,
        normalized: false,
        sparse: None,
    }
}

fn time_accessor(view: u32, times: &[f32]) -> json::Accessor {
    let mut accessor = accessor(view, times.len(), json::accessor::Type::Scalar);
    accessor.min = Some(json::Value::Array(vec![json::Value::from(times[0] as f64)]));
    accessor.max = Some(json::Value::Array(vec![json::Value::from(
        times[times.len() - 1] as f64,
    )]));
    accessor
}

fn node(name: &str, child: Option<u32>, translation: [f32; 3]) -> json::Node {
    json::Node {
        camera: None,
        children: child.map(|c| vec![json::Index::new(c)]),
        extensions: Default::default(),
        extras: Default::default(),
        matrix: None,
        mesh: None,
        name: Some(name.to_string()),
        rotation: None,
        scale: None,
        translation: Some(translation),
        skin: None,
        weights: None,
    }
}

fn sampler(
    input: u32,
    output: u32,
    interpolation: json::animation::Interpolation,
) -> json::animation::Sampler {
    json::animation::Sampler {
        input: json::Index::new(input),
        interpolation: Valid(interpolation),
        output: json::Index::new(output),
        extensions: Default::default(),
        extras: Default::default(),
    }
}

fn channel(
    sampler: u32,
    node: u32,
    property: json::animation::Property,
) -> json::animation::Channel {
    json::animation::Channel {
        sampler: json::Index::new(sampler),
        target: json::animation::Target {
            node: json::Index::new(node),
            path: Valid(property),
            extensions: Default::default(),
            extras: Default::default(),
        },
        extensions: Default::default(),
        extras: Default::default(),
    }
}
