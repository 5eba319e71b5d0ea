//! nether-curve-export library
//!
//! glTF front end for `nether-curves`: loads an animation into an arena
//! scene, compresses it, and writes the curve streams plus the patched
//! buffers.

pub mod export;
pub mod gltf_scene;

pub use export::{ExportSummary, compress_gltf, load_config};
pub use gltf_scene::{AccessorLocation, BufferSet, ChannelBinding, GltfAnimation, format_hierarchy};
