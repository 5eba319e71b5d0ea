//! Compression driver (glTF -> curves.bin + residuals.bin)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use nether_curves::{CompressionConfig, CompressionStats, EncodedStreams, compress_hierarchy};

use crate::gltf_scene::GltfAnimation;

/// Curve record stream file name.
pub const CURVES_FILE: &str = "curves.bin";
/// Packed residual stream file name.
pub const RESIDUALS_FILE: &str = "residuals.bin";

/// Result of one export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub stats: CompressionStats,
    /// Every file written, streams first.
    pub files: Vec<PathBuf>,
}

/// Read a TOML config, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<CompressionConfig> {
    let Some(path) = path else {
        return Ok(CompressionConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {:?}", path))?;
    CompressionConfig::from_toml_str(&text)
        .with_context(|| format!("Invalid config: {:?}", path))
}

/// Compress one animation of `input` into `output_dir`.
///
/// # Arguments
/// * `input` - Path to the glTF/GLB file
/// * `output_dir` - Directory for the streams and patched buffers (created if missing)
/// * `config` - Fitter selection and error bounds
/// * `animation` - Optional animation name to select (uses first animation if None)
pub fn compress_gltf(
    input: &Path,
    output_dir: &Path,
    config: &CompressionConfig,
    animation: Option<&str>,
) -> Result<ExportSummary> {
    let mut asset = GltfAnimation::load(input, animation)?;
    let fitter = config.build_fitter()?;

    let mut streams = EncodedStreams::new();
    let stats = compress_hierarchy(
        &mut asset.scene,
        fitter.as_ref(),
        config.adjust_children,
        &mut streams,
    )
    .with_context(|| format!("Failed to compress {:?}", input))?;
    asset.write_back()?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    let curves_path = output_dir.join(CURVES_FILE);
    std::fs::write(&curves_path, &streams.curves)
        .with_context(|| format!("Failed to write {:?}", curves_path))?;
    let residuals_path = output_dir.join(RESIDUALS_FILE);
    std::fs::write(&residuals_path, &streams.residuals)
        .with_context(|| format!("Failed to write {:?}", residuals_path))?;

    let mut files = vec![curves_path, residuals_path];
    files.extend(asset.buffers.write_dirty(output_dir)?);

    tracing::info!(
        "Wrote {} ({} curve bytes, {} residual bytes) and {} buffers",
        output_dir.display(),
        streams.curves.len(),
        streams.residuals.len(),
        files.len() - 2
    );

    Ok(ExportSummary { stats, files })
}
