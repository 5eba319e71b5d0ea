//! nether-curve-export - animation curve compressor
//!
//! Compresses the animation channels of a glTF/GLB file into curve and
//! residual streams (curves.bin, residuals.bin) and writes the buffers with
//! the corrected samples next to them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nether_curve_export::{GltfAnimation, compress_gltf, format_hierarchy, load_config};
use nether_curves::FitterKind;

#[derive(Parser)]
#[command(name = "nether-curve-export")]
#[command(about = "Nethercore animation curve compressor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress one animation of a glTF/GLB file
    Compress {
        /// Input glTF/GLB file
        input: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "out")]
        output: PathBuf,

        /// Compression settings (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fitter override (bit-budget, chebyshev, windowed, knots, cubic, quantize)
        #[arg(short, long)]
        fitter: Option<String>,

        /// Animation name (defaults to the first animation)
        #[arg(short, long)]
        animation: Option<String>,

        /// Keep descendants' local samples instead of correcting them
        #[arg(long)]
        no_adjust_children: bool,
    },

    /// Print the node hierarchy ([A] animated, [S] static)
    List {
        /// Input glTF/GLB file
        input: PathBuf,

        /// Animation name (defaults to the first animation)
        #[arg(short, long)]
        animation: Option<String>,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compress {
            input,
            output,
            config,
            fitter,
            animation,
            no_adjust_children,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(name) = fitter {
                config.fitter = FitterKind::parse(&name)?;
            }
            if no_adjust_children {
                config.adjust_children = false;
            }

            let summary = compress_gltf(&input, &output, &config, animation.as_deref())?;
            println!(
                "{} -> {} ({:.2}x)",
                summary.stats.input_bytes,
                summary.stats.output_bytes,
                summary.stats.ratio()
            );
        }
        Commands::List { input, animation } => {
            let asset = GltfAnimation::load(&input, animation.as_deref())?;
            print!("{}", format_hierarchy(&asset.scene));
        }
    }

    Ok(())
}
