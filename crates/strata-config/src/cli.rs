//! Command-line argument parsing for Strata.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Procedural heightfield generator")]
pub struct CliArgs {
    /// Base seed for randomized stages.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker thread count (0 = automatic).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Patch stride in cells.
    #[arg(long)]
    pub stride: Option<u32>,

    /// Number of patches along X.
    #[arg(long)]
    pub patches_x: Option<u32>,

    /// Number of patches along Y.
    #[arg(long)]
    pub patches_y: Option<u32>,

    /// Path to a RON pipeline recipe.
    #[arg(long)]
    pub recipe: Option<PathBuf>,

    /// Output directory.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.generation.seed = seed;
        }
        if let Some(workers) = args.workers {
            self.generation.worker_threads = workers;
        }
        if let Some(stride) = args.stride {
            self.layout.patch_stride = stride;
        }
        if let Some(px) = args.patches_x {
            self.layout.patches_x = px;
        }
        if let Some(py) = args.patches_y {
            self.layout.patches_y = py;
        }
        if let Some(ref recipe) = args.recipe {
            self.generation.recipe = Some(recipe.clone());
        }
        if let Some(ref out) = args.out {
            self.output.directory = out.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
