//! Demo binary that generates one terrain and writes it to disk.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p strata-demo` to build the default island recipe.
//! Run from the workspace root with
//! `cargo run -p strata-demo -- --recipe recipes/alpine.ron --patches-x 4`
//! to build a custom pipeline on a larger grid.

mod host;
mod preview;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use strata_config::{CliArgs, Config, default_config_dir};
use strata_terrain::{
    BuildOutcome, CancelToken, GenerationError, GeneratorOptions, LayoutError, PatchLayout,
    Recipe, RecipeError, TerrainGenerator,
};
use tracing::{error, info, warn};

use crate::host::FileHost;

/// Sea level used to color the overview preview.
const PREVIEW_SEA_LEVEL: f32 = 0.0;

#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode png: {0}")]
    Png(#[from] png::EncodingError),

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

async fn run(config: Config) -> Result<(), DemoError> {
    let layout = PatchLayout::new(
        config.layout.patch_stride,
        config.layout.patches_x,
        config.layout.patches_y,
    )?;

    let recipe = match &config.generation.recipe {
        Some(path) => Recipe::load(path)?,
        None => {
            info!("no recipe configured, using the built-in island");
            Recipe::island(config.generation.seed as u32)
        }
    };
    let pipeline = Arc::new(recipe.into_pipeline());

    let generator = TerrainGenerator::new(
        layout,
        GeneratorOptions {
            worker_threads: config.generation.worker_threads,
            hand_off_capacity: config.generation.hand_off_capacity,
            seed: config.generation.seed,
        },
    )?;
    let mut host = FileHost::new(
        layout,
        &config.output.directory,
        config.output.write_previews,
    )?;

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling build");
            on_interrupt.cancel();
        }
    });

    info!(
        patches = layout.patch_total(),
        width = layout.grid_width(),
        height = layout.grid_height(),
        "starting build"
    );
    match generator.build(pipeline, &mut host, &cancel).await? {
        BuildOutcome::Completed(report) => {
            for timing in &report.stage_timings {
                info!(
                    stage = %timing.stage,
                    elapsed_ms = timing.elapsed.as_millis() as u64,
                    "stage timing"
                );
            }
            for failure in &report.failures {
                warn!(
                    coordinate = %failure.coordinate,
                    group = ?failure.layer_group,
                    error = %failure.error,
                    "patch was not written"
                );
            }
            if config.output.write_previews {
                let path = host.write_overview(PREVIEW_SEA_LEVEL)?;
                info!(path = %path.display(), "wrote overview preview");
            }
            info!(
                patches = report.patches_installed,
                splat_maps = report.splat_maps_installed,
                directory = %config.output.directory.display(),
                "terrain written"
            );
        }
        BuildOutcome::Cancelled => warn!("build cancelled, nothing was written"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".strata"));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
