//! A host that keeps finished patches in memory and writes them to disk.

use std::path::{Path, PathBuf};

use strata_terrain::{
    GridCoordinate, Heightfield, HostError, PatchBuffer, PatchLayout, TerrainHost, stitch_patch,
};
use tracing::debug;

use crate::DemoError;
use crate::preview::{render_heightfield, render_splat};

/// Writes every patch as raw little-endian `f32` heights, optionally with a
/// PNG per splat map, and stitches patches back into one field for an
/// overview preview.
pub struct FileHost {
    layout: PatchLayout,
    directory: PathBuf,
    write_previews: bool,
    stitched: Heightfield,
}

impl FileHost {
    pub fn new(
        layout: PatchLayout,
        directory: &Path,
        write_previews: bool,
    ) -> Result<Self, DemoError> {
        std::fs::create_dir_all(directory).map_err(|source| DemoError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        Ok(Self {
            layout,
            directory: directory.to_path_buf(),
            write_previews,
            stitched: Heightfield::new(layout.grid_width(), layout.grid_height()),
        })
    }

    pub fn heights_path(&self, coordinate: GridCoordinate) -> PathBuf {
        self.directory
            .join(format!("patch_{}_{}.r32", coordinate.x, coordinate.y))
    }

    pub fn splat_path(&self, coordinate: GridCoordinate, group: usize) -> PathBuf {
        self.directory.join(format!(
            "splat_{}_{}_{group}.png",
            coordinate.x, coordinate.y
        ))
    }

    pub fn stitched(&self) -> &Heightfield {
        &self.stitched
    }

    /// Write `heightmap.png` from every patch installed so far.
    pub fn write_overview(&self, sea_level: f32) -> Result<PathBuf, DemoError> {
        let path = self.directory.join("heightmap.png");
        render_heightfield(&self.stitched, sea_level).write_png(&path)?;
        Ok(path)
    }
}

impl TerrainHost for FileHost {
    fn install_heights(
        &mut self,
        coordinate: GridCoordinate,
        heights: &[f32],
    ) -> Result<(), HostError> {
        let patch = PatchBuffer {
            coordinate,
            size: self.layout.patch_size(),
            heights: heights.to_vec(),
        };
        if !stitch_patch(&mut self.stitched, &self.layout, &patch) {
            return Err(HostError::new(format!("patch {coordinate} is not in the layout")));
        }

        let bytes: Vec<u8> = heights.iter().flat_map(|h| h.to_le_bytes()).collect();
        let path = self.heights_path(coordinate);
        std::fs::write(&path, bytes)
            .map_err(|e| HostError::new(format!("{}: {e}", path.display())))?;
        debug!(%coordinate, path = %path.display(), "wrote patch heights");
        Ok(())
    }

    fn install_splat(
        &mut self,
        coordinate: GridCoordinate,
        group: usize,
        texels: &[[u8; 4]],
    ) -> Result<(), HostError> {
        if !self.write_previews {
            return Ok(());
        }
        let path = self.splat_path(coordinate, group);
        render_splat(self.layout.patch_size(), texels)
            .write_png(&path)
            .map_err(|e| HostError::new(e.to_string()))
    }
}
