//! Copies between the global heightfield and per-patch buffers.
//!
//! Adjacent patches share their boundary row/column. Both copies come from
//! the same global cells, so shared vertices are bit-identical.

use crate::grid::{GridCoordinate, PatchLayout};
use crate::heightfield::Heightfield;

/// Heights for one patch, `size * size` cells, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchBuffer {
    pub coordinate: GridCoordinate,
    pub size: usize,
    pub heights: Vec<f32>,
}

impl PatchBuffer {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.heights[y * self.size + x]
    }
}

/// Copy the patch at row-major `index` out of the global field.
///
/// Returns `None` if `index` is outside the layout or `field` does not
/// match the layout's grid dimensions.
pub fn split_patch(field: &Heightfield, layout: &PatchLayout, index: usize) -> Option<PatchBuffer> {
    if index >= layout.patch_total() || !matches_layout(field, layout) {
        return None;
    }
    let coordinate = layout.coordinate(index);
    let (ox, oy) = layout.cell_offset(coordinate)?;
    let size = layout.patch_size();

    let mut heights = Vec::with_capacity(size * size);
    for y in oy..oy + size {
        heights.extend_from_slice(&field.row(y)[ox..ox + size]);
    }

    Some(PatchBuffer {
        coordinate,
        size,
        heights,
    })
}

/// Write a patch buffer back into the global field.
///
/// Returns `false` and leaves `field` untouched if the patch does not belong
/// to `layout` or has the wrong size.
pub fn stitch_patch(field: &mut Heightfield, layout: &PatchLayout, patch: &PatchBuffer) -> bool {
    let size = layout.patch_size();
    if patch.size != size || patch.heights.len() != size * size || !matches_layout(field, layout) {
        return false;
    }
    let Some((ox, oy)) = layout.cell_offset(patch.coordinate) else {
        return false;
    };

    let width = field.width();
    let cells = field.as_mut_slice();
    for (j, src) in patch.heights.chunks_exact(size).enumerate() {
        let start = (oy + j) * width + ox;
        cells[start..start + size].copy_from_slice(src);
    }
    true
}

fn matches_layout(field: &Heightfield, layout: &PatchLayout) -> bool {
    field.width() == layout.grid_width() && field.height() == layout.grid_height()
}
