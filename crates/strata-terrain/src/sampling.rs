//! Parallel per-cell height sampling.

use std::sync::Arc;

use rayon::prelude::*;

use crate::cancel::{CancelToken, Cancelled};
use crate::grid::PatchLayout;
use crate::heightfield::Heightfield;
use crate::providers::{TopographyProvider, accumulate};

/// Normalized coordinate of cell `i` on an axis of `len` cells.
///
/// The first cell maps to `0.0` and the last to `1.0`.
#[inline]
pub(crate) fn normalized(i: usize, len: usize) -> f32 {
    if len <= 1 {
        0.0
    } else {
        (i as f64 / (len - 1) as f64) as f32
    }
}

/// Fill the global heightfield by folding every provider at each cell.
///
/// Rows are sampled in parallel on the current rayon pool. Each cell depends
/// only on its own `(u, v)`, so the result is independent of scheduling.
/// Cancellation is observed at row boundaries.
pub fn sample_heightfield(
    layout: &PatchLayout,
    providers: &[Arc<dyn TopographyProvider>],
    cancel: &CancelToken,
) -> Result<Heightfield, Cancelled> {
    let width = layout.grid_width();
    let height = layout.grid_height();
    let mut field = Heightfield::new(width, height);

    field
        .as_mut_slice()
        .par_chunks_mut(width)
        .enumerate()
        .try_for_each(|(y, row)| {
            cancel.check()?;
            let v = normalized(y, height);
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = accumulate(providers, normalized(x, width), v);
            }
            Ok::<(), Cancelled>(())
        })?;

    Ok(field)
}
