//! Patch grid addressing.
//!
//! Patches are `patch_stride + 1` cells wide and overlap their neighbors by
//! one row/column, so the global grid spans `count * stride + 1` cells along
//! each axis. Every shared vertex lives exactly once in the global buffer.

use std::fmt;

/// Integer coordinate identifying a patch in the host's patch grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoordinate {
    pub x: i32,
    pub y: i32,
}

impl GridCoordinate {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Reasons a patch layout cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// The host reported no patches, or a patch count of zero was requested.
    #[error("patch grid is empty")]
    EmptyGrid,
    /// Patches must be at least one cell apart.
    #[error("patch stride must be greater than zero")]
    ZeroStride,
    /// The global grid would not fit in memory addressing.
    #[error("patch grid of {patches_x}x{patches_y} patches with stride {stride} is too large")]
    TooLarge {
        patches_x: u32,
        patches_y: u32,
        stride: u32,
    },
}

/// Dimensions of the patch grid and the global heightfield it covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchLayout {
    patch_stride: u32,
    patches_x: u32,
    patches_y: u32,
    origin: GridCoordinate,
    grid_width: usize,
    grid_height: usize,
}

impl PatchLayout {
    /// Create a layout of `patches_x * patches_y` patches whose first patch
    /// sits at coordinate `(0, 0)`.
    pub fn new(patch_stride: u32, patches_x: u32, patches_y: u32) -> Result<Self, LayoutError> {
        Self::with_origin(patch_stride, patches_x, patches_y, GridCoordinate::default())
    }

    /// Create a layout whose first patch sits at `origin` in host coordinates.
    pub fn with_origin(
        patch_stride: u32,
        patches_x: u32,
        patches_y: u32,
        origin: GridCoordinate,
    ) -> Result<Self, LayoutError> {
        if patch_stride == 0 {
            return Err(LayoutError::ZeroStride);
        }
        if patches_x == 0 || patches_y == 0 {
            return Err(LayoutError::EmptyGrid);
        }

        let too_large = LayoutError::TooLarge {
            patches_x,
            patches_y,
            stride: patch_stride,
        };
        let axis = |count: u32| {
            (count as usize)
                .checked_mul(patch_stride as usize)
                .and_then(|cells| cells.checked_add(1))
        };
        let grid_width = axis(patches_x).ok_or_else(|| too_large.clone())?;
        let grid_height = axis(patches_y).ok_or_else(|| too_large.clone())?;
        grid_width.checked_mul(grid_height).ok_or(too_large)?;

        Ok(Self {
            patch_stride,
            patches_x,
            patches_y,
            origin,
            grid_width,
            grid_height,
        })
    }

    /// Compute the layout covering a sparse set of host patch coordinates.
    ///
    /// The bounding box of the coordinates becomes the patch grid; its
    /// minimum corner becomes the layout origin.
    pub fn from_coordinates<I>(coordinates: I, patch_stride: u32) -> Result<Self, LayoutError>
    where
        I: IntoIterator<Item = GridCoordinate>,
    {
        let mut bounds: Option<(GridCoordinate, GridCoordinate)> = None;
        for coord in coordinates {
            bounds = Some(match bounds {
                None => (coord, coord),
                Some((min, max)) => (
                    GridCoordinate::new(min.x.min(coord.x), min.y.min(coord.y)),
                    GridCoordinate::new(max.x.max(coord.x), max.y.max(coord.y)),
                ),
            });
        }

        let (min, max) = bounds.ok_or(LayoutError::EmptyGrid)?;
        let patches_x = (i64::from(max.x) - i64::from(min.x) + 1) as u32;
        let patches_y = (i64::from(max.y) - i64::from(min.y) + 1) as u32;
        Self::with_origin(patch_stride, patches_x, patches_y, min)
    }

    /// Cells per patch edge (`stride + 1`).
    pub fn patch_size(&self) -> usize {
        self.patch_stride as usize + 1
    }

    /// Distance in cells between the first vertices of adjacent patches.
    pub fn patch_stride(&self) -> usize {
        self.patch_stride as usize
    }

    /// Patches along X and Y.
    pub fn patch_count(&self) -> (u32, u32) {
        (self.patches_x, self.patches_y)
    }

    /// Total number of patches in the grid.
    pub fn patch_total(&self) -> usize {
        self.patches_x as usize * self.patches_y as usize
    }

    /// Host coordinate of the first patch.
    pub fn origin(&self) -> GridCoordinate {
        self.origin
    }

    /// Global grid width in cells.
    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    /// Global grid height in cells.
    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    /// Number of cells in the global grid.
    pub fn cell_count(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// Row-major offset of a global cell.
    #[inline]
    pub fn flat_offset(&self, x: usize, y: usize) -> usize {
        y * self.grid_width + x
    }

    /// Host coordinate of the patch at a row-major patch index.
    pub fn coordinate(&self, index: usize) -> GridCoordinate {
        let px = self.patches_x as usize;
        GridCoordinate::new(
            self.origin.x + (index % px) as i32,
            self.origin.y + (index / px) as i32,
        )
    }

    /// Row-major patch index of a host coordinate, if it is inside the grid.
    pub fn index_of(&self, coord: GridCoordinate) -> Option<usize> {
        let lx = i64::from(coord.x) - i64::from(self.origin.x);
        let ly = i64::from(coord.y) - i64::from(self.origin.y);
        if lx < 0 || ly < 0 || lx >= i64::from(self.patches_x) || ly >= i64::from(self.patches_y)
        {
            return None;
        }
        Some(ly as usize * self.patches_x as usize + lx as usize)
    }

    /// Global cell offset `(x, y)` of a patch's first vertex.
    pub fn cell_offset(&self, coord: GridCoordinate) -> Option<(usize, usize)> {
        let index = self.index_of(coord)?;
        let px = self.patches_x as usize;
        let stride = self.patch_stride as usize;
        Some(((index % px) * stride, (index / px) * stride))
    }

    /// All patch coordinates, row-major.
    pub fn coordinates(&self) -> impl Iterator<Item = GridCoordinate> + '_ {
        (0..self.patch_total()).map(|i| self.coordinate(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_size_is_stride_plus_one() {
        for stride in [1_u32, 4, 63, 64, 255] {
            for count in 1..4_u32 {
                let layout = PatchLayout::new(stride, count, count).unwrap();
                assert_eq!(layout.patch_size(), layout.patch_stride() + 1);
                assert_eq!(
                    layout.grid_width(),
                    count as usize * stride as usize + 1,
                    "Grid width mismatch for stride {stride}, count {count}"
                );
            }
        }
    }

    #[test]
    fn test_single_patch_grid_dimensions() {
        let layout = PatchLayout::new(64, 1, 1).unwrap();
        assert_eq!(layout.grid_width(), 65);
        assert_eq!(layout.grid_height(), 65);
        assert_eq!(layout.cell_count(), 65 * 65);
    }

    #[test]
    fn test_empty_coordinates_rejected() {
        let result = PatchLayout::from_coordinates(std::iter::empty(), 64);
        assert_eq!(result, Err(LayoutError::EmptyGrid));
    }

    #[test]
    fn test_zero_stride_rejected() {
        assert_eq!(PatchLayout::new(0, 2, 2), Err(LayoutError::ZeroStride));
        assert_eq!(PatchLayout::new(4, 0, 2), Err(LayoutError::EmptyGrid));
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let result = PatchLayout::new(u32::MAX, u32::MAX, u32::MAX);
        assert!(matches!(result, Err(LayoutError::TooLarge { .. })));
    }

    #[test]
    fn test_extents_from_sparse_coordinates() {
        let coords = [
            GridCoordinate::new(-1, 2),
            GridCoordinate::new(1, 2),
            GridCoordinate::new(0, 4),
        ];
        let layout = PatchLayout::from_coordinates(coords, 8).unwrap();

        assert_eq!(layout.patch_count(), (3, 3));
        assert_eq!(layout.origin(), GridCoordinate::new(-1, 2));
        assert_eq!(layout.grid_width(), 25);
    }

    #[test]
    fn test_coordinate_index_round_trip() {
        let layout = PatchLayout::with_origin(4, 3, 2, GridCoordinate::new(5, -3)).unwrap();
        for index in 0..layout.patch_total() {
            let coord = layout.coordinate(index);
            assert_eq!(layout.index_of(coord), Some(index), "Index mismatch at {coord}");
        }
        assert_eq!(layout.index_of(GridCoordinate::new(4, -3)), None);
        assert_eq!(layout.index_of(GridCoordinate::new(8, -3)), None);
    }

    #[test]
    fn test_cell_offset_steps_by_stride() {
        let layout = PatchLayout::new(4, 2, 2).unwrap();
        assert_eq!(layout.cell_offset(GridCoordinate::new(0, 0)), Some((0, 0)));
        assert_eq!(layout.cell_offset(GridCoordinate::new(1, 0)), Some((4, 0)));
        assert_eq!(layout.cell_offset(GridCoordinate::new(1, 1)), Some((4, 4)));
        assert_eq!(layout.cell_offset(GridCoordinate::new(2, 0)), None);
    }

    #[test]
    fn test_coordinates_are_row_major() {
        let layout = PatchLayout::new(4, 2, 2).unwrap();
        let coords: Vec<_> = layout.coordinates().collect();
        assert_eq!(
            coords,
            vec![
                GridCoordinate::new(0, 0),
                GridCoordinate::new(1, 0),
                GridCoordinate::new(0, 1),
                GridCoordinate::new(1, 1),
            ]
        );
    }
}
