//! The global heightfield and its atomic mirror for particle simulators.

use std::sync::atomic::{AtomicU32, Ordering};

/// A row-major grid of terrain heights.
#[derive(Clone, Debug, PartialEq)]
pub struct Heightfield {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl Heightfield {
    /// Create a zero-filled heightfield.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// Wrap existing row-major cells.
    ///
    /// Returns `None` if `cells.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, cells: Vec<f32>) -> Option<Self> {
        (cells.len() == width * height).then_some(Self {
            width,
            height,
            cells,
        })
    }

    /// Build a heightfield by evaluating `f(x, y)` for every cell.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the grid.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.cells[self.index(x, y)]
    }

    /// Sample with coordinates clamped to the grid.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.get(cx, cy)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        let idx = self.index(x, y);
        self.cells[idx] = value;
    }

    pub fn row(&self, y: usize) -> &[f32] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.cells
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.cells
    }

    /// Sum of all cells, accumulated in `f64`.
    pub fn sum(&self) -> f64 {
        self.cells.iter().map(|&h| f64::from(h)).sum()
    }

    /// Mean cell value, or `0.0` for an empty field.
    pub fn mean(&self) -> f64 {
        if self.cells.is_empty() {
            0.0
        } else {
            self.sum() / self.cells.len() as f64
        }
    }

    /// Population variance of all cells.
    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        if self.cells.is_empty() {
            return 0.0;
        }
        self.cells
            .iter()
            .map(|&h| {
                let d = f64::from(h) - mean;
                d * d
            })
            .sum::<f64>()
            / self.cells.len() as f64
    }

    /// Minimum and maximum cell values, or `None` for an empty field.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        let mut iter = self.cells.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), h| (lo.min(h), hi.max(h))))
    }
}

/// A heightfield mirror supporting lock-free additive updates.
///
/// Particle simulators scatter small deltas into overlapping neighborhoods
/// from many threads at once. Each cell stores the bit pattern of an `f32`
/// and [`AtomicHeightfield::add`] retries a compare-exchange until its
/// delta lands.
pub struct AtomicHeightfield {
    width: usize,
    height: usize,
    cells: Vec<AtomicU32>,
}

impl AtomicHeightfield {
    /// Copy a heightfield into atomic storage.
    pub fn from_heightfield(field: &Heightfield) -> Self {
        Self {
            width: field.width,
            height: field.height,
            cells: field
                .cells
                .iter()
                .map(|h| AtomicU32::new(h.to_bits()))
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn load(&self, index: usize) -> f32 {
        f32::from_bits(self.cells[index].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.load(self.index(x, y))
    }

    /// Atomically add `delta` to a cell.
    #[inline]
    pub fn add(&self, index: usize, delta: f32) {
        let cell = &self.cells[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + delta).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Copy the atomic cells back into `field`.
    ///
    /// # Panics
    ///
    /// Panics if `field` has different dimensions.
    pub fn write_back(&self, field: &mut Heightfield) {
        assert_eq!(
            (field.width, field.height),
            (self.width, self.height),
            "atomic mirror dimensions differ from target heightfield"
        );
        for (dst, src) in field.cells.iter_mut().zip(&self.cells) {
            *dst = f32::from_bits(src.load(Ordering::Relaxed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        assert!(Heightfield::from_vec(3, 3, vec![0.0; 8]).is_none());
        assert!(Heightfield::from_vec(3, 3, vec![0.0; 9]).is_some());
    }

    #[test]
    fn test_from_fn_is_row_major() {
        let field = Heightfield::from_fn(4, 3, |x, y| (y * 10 + x) as f32);
        assert_eq!(field.get(2, 1), 12.0);
        assert_eq!(field.row(2), &[20.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn test_get_clamped_at_borders() {
        let field = Heightfield::from_fn(3, 3, |x, y| (y * 3 + x) as f32);
        assert_eq!(field.get_clamped(-5, 0), 0.0);
        assert_eq!(field.get_clamped(10, 10), 8.0);
    }

    #[test]
    fn test_statistics() {
        let field = Heightfield::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(field.sum(), 10.0);
        assert_eq!(field.mean(), 2.5);
        assert_eq!(field.min_max(), Some((1.0, 4.0)));
        assert!((field.variance() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_atomic_add_is_lossless_under_contention() {
        let field = Heightfield::new(2, 2);
        let atomic = AtomicHeightfield::from_heightfield(&field);

        (0..10_000).into_par_iter().for_each(|_| atomic.add(3, 0.5));

        let mut out = field.clone();
        atomic.write_back(&mut out);
        assert_eq!(out.get(1, 1), 5_000.0, "Concurrent adds must not be lost");
        assert_eq!(out.get(0, 0), 0.0);
    }
}
