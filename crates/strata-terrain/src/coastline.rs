//! Exact Euclidean distance transform and the coastline field built on it.
//!
//! The transform is separable: a row phase computes squared 1D distances to
//! the nearest seed along each row, then a column phase takes the lower
//! envelope of the parabolas `y -> (y - q)^2 + g(q)` rooted at every row `q`.
//! Both phases are parallel over independent lines; the column phase starts
//! only after the whole row phase has finished.

use rayon::prelude::*;

use crate::heightfield::Heightfield;

/// Stand-in for "no seed on this line". Large enough that any real squared
/// distance is smaller, small enough that sums stay finite in `f64`.
const FAR: f64 = 1e20;

/// Squared distance along one row to the nearest seed, or [`FAR`].
fn row_distances(seeds: &[bool], out: &mut [f64]) {
    for (d, &seed) in out.iter_mut().zip(seeds) {
        *d = if seed { 0.0 } else { FAR };
    }
    for i in 1..out.len() {
        out[i] = out[i].min(out[i - 1] + 1.0);
    }
    for i in (0..out.len().saturating_sub(1)).rev() {
        out[i] = out[i].min(out[i + 1] + 1.0);
    }
    for d in out.iter_mut() {
        if *d < FAR {
            *d *= *d;
        } else {
            *d = FAR;
        }
    }
}

/// Lower envelope of parabolas over one column of squared row distances.
///
/// `f[q]` is the squared horizontal distance at row `q`. Rows without a
/// seed are skipped so they never own an envelope segment. Returns squared
/// Euclidean distances, [`FAR`] where the column saw no finite value.
fn column_envelope(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut vertices: Vec<usize> = Vec::with_capacity(n);
    let mut starts: Vec<f64> = Vec::with_capacity(n + 1);

    for q in (0..n).filter(|&q| f[q] < FAR) {
        let fq = f[q] + (q * q) as f64;
        let mut start = f64::NEG_INFINITY;
        while let Some(&top) = vertices.last() {
            let denom = 2.0 * (q as f64 - top as f64);
            if denom == 0.0 {
                break;
            }
            let intersection = (fq - (f[top] + (top * top) as f64)) / denom;
            let top_start = starts[starts.len() - 1];
            if intersection <= top_start {
                vertices.pop();
                starts.pop();
            } else {
                start = intersection;
                break;
            }
        }
        vertices.push(q);
        starts.push(start);
    }

    if vertices.is_empty() {
        return vec![FAR; n];
    }

    let mut out = Vec::with_capacity(n);
    let mut k = 0;
    for q in 0..n {
        let y = q as f64;
        while k + 1 < vertices.len() && starts[k + 1] < y {
            k += 1;
        }
        let v = vertices[k];
        let dy = y - v as f64;
        out.push(dy * dy + f[v]);
    }
    out
}

/// Exact Euclidean distance from every cell to the nearest `true` seed.
///
/// Distances are in cells. Returns `f32::INFINITY` everywhere when `seeds`
/// contains no `true` cell.
///
/// # Panics
///
/// Panics if `seeds.len() != width * height`.
pub fn euclidean_distance_field(seeds: &[bool], width: usize, height: usize) -> Vec<f32> {
    assert_eq!(seeds.len(), width * height, "seed mask does not match dimensions");
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut rows = vec![0.0_f64; width * height];
    rows.par_chunks_mut(width)
        .zip(seeds.par_chunks(width))
        .for_each(|(out, line)| row_distances(line, out));

    let columns: Vec<Vec<f64>> = (0..width)
        .into_par_iter()
        .map(|x| {
            let column: Vec<f64> = (0..height).map(|y| rows[y * width + x]).collect();
            column_envelope(&column)
        })
        .collect();

    let mut out = vec![f32::INFINITY; width * height];
    for (x, column) in columns.iter().enumerate() {
        for (y, &d) in column.iter().enumerate() {
            if d < FAR {
                out[y * width + x] = d.sqrt() as f32;
            }
        }
    }
    out
}

/// Distance from every cell to the nearest land/sea boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct CoastlineField {
    width: usize,
    height: usize,
    distances: Vec<f32>,
}

impl CoastlineField {
    /// Compute the field for `sea_level`.
    ///
    /// Boundary cells are those whose land/sea classification differs from
    /// at least one 4-neighbor; they have distance `0`. A field with no
    /// coastline yields `f32::INFINITY` everywhere.
    pub fn compute(field: &Heightfield, sea_level: f32) -> Self {
        let width = field.width();
        let height = field.height();
        let below = |x: usize, y: usize| field.get(x, y) < sea_level;

        let seeds: Vec<bool> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width).map(move |x| {
                    let here = below(x, y);
                    (x > 0 && below(x - 1, y) != here)
                        || (x + 1 < width && below(x + 1, y) != here)
                        || (y > 0 && below(x, y - 1) != here)
                        || (y + 1 < height && below(x, y + 1) != here)
                })
            })
            .collect();

        Self {
            width,
            height,
            distances: euclidean_distance_field(&seeds, width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.distances[y * self.width + x]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.distances
    }
}
