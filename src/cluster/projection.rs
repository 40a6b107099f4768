use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::cluster::vectorize::euclidean;
use crate::data::chromosome::RunContext;
use crate::data::pose::{Pose, UNDEFINED_DIST};

/// Scaling constant of the projection / split-round count.
const LOG_O_PROJECTION_CONSTANT: f64 = 20.0;
/// Tolerance band around `min_split_size` inside which a partition is
/// recorded as a split set.
const SIZE_TOLERANCE: f32 = 2.0 / 3.0;

/// Approximate neighborhoods and inverse density estimates obtained from
/// recursive random-projection partitioning.
#[derive(Clone, Debug, Default)]
pub struct ProjectedPartitions {
    /// Average distance of each point to the middle members of its split
    /// sets; `UNDEFINED_DIST` for points that appeared in no set.
    pub inverse_densities: Vec<f32>,
    /// Approximate neighbor lists, each sorted ascending and free of
    /// duplicates. Not an exact k-NN structure.
    pub neighbors: Vec<Vec<usize>>,
}

impl ProjectedPartitions {
    /// Partition the pose set and derive densities and neighborhoods.
    ///
    /// An empty pose set short-circuits to empty outputs.
    pub fn compute(ctx: &RunContext, poses: &[Pose], rng: &mut StdRng) -> Self {
        let n = poses.len();
        if n == 0 {
            return ProjectedPartitions::default();
        }

        let dims = ctx.dimensions();
        let min_split = ctx.params.min_points.max(1);
        let n_projections =
            (LOG_O_PROJECTION_CONSTANT * ((n * dims + 1) as f64).log2()).floor().max(1.0) as usize;
        debug!(
            "partitioning {} poses in {} dimensions with {} projections",
            n, dims, n_projections
        );

        // random unit directions, sampled from the gene domains
        let directions: Vec<Vec<f32>> = (0..n_projections)
            .map(|_| random_unit_direction(ctx, rng))
            .collect();

        // project every pose onto every direction
        let projected: Vec<Vec<f32>> = directions
            .par_iter()
            .map(|dir| poses.iter().map(|p| dot(dir, &p.features)).collect())
            .collect();

        // one shuffled pass of recursive splitting per projection
        let mut split_sets: Vec<Vec<usize>> = Vec::new();
        let mut order: Vec<usize> = (0..n_projections).collect();
        for _ in 0..n_projections {
            order.shuffle(rng);
            split_points(&projected, &order, min_split, n, rng, &mut split_sets);
        }
        debug!("recorded {} split sets", split_sets.len());

        let inverse_densities = inverse_densities(poses, &split_sets, n);
        let neighbors = neighborhoods(&split_sets, n);
        ProjectedPartitions { inverse_densities, neighbors }
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Draw a random direction by sampling each gene's domain the same way a
/// chromosome is vectorized, then normalize to unit length.
fn random_unit_direction(ctx: &RunContext, rng: &mut StdRng) -> Vec<f32> {
    let dims = ctx.dimensions();
    let mut v = vec![0.0f32; dims];
    loop {
        let slot = rng.gen_range(0..ctx.grid.len().max(1));
        if let Some(gp) = ctx.grid.get(slot) {
            for i in 0..3 {
                v[i] = gp.coor[i] - ctx.origin[i];
            }
        }
        for (j, lim) in ctx.gene_limits.iter().enumerate().skip(1) {
            let dist = Uniform::new_inclusive(lim.min.min(lim.max), lim.max.max(lim.min));
            v[j + 2] = dist.sample(rng) as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
            return v;
        }
        // degenerate draw, e.g. the grid slot coincides with the origin
        for x in v.iter_mut() {
            *x = rng.gen_range(-1.0..=1.0);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
            return v;
        }
    }
}

/// One full splitting pass over all point indices.
///
/// The recursion of the reference design is replaced by an explicit
/// worklist so adversarial inputs cannot exhaust the stack.
fn split_points(
    projected: &[Vec<f32>],
    dim_order: &[usize],
    min_split: usize,
    n: usize,
    rng: &mut StdRng,
    split_sets: &mut Vec<Vec<usize>>,
) {
    let n_projections = projected.len();
    let band_lo = min_split as f32 * (1.0 - SIZE_TOLERANCE);
    let band_hi = min_split as f32 * (1.0 + SIZE_TOLERANCE);

    let mut work: Vec<(Vec<usize>, usize)> = vec![((0..n).collect(), 0)];
    while let Some((mut ind, depth)) = work.pop() {
        let dim = dim_order[depth % n_projections];
        let proj = &projected[dim];
        let len = ind.len();

        // record partitions inside the tolerance band, sorted along the
        // current projection
        if (len as f32) > band_lo && (len as f32) < band_hi {
            let mut sorted = ind.clone();
            sorted.sort_by(|&a, &b| proj[a].total_cmp(&proj[b]));
            split_sets.push(sorted);
        }

        if len <= min_split {
            continue;
        }

        // single-pass swap partition around a uniformly random pivot
        let pivot = proj[ind[rng.gen_range(0..len)]];
        let mut lo = 0usize;
        let mut hi = len - 1;
        while lo < hi {
            if proj[ind[lo]] > pivot {
                while lo < hi && proj[ind[hi]] > pivot {
                    hi -= 1;
                }
                if lo == hi {
                    break;
                }
                ind.swap(lo, hi);
                hi -= 1;
            }
            lo += 1;
        }
        if lo >= len - 1 {
            lo = len / 2;
        }

        // both halves must stay non-empty for the worklist to shrink
        let split_pos = (lo + 1).min(len - 1);
        let right: Vec<usize> = ind.split_off(split_pos);
        work.push((ind, depth + 1));
        work.push((right, depth + 1));
    }
}

/// Average the distance of every point to the middle member of each split
/// set it belongs to. Points that never appeared keep the sentinel.
fn inverse_densities(poses: &[Pose], split_sets: &[Vec<usize>], n: usize) -> Vec<f32> {
    let mut dist_sum = vec![0.0f32; n];
    let mut dist_count = vec![0usize; n];

    for set in split_sets {
        let mid_pos = set.len() / 2;
        let mid = set[mid_pos];
        for (pos, &ind) in set.iter().enumerate() {
            if pos == mid_pos {
                continue;
            }
            let d = euclidean(&poses[ind].features, &poses[mid].features);
            dist_sum[mid] += d;
            dist_count[mid] += 1;
            dist_sum[ind] += d;
            dist_count[ind] += 1;
        }
    }

    dist_sum
        .into_iter()
        .zip(dist_count)
        .map(|(sum, count)| if count == 0 { UNDEFINED_DIST } else { sum / count as f32 })
        .collect()
}

/// Union each split set's middle member symmetrically with every other
/// member, deduplicated via sorted insertion.
fn neighborhoods(split_sets: &[Vec<usize>], n: usize) -> Vec<Vec<usize>> {
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];

    for set in split_sets {
        let mid_pos = set.len() / 2;
        let mid = set[mid_pos];
        for (pos, &ind) in set.iter().enumerate() {
            if pos == mid_pos {
                continue;
            }
            insert_sorted(&mut neighbors[ind], mid);
            insert_sorted(&mut neighbors[mid], ind);
        }
    }
    neighbors
}

#[inline]
fn insert_sorted(list: &mut Vec<usize>, value: usize) {
    if let Err(pos) = list.binary_search(&value) {
        list.insert(pos, value);
    }
}
