use nalgebra::DMatrix;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::cluster::report::DensityDiagnostic;
use crate::data::mode::BindingMode;
use crate::data::population::BindingPopulation;

/// Factor of the gap statistic that separates cluster centers from the
/// rest of the `density * delta` ranking.
const CENTER_GAP_SIGMA: f32 = 1.5;

/// Density-peak clustering over a full pairwise distance matrix.
///
/// The matrix costs O(N^2) memory and time; that ceiling is inherent to
/// the strategy and is scoped to this call. `distance` is the external
/// pairwise kernel (an RMSD-like comparison); it must be symmetric.
///
/// Per-point energies are temperature-weighted against the population
/// partition function when a temperature is set; a zero or non-finite
/// partition function is then a fatal configuration error.
///
/// Cluster centers seed the modes; every other point is assigned by
/// walking the density ranking downwards: a point joins the cluster of
/// its nearest higher-density point, and a point without one joins the
/// cluster of the nearest already-assigned point, ties resolved towards
/// the lowest cluster id.
pub fn density_peak_modes<F>(
    pop: &mut BindingPopulation,
    distance: F,
) -> Result<Vec<DensityDiagnostic>, Box<dyn std::error::Error>>
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let n = pop.poses.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let cutoff = pop.params().cluster_distance;
    let temperature = pop.params().temperature;

    // (1) full pairwise distance matrix
    let kernel = &distance;
    let entries: Vec<f32> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (0..n).map(move |j| if i == j { 0.0 } else { kernel(i, j) }))
        .collect();
    let matrix = DMatrix::from_row_slice(n, n, &entries);

    // per-point energies, entropy-weighted when a temperature is set
    let energies: Vec<f64> = if temperature > 0.0 {
        let z = pop.partition_function;
        if !(z > 0.0) || !z.is_finite() {
            return Err("partition function is zero under temperature weighting".into());
        }
        pop.poses
            .iter()
            .map(|pose| {
                let p = pose.boltzmann_weight / z;
                p * pose.energy - temperature * p * p.ln()
            })
            .collect()
    } else {
        pop.poses.iter().map(|pose| pose.energy).collect()
    };

    // (2) local density: other points within the cutoff radius
    let density: Vec<usize> = (0..n)
        .map(|i| (0..n).filter(|&j| j != i && matrix[(i, j)] < cutoff).count())
        .collect();

    // (3) distance to the nearest higher-density point
    let mut delta = vec![f32::NAN; n];
    let mut nearest = vec![-1i64; n];
    for i in 0..n {
        let mut best = f32::MAX;
        for j in 0..n {
            if density[j] > density[i] && matrix[(i, j)] < best {
                best = matrix[(i, j)];
                nearest[i] = j as i64;
                delta[i] = best;
            }
        }
    }

    // global density maxima (all of them, on ties) take the largest delta
    let max_delta = delta.iter().copied().filter(|d| d.is_finite()).fold(0.0f32, f32::max);
    for i in 0..n {
        if nearest[i] < 0 {
            delta[i] = max_delta;
        }
    }

    // (4) rank by the combined score, descending
    let gamma: Vec<f32> = (0..n).map(|i| density[i] as f32 * delta[i]).collect();
    let mut ranked: Vec<usize> = (0..n).collect();
    ranked.sort_by_key(|&i| (std::cmp::Reverse(OrderedFloat(gamma[i])), i));

    // (5) count centers through the gap statistic
    let gamma_f64: Vec<f64> = gamma.iter().map(|&g| g as f64).collect();
    let sigma = (&gamma_f64).population_std_dev() as f32;
    let mut n_centers = 0usize;
    while n_centers + 1 < n
        && gamma[ranked[n_centers]] - gamma[ranked[n_centers + 1]] > CENTER_GAP_SIGMA * sigma
    {
        n_centers += 1;
    }
    if n_centers == 0 {
        // no clear gap: fall back to the single strongest peak so the
        // assignment step always closes
        n_centers = 1;
    }
    debug!("density peak clustering found {} centers over {} poses", n_centers, n);

    // (6) assignment, walking the density ranking downwards
    let mut cluster: Vec<Option<usize>> = vec![None; n];
    for (id, &center) in ranked.iter().take(n_centers).enumerate() {
        cluster[center] = Some(id);
    }
    let mut by_density: Vec<usize> = (0..n).collect();
    by_density.sort_by_key(|&i| (std::cmp::Reverse(density[i]), i));
    for &i in &by_density {
        if cluster[i].is_some() {
            continue;
        }
        let inherited = match nearest[i] {
            j if j >= 0 => cluster[j as usize],
            _ => None,
        };
        let assigned = inherited.or_else(|| {
            (0..n)
                .filter(|&j| cluster[j].is_some())
                .min_by_key(|&j| (OrderedFloat(matrix[(i, j)]), cluster[j].unwrap()))
                .and_then(|j| cluster[j])
        });
        cluster[i] = assigned;
    }

    // (7) materialize the modes, one per center
    for id in 0..n_centers {
        let center = ranked[id];
        let mut mode = BindingMode::new();
        for i in 0..n {
            if cluster[i] == Some(id) {
                pop.poses[i].order = id as i32;
                pop.poses[i].reachability = matrix[(i, center)];
                mode.add_pose(i);
            }
        }
        if mode.size() > 0 {
            pop.add_binding_mode(mode);
        }
    }

    let rows = (0..n)
        .map(|i| DensityDiagnostic {
            index: pop.poses[i].chrom_index,
            density: density[i],
            delta: delta[i],
            energy: energies[i],
            nearest_center: match nearest[i] {
                j if j >= 0 => pop.poses[j as usize].chrom_index as i64,
                _ => -1,
            },
            gamma: gamma[i],
        })
        .collect();
    Ok(rows)
}
