use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::cluster::density::density_peak_modes;
use crate::cluster::ordering::cluster_ordering;
use crate::cluster::projection::ProjectedPartitions;
use crate::cluster::vectorize::euclidean;
use crate::data::chromosome::RunContext;
use crate::data::mode::BindingMode;
use crate::data::pose::is_undefined_dist;
use crate::data::population::BindingPopulation;

/// Selectable grouping strategy. All variants populate the same
/// `BindingMode` collection on the returned population.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClusteringStrategy {
    /// Random projection partitioning followed by an OPTICS-style
    /// ordering walk.
    RandomProjectionOrdering,
    /// Direct cutoff absorption seeded per unclustered pose, extended
    /// through the projection neighbor graph.
    ThresholdNeighbor,
    /// Exact pairwise density-peak detection; O(N^2) in memory.
    DensityPeak,
}

/// Run one full clustering pass over the context's chromosomes.
///
/// The pseudo-random source is seeded once per run from
/// `params.seed`, which makes the projection-based strategies
/// reproducible for identical inputs.
pub fn cluster_population(
    ctx: &RunContext,
    strategy: ClusteringStrategy,
) -> Result<BindingPopulation, Box<dyn std::error::Error>> {
    let mut pop = BindingPopulation::from_context(ctx);
    let mut rng = StdRng::seed_from_u64(ctx.params.seed);
    debug!("clustering {} poses with {:?}", pop.poses.len(), strategy);

    match strategy {
        ClusteringStrategy::RandomProjectionOrdering => {
            let partitions = ProjectedPartitions::compute(ctx, &pop.poses, &mut rng);
            let (order, reach) = cluster_ordering(&mut pop.poses, &partitions);
            build_modes_from_ordering(&mut pop, &order, &reach);
        }
        ClusteringStrategy::ThresholdNeighbor => {
            let partitions = ProjectedPartitions::compute(ctx, &pop.poses, &mut rng);
            build_modes_threshold_neighbor(&mut pop, &partitions.neighbors);
        }
        ClusteringStrategy::DensityPeak => {
            // default kernel: Euclidean distance over the feature vectors;
            // callers with an external RMSD kernel use density_peak_modes
            // directly
            let features: Vec<Vec<f32>> = pop.poses.iter().map(|p| p.features.clone()).collect();
            let rows = density_peak_modes(&mut pop, |i, j| euclidean(&features[i], &features[j]))?;
            pop.diagnostics = Some(rows);
        }
    }
    Ok(pop)
}

/// Slice the cluster ordering into contiguous modes.
///
/// A new mode opens on the first point, on any point whose reachability
/// meets the break threshold, and on expansion seeds that kept the
/// undefined sentinel. Every point of the ordering lands in exactly one
/// mode, so concatenating the emitted modes reproduces the ordering.
pub fn build_modes_from_ordering(
    pop: &mut BindingPopulation,
    order: &[usize],
    reach: &[f32],
) {
    let break_at = pop.params().mode_break_reachability;
    let mut current: Option<BindingMode> = None;
    let mut mode_id = 0i32;

    for &pt in order {
        let r = reach[pt];
        if current.is_none() || is_undefined_dist(r) || r >= break_at {
            if let Some(mode) = current.take() {
                pop.add_binding_mode(mode);
            }
            mode_id = pop.size() as i32;
            current = Some(BindingMode::new());
        }
        pop.poses[pt].order = mode_id;
        if let Some(mode) = current.as_mut() {
            mode.add_pose(pt);
        }
    }
    if let Some(mode) = current.take() {
        pop.add_binding_mode(mode);
    }
    debug!("ordering walk produced {} binding modes", pop.size());
}

/// Threshold-neighbor grouping: every still-unclustered pose seeds a
/// mode that absorbs all unclustered poses within the structural cutoff
/// of the seed, then grows transitively along the partitioner's
/// neighbor graph. Absorption through the graph still honors the cutoff
/// against the absorbing member, so a mode never outgrows the distance
/// contract.
pub fn build_modes_threshold_neighbor(
    pop: &mut BindingPopulation,
    neighbors: &[Vec<usize>],
) {
    let cutoff = pop.params().cluster_distance;
    let n = pop.poses.len();

    for seed in 0..n {
        if pop.poses[seed].is_clustered() {
            continue;
        }
        let mode_id = pop.size() as i32;
        let mut mode = BindingMode::new();
        pop.poses[seed].order = mode_id;
        mode.add_pose(seed);

        // direct pass over the remaining unclustered poses
        for j in 0..n {
            if pop.poses[j].is_clustered() {
                continue;
            }
            let d = euclidean(&pop.poses[seed].features, &pop.poses[j].features);
            if d < cutoff {
                pop.poses[j].order = mode_id;
                pop.poses[j].reachability = d;
                mode.add_pose(j);
            }
        }

        // transitive extension through the neighbor graph
        let mut frontier: Vec<usize> = mode.members().to_vec();
        while let Some(member) = frontier.pop() {
            for &nb in &neighbors[member] {
                if pop.poses[nb].is_clustered() {
                    continue;
                }
                let d = euclidean(&pop.poses[member].features, &pop.poses[nb].features);
                if d < cutoff {
                    pop.poses[nb].order = mode_id;
                    pop.poses[nb].reachability = d;
                    mode.add_pose(nb);
                    frontier.push(nb);
                }
            }
        }
        pop.add_binding_mode(mode);
    }
    debug!("threshold neighbor grouping produced {} binding modes", pop.size());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::report::CollectingWriter;
    use crate::data::chromosome::{Chromosome, Gene, GeneLimit, GridPoint, SimParams};
    use crate::data::mode::Representative;
    use crate::data::pose::UNDEFINED_DIST;

    fn gene_limits() -> Vec<GeneLimit> {
        vec![GeneLimit { min: 0.0, max: 1.0 }; 2]
    }

    fn chrom(slot: u32, code: i32, energy: f64) -> Chromosome {
        Chromosome {
            genes: vec![Gene { code: 0, grid_index: slot }, Gene { code, grid_index: 0 }],
            app_evalue: energy,
            app_evalue_solvated: energy,
        }
    }

    /// 10 chromosomes, two of them identical, eight spread far apart.
    fn split_scenario() -> (Vec<GeneLimit>, Vec<GridPoint>, Vec<Chromosome>) {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..9).map(|i| GridPoint { coor: [i as f32 * 100.0, 0.0, 0.0] }).collect();
        let mut chroms = vec![chrom(0, 0, -5.0), chrom(0, 0, -5.0)];
        for i in 1..9 {
            chroms.push(chrom(i as u32, 0, -(i as f64)));
        }
        (limits, grid, chroms)
    }

    fn params() -> SimParams {
        SimParams {
            temperature: 1.0,
            beta: 1.0,
            cluster_distance: 2.0,
            min_points: 4,
            seed: 42,
            ..SimParams::default()
        }
    }

    #[test]
    fn test_identical_pair_and_outliers_threshold_neighbor() {
        let (limits, grid, chroms) = split_scenario();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let mut pop =
            cluster_population(&ctx, ClusteringStrategy::ThresholdNeighbor).unwrap();

        // one two-member mode, eight singletons
        assert_eq!(pop.size(), 9);
        let sizes: Vec<usize> = pop.modes().iter().map(|m| m.size()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 10);
        assert_eq!(sizes.iter().filter(|&&s| s == 2).count(), 1);
        assert_eq!(sizes.iter().filter(|&&s| s == 1).count(), 8);

        // the pair mode carries the common energy and elects either twin
        let pair_idx = pop.modes().iter().position(|m| m.size() == 2).unwrap();
        let report = pop.mode_report(pair_idx, 1, Representative::Centroid).unwrap();
        assert!((report.complex_dh - (-5.0)).abs() < 1e-9);
        assert!(report.representative_index == 0 || report.representative_index == 1);

        // emission asks for more modes than exist and gets all nine
        let mut writer = CollectingWriter::default();
        let emitted = pop.output_population(50, Representative::Centroid, &mut writer).unwrap();
        assert_eq!(emitted, 9);
        assert_eq!(writer.modes[0].rank, 1);
    }

    #[test]
    fn test_all_nan_energies_emit_nothing() {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..4).map(|i| GridPoint { coor: [i as f32 * 100.0, 0.0, 0.0] }).collect();
        let chroms: Vec<Chromosome> =
            (0..4).map(|i| chrom(i as u32, 0, f64::NAN)).collect();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let mut pop =
            cluster_population(&ctx, ClusteringStrategy::ThresholdNeighbor).unwrap();
        assert!(pop.size() > 0);
        assert_eq!(pop.n_valid_modes(), 0);

        let mut writer = CollectingWriter::default();
        let emitted = pop.output_population(5, Representative::Centroid, &mut writer).unwrap();
        assert_eq!(emitted, 0);
        assert!(writer.modes.is_empty());
    }

    #[test]
    fn test_ordering_walk_covers_every_pose() {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..40).map(|i| GridPoint { coor: [(i / 4) as f32 * 10.0, (i % 4) as f32, 0.0] }).collect();
        let chroms: Vec<Chromosome> =
            (0..40).map(|i| chrom(i as u32, (i as i32) * 1000, -1.0)).collect();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let pop =
            cluster_population(&ctx, ClusteringStrategy::RandomProjectionOrdering).unwrap();

        let total: usize = pop.modes().iter().map(|m| m.size()).sum();
        assert_eq!(total, 40);
        assert!(pop.poses.iter().all(|p| p.is_clustered() && p.processed));
    }

    #[test]
    fn test_ordering_strategy_is_reproducible_for_a_seed() {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..20).map(|i| GridPoint { coor: [i as f32 * 3.0, 0.0, 0.0] }).collect();
        let chroms: Vec<Chromosome> =
            (0..20).map(|i| chrom(i as u32, 0, -1.0)).collect();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };

        let a = cluster_population(&ctx, ClusteringStrategy::RandomProjectionOrdering).unwrap();
        let b = cluster_population(&ctx, ClusteringStrategy::RandomProjectionOrdering).unwrap();
        let sizes = |p: &BindingPopulation| -> Vec<Vec<usize>> {
            p.modes().iter().map(|m| m.members().to_vec()).collect()
        };
        assert_eq!(sizes(&a), sizes(&b));
    }

    #[test]
    fn test_mode_concatenation_reproduces_the_ordering() {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..4).map(|i| GridPoint { coor: [i as f32, 0.0, 0.0] }).collect();
        let chroms: Vec<Chromosome> = (0..4).map(|i| chrom(i as u32, 0, -1.0)).collect();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let mut pop = BindingPopulation::from_context(&ctx);

        let order = vec![2, 0, 3, 1];
        let reach = vec![0.1, UNDEFINED_DIST, 0.5, 0.2];
        build_modes_from_ordering(&mut pop, &order, &reach);

        let concat: Vec<usize> = pop
            .modes()
            .iter()
            .flat_map(|m| m.members().iter().copied())
            .collect();
        assert_eq!(concat, order);
        let total: usize = pop.modes().iter().map(|m| m.size()).sum();
        assert_eq!(total, 4);
        // pose 1 kept the undefined sentinel and opens the second mode
        let sizes: Vec<usize> = pop.modes().iter().map(|m| m.size()).collect();
        assert_eq!(sizes, vec![3, 1]);
    }

    #[test]
    fn test_singleton_mode_is_legal() {
        let limits = gene_limits();
        let grid = vec![GridPoint { coor: [0.0; 3] }];
        let chroms = vec![chrom(0, 0, -1.0)];
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let pop = cluster_population(&ctx, ClusteringStrategy::ThresholdNeighbor).unwrap();
        assert_eq!(pop.size(), 1);
        assert_eq!(pop.modes()[0].size(), 1);
        assert!(pop.modes()[0].is_valid());
    }

    #[test]
    fn test_density_peak_strategy_attaches_diagnostics() {
        let limits = gene_limits();
        let grid: Vec<GridPoint> =
            (0..6).map(|i| GridPoint { coor: [i as f32 * 0.5, 0.0, 0.0] }).collect();
        let chroms: Vec<Chromosome> = (0..6).map(|i| chrom(i as u32, 0, -1.0)).collect();
        let ctx = RunContext {
            params: params(),
            gene_limits: &limits,
            grid: &grid,
            origin: [0.0; 3],
            chromosomes: &chroms,
        };
        let pop = cluster_population(&ctx, ClusteringStrategy::DensityPeak).unwrap();
        let rows = pop.diagnostics.as_ref().unwrap();
        assert_eq!(rows.len(), 6);
        assert!(pop.poses.iter().all(|p| p.is_clustered()));
    }
}
