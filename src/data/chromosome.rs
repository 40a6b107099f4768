use serde::{Deserialize, Serialize};

/// One discretized decision variable of a candidate pose.
///
/// `code` is the raw integer coding produced by the outer search in
/// `[0, i32::MAX]`; `grid_index` is the pre-decoded slot into the grid
/// coordinate table and is only meaningful for the translational gene
/// (gene 0).
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct Gene {
    pub code: i32,
    pub grid_index: u32,
}

/// Decode range for one gene.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct GeneLimit {
    pub min: f64,
    pub max: f64,
}

impl GeneLimit {
    /// Map the integer coding linearly into `[min, max]`.
    #[inline]
    pub fn decode(&self, code: i32) -> f64 {
        let t = code.max(0) as f64 / i32::MAX as f64;
        self.min + (self.max - self.min) * t
    }
}

/// One entry of the grid coordinate table that spans the search space.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct GridPoint {
    pub coor: [f32; 3],
}

/// A scored candidate pose as produced by the outer search.
///
/// Both energy values come from the external scoring engine; this crate
/// never evaluates them, it only weights and aggregates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chromosome {
    pub genes: Vec<Gene>,
    pub app_evalue: f64,
    pub app_evalue_solvated: f64,
}

/// Simulation-wide constants for one clustering run.
#[derive(Clone, Debug)]
pub struct SimParams {
    /// Simulation temperature in K. Zero disables Boltzmann weighting
    /// and all poses contribute with unit weight.
    pub temperature: f64,
    /// Inverse thermal energy used for Boltzmann weights.
    pub beta: f64,
    /// Structural distance below which two poses belong to the same mode.
    pub cluster_distance: f32,
    /// Reachability value above which the ordering walk opens a new mode.
    pub mode_break_reachability: f32,
    /// Minimal split size of the random projection partitioner.
    pub min_points: usize,
    /// Number of flexible bonds of the ligand.
    pub n_flex_bonds: u32,
    /// Angular discretization step in degrees.
    pub delta_angle_deg: f64,
    /// Dihedral discretization step in degrees.
    pub delta_dihedral_deg: f64,
    /// Maximum number of binding modes to emit.
    pub max_results: usize,
    /// Seed of the per-run pseudo-random source.
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            temperature: 298.0,
            beta: 1.0,
            cluster_distance: 2.0,
            mode_break_reachability: 0.3,
            min_points: 15,
            n_flex_bonds: 0,
            delta_angle_deg: 10.0,
            delta_dihedral_deg: 10.0,
            max_results: 10,
            seed: 0,
        }
    }
}

/// Immutable per-run view over everything the simulation owns.
///
/// All components take this explicitly instead of reaching into shared
/// global state, so two runs over different inputs cannot interfere.
#[derive(Clone, Debug)]
pub struct RunContext<'a> {
    pub params: SimParams,
    pub gene_limits: &'a [GeneLimit],
    pub grid: &'a [GridPoint],
    pub origin: [f32; 3],
    pub chromosomes: &'a [Chromosome],
}

impl<'a> RunContext<'a> {
    /// Feature space dimensionality: 3 Cartesian components for the
    /// translational gene plus one component per remaining gene.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.gene_limits.len() + 2
    }

    /// Number of accessible conformations of the free ligand, derived
    /// from the flexible bond count and the angular discretization.
    pub fn count_free_ligand_conformations(&self) -> u64 {
        let ang = if self.params.delta_angle_deg > 0.0 {
            (360.0 / self.params.delta_angle_deg).round().max(1.0) as u64
        } else {
            1
        };
        let dih = if self.params.delta_dihedral_deg > 0.0 {
            (360.0 / self.params.delta_dihedral_deg).round().max(1.0) as u64
        } else {
            1
        };
        ang.saturating_mul(dih.saturating_pow(self.params.n_flex_bonds)).max(1)
    }
}
