use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::cluster::vectorize::euclidean;
use crate::data::pose::Pose;

/// Free energy, enthalpy and entropy of one ensemble of a binding mode.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModeThermo {
    pub dg: f64,
    pub dh: f64,
    pub ds: f64,
}

/// Thermodynamics of a mode for the complex, the free ligand reference
/// state and the solvated complex.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct ModeThermodynamics {
    pub complex: ModeThermo,
    pub free_ligand: ModeThermo,
    pub solvated: ModeThermo,
}

/// Constants needed for the thermodynamic aggregation of a mode.
#[derive(Copy, Clone, Debug)]
pub struct ThermoContext {
    pub temperature: f64,
    pub beta: f64,
    /// Number of accessible free-ligand conformations, the reference
    /// state of the free-ligand ensemble. At least 1.
    pub free_ligand_states: f64,
}

impl ThermoContext {
    /// Boltzmann-type constant recovered from `beta = 1/(k·T)`; zero when
    /// temperature weighting is disabled.
    #[inline]
    pub fn k(&self) -> f64 {
        if self.temperature > 0.0 && self.beta > 0.0 {
            1.0 / (self.beta * self.temperature)
        } else {
            0.0
        }
    }
}

/// How the representative pose of a mode is elected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Representative {
    /// Member closest to the partition-function-weighted centroid.
    Centroid,
    /// Member with the lowest raw energy.
    LowestEnergy,
}

/// A group of poses believed to represent the same binding geometry.
///
/// Modes never own poses; they reference the population's flat pose
/// container by index.
#[derive(Clone, Debug, Default)]
pub struct BindingMode {
    members: Vec<usize>,
    energy: f64,
    valid: bool,
}

impl BindingMode {
    pub fn new() -> Self {
        BindingMode { members: Vec::new(), energy: f64::NAN, valid: true }
    }

    pub fn add_pose(&mut self, pose_id: usize) {
        self.members.push(pose_id);
    }

    #[inline]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid && !self.members.is_empty()
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Cached complex free energy, refreshed by `refresh_energy`.
    #[inline]
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Absorb all poses of `other`, which is invalidated.
    pub fn absorb(&mut self, other: &mut BindingMode) {
        self.members.append(&mut other.members);
        other.invalidate();
    }

    /// A mode is homogenic when all of its members decode to the same
    /// feature vector, i.e. they originate from identical chromosomes.
    pub fn is_homogenic(&self, poses: &[Pose]) -> bool {
        let mut iter = self.members.iter();
        let first = match iter.next() {
            Some(&id) => &poses[id].features,
            None => return false,
        };
        iter.all(|&id| poses[id].features == *first)
    }

    /// Members whose Boltzmann weight survives as a finite number.
    fn finite_members<'a>(&'a self, poses: &'a [Pose]) -> impl Iterator<Item = &'a Pose> + 'a {
        self.members
            .iter()
            .map(move |&id| &poses[id])
            .filter(|p| p.boltzmann_weight.is_finite() && p.energy.is_finite())
    }

    fn finite_solvated_members<'a>(
        &'a self,
        poses: &'a [Pose],
    ) -> impl Iterator<Item = &'a Pose> + 'a {
        self.members
            .iter()
            .map(move |&id| &poses[id])
            .filter(|p| p.solvated_boltzmann_weight.is_finite() && p.solvated_energy.is_finite())
    }

    /// Partition function restricted to this mode.
    pub fn partition_function(&self, poses: &[Pose]) -> f64 {
        self.finite_members(poses).map(|p| p.boltzmann_weight).sum()
    }

    /// Partition-function-weighted centroid over the member feature
    /// vectors. `None` when no member carries a finite weight.
    pub fn centroid(&self, poses: &[Pose]) -> Option<Vec<f32>> {
        let zm = self.partition_function(poses);
        if !(zm > 0.0) || !zm.is_finite() {
            return None;
        }
        let dims = poses[*self.members.first()?].features.len();
        let mut centroid = vec![0.0f64; dims];
        for p in self.finite_members(poses) {
            let q = p.boltzmann_weight / zm;
            for (c, &x) in centroid.iter_mut().zip(p.features.iter()) {
                *c += q * x as f64;
            }
        }
        Some(centroid.into_iter().map(|x| x as f32).collect())
    }

    /// Elect the representative pose, `None` for a mode with no
    /// finite-weight member.
    pub fn representative(&self, poses: &[Pose], policy: Representative) -> Option<usize> {
        match policy {
            Representative::Centroid => {
                let centroid = self.centroid(poses)?;
                self.members
                    .iter()
                    .copied()
                    .filter(|&id| {
                        poses[id].boltzmann_weight.is_finite() && poses[id].energy.is_finite()
                    })
                    .min_by_key(|&id| {
                        (
                            OrderedFloat(euclidean(&poses[id].features, &centroid)),
                            poses[id].chrom_index,
                        )
                    })
            }
            Representative::LowestEnergy => self
                .members
                .iter()
                .copied()
                .filter(|&id| poses[id].energy.is_finite())
                .min_by_key(|&id| (OrderedFloat(poses[id].energy), poses[id].chrom_index)),
        }
    }

    /// Boltzmann-weighted thermodynamics of the mode.
    ///
    /// Returns `None` when either ensemble has no finite-weight member or
    /// any derived value fails to be finite; such a mode must be excluded
    /// from ranking by the caller.
    pub fn thermodynamics(&self, poses: &[Pose], env: &ThermoContext) -> Option<ModeThermodynamics> {
        let complex = ensemble_thermo(
            self.finite_members(poses).map(|p| (p.boltzmann_weight, p.energy)),
            env,
        )?;
        let solvated = ensemble_thermo(
            self.finite_solvated_members(poses)
                .map(|p| (p.solvated_boltzmann_weight, p.solvated_energy)),
            env,
        )?;

        let zm = self.partition_function(poses);
        let free_ligand = if env.temperature > 0.0 {
            let dg = env.k() * env.temperature * (env.free_ligand_states.max(1.0).ln() - zm.ln());
            let dh = complex.dh;
            ModeThermo { dg, dh, ds: (dh - dg) / env.temperature }
        } else {
            ModeThermo { dg: complex.dh, dh: complex.dh, ds: 0.0 }
        };

        let all = [complex, free_ligand, solvated];
        if all.iter().any(|t| !t.dg.is_finite() || !t.dh.is_finite() || !t.ds.is_finite()) {
            return None;
        }
        Some(ModeThermodynamics { complex, free_ligand, solvated })
    }

    /// Recompute the cached energy and the validity flag.
    pub fn refresh_energy(&mut self, poses: &[Pose], env: &ThermoContext) {
        match self.thermodynamics(poses, env) {
            Some(t) => {
                self.energy = t.complex.dg;
                self.valid = !self.members.is_empty();
            }
            None => {
                self.energy = f64::NAN;
                self.valid = false;
            }
        }
    }
}

/// `ΔH`, `ΔS` and `ΔG = ΔH - T·ΔS` of one weighted ensemble.
fn ensemble_thermo(
    members: impl Iterator<Item = (f64, f64)>,
    env: &ThermoContext,
) -> Option<ModeThermo> {
    let collected: Vec<(f64, f64)> = members.collect();
    let zm: f64 = collected.iter().map(|(w, _)| w).sum();
    if collected.is_empty() || !(zm > 0.0) || !zm.is_finite() {
        return None;
    }

    let mut dh = 0.0;
    let mut entropy_acc = 0.0;
    for (w, e) in &collected {
        let q = w / zm;
        dh += q * e;
        if q > 0.0 {
            entropy_acc += q * q.ln();
        }
    }
    let ds = -env.k() * entropy_acc;
    let dg = dh - env.temperature * ds;
    Some(ModeThermo { dg, dh, ds })
}
