use itertools::Itertools;
use ordered_float::OrderedFloat;
use tracing::{debug, warn};

use crate::cluster::report::{DensityDiagnostic, ModeReport, ResultWriter};
use crate::cluster::vectorize::{euclidean, vectorize_chromosome};
use crate::data::chromosome::{RunContext, SimParams};
use crate::data::mode::{BindingMode, Representative, ThermoContext};
use crate::data::pose::{classifier_cmp, ranker_cmp, Pose};

/// Criterion of the three total orders over valid binding modes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RankCriterion {
    ComplexEnergy,
    FreeLigandEnergy,
    SolvatedEnergy,
}

/// Owner of all poses and binding modes of one clustering run.
#[derive(Debug)]
pub struct BindingPopulation {
    params: SimParams,
    /// Flat pose container; binding modes reference it by index.
    pub poses: Vec<Pose>,
    modes: Vec<BindingMode>,
    /// Sum of finite Boltzmann weights over all poses.
    pub partition_function: f64,
    /// Sum of finite solvated Boltzmann weights over all poses.
    pub solvated_partition_function: f64,
    free_ligand_states: f64,
    /// Density-peak diagnostic table, present when that strategy ran.
    pub diagnostics: Option<Vec<DensityDiagnostic>>,
}

impl BindingPopulation {
    /// Vectorize and register every chromosome of the run. Chromosomes
    /// whose feature vector fails the dimensionality contract are
    /// skipped, not fatal.
    pub fn from_context(ctx: &RunContext) -> Self {
        let dims = ctx.dimensions();
        let mut poses = Vec::with_capacity(ctx.chromosomes.len());
        let mut partition_function = 0.0;
        let mut solvated_partition_function = 0.0;

        for (i, chrom) in ctx.chromosomes.iter().enumerate() {
            let features = vectorize_chromosome(ctx, chrom);
            if features.len() != dims {
                warn!("skipping chromosome {} with malformed gene table", i);
                continue;
            }
            let pose = Pose::new(
                i,
                chrom.app_evalue,
                chrom.app_evalue_solvated,
                features,
                &ctx.params,
            );
            if pose.boltzmann_weight.is_finite() {
                partition_function += pose.boltzmann_weight;
            }
            if pose.solvated_boltzmann_weight.is_finite() {
                solvated_partition_function += pose.solvated_boltzmann_weight;
            }
            poses.push(pose);
        }
        debug!(
            "registered {} of {} chromosomes, partition function {}",
            poses.len(),
            ctx.chromosomes.len(),
            partition_function
        );

        BindingPopulation {
            params: ctx.params.clone(),
            poses,
            modes: Vec::new(),
            partition_function,
            solvated_partition_function,
            free_ligand_states: ctx.count_free_ligand_conformations() as f64,
            diagnostics: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &SimParams {
        &self.params
    }

    #[inline]
    pub fn modes(&self) -> &[BindingMode] {
        &self.modes
    }

    /// Number of binding modes currently held, valid or not.
    #[inline]
    pub fn size(&self) -> usize {
        self.modes.len()
    }

    pub fn n_valid_modes(&self) -> usize {
        self.modes.iter().filter(|m| m.is_valid()).count()
    }

    fn thermo_context(&self) -> ThermoContext {
        ThermoContext {
            temperature: self.params.temperature,
            beta: self.params.beta,
            free_ligand_states: self.free_ligand_states,
        }
    }

    /// Add a freshly built mode; its cached energy and validity are
    /// computed on entry.
    pub fn add_binding_mode(&mut self, mut mode: BindingMode) {
        let env = self.thermo_context();
        mode.refresh_energy(&self.poses, &env);
        self.modes.push(mode);
    }

    /// Merge modes that describe the same geometry until a fixed point.
    ///
    /// Two modes merge when every cross-pair of their members lies
    /// within the clustering cutoff, or when both are homogenic and
    /// their centroids do. The mode count strictly decreases on every
    /// merge, so the loop terminates. Afterwards invalid modes are
    /// purged and pose cluster ids are refreshed.
    pub fn classify_binding_modes(&mut self) {
        let cutoff = self.params.cluster_distance;
        loop {
            let candidate = self.find_merge_pair(cutoff);
            let Some((keep, drop)) = candidate else { break };

            let (head, tail) = self.modes.split_at_mut(drop);
            let mut dropped = std::mem::take(&mut tail[0]);
            head[keep].absorb(&mut dropped);
            tail[0] = dropped;

            let env = self.thermo_context();
            let Self { modes, poses, .. } = self;
            modes[keep].refresh_energy(poses, &env);
            debug!("merged binding mode {} into {}", drop, keep);
        }

        self.modes.retain(|m| m.is_valid());
        for (id, mode) in self.modes.iter().enumerate() {
            for &pose_id in mode.members() {
                self.poses[pose_id].order = id as i32;
            }
        }
    }

    fn find_merge_pair(&self, cutoff: f32) -> Option<(usize, usize)> {
        for i in 0..self.modes.len() {
            if !self.modes[i].is_valid() {
                continue;
            }
            for j in (i + 1)..self.modes.len() {
                if !self.modes[j].is_valid() {
                    continue;
                }
                if self.mergeable(&self.modes[i], &self.modes[j], cutoff) {
                    return Some((i, j));
                }
            }
        }
        None
    }

    fn mergeable(&self, a: &BindingMode, b: &BindingMode, cutoff: f32) -> bool {
        let all_cross_pairs_close = a
            .members()
            .iter()
            .cartesian_product(b.members().iter())
            .all(|(&x, &y)| euclidean(&self.poses[x].features, &self.poses[y].features) < cutoff);
        if all_cross_pairs_close {
            return true;
        }
        if a.is_homogenic(&self.poses) && b.is_homogenic(&self.poses) {
            if let (Some(ca), Some(cb)) = (a.centroid(&self.poses), b.centroid(&self.poses)) {
                return euclidean(&ca, &cb) < cutoff;
            }
        }
        false
    }

    /// Refresh every mode's cached energy and validity, and return the
    /// complex-energy ranking over the valid modes.
    pub fn entropize(&mut self) -> Vec<usize> {
        let env = self.thermo_context();
        let Self { modes, poses, .. } = self;
        for mode in modes.iter_mut() {
            mode.refresh_energy(poses, &env);
        }
        self.ranked_indices(RankCriterion::ComplexEnergy)
    }

    /// Indices of the valid modes, sorted by the requested energy
    /// criterion ascending, ties broken by lower mode index.
    pub fn ranked_indices(&self, criterion: RankCriterion) -> Vec<usize> {
        let env = self.thermo_context();
        let mut keyed: Vec<(f64, usize)> = self
            .modes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_valid())
            .filter_map(|(i, m)| {
                let t = m.thermodynamics(&self.poses, &env)?;
                let key = match criterion {
                    RankCriterion::ComplexEnergy => t.complex.dg,
                    RankCriterion::FreeLigandEnergy => t.free_ligand.dg,
                    RankCriterion::SolvatedEnergy => t.solvated.dg,
                };
                Some((key, i))
            })
            .collect();
        keyed.sort_by_key(|&(key, i)| (OrderedFloat(key), i));
        keyed.into_iter().map(|(_, i)| i).collect()
    }

    /// 1-based rank of a mode under the given criterion, `None` for an
    /// invalid or unknown mode.
    pub fn rank(&self, mode_idx: usize, criterion: RankCriterion) -> Option<usize> {
        self.ranked_indices(criterion)
            .iter()
            .position(|&i| i == mode_idx)
            .map(|pos| pos + 1)
    }

    /// Build the emission record of one mode.
    pub fn mode_report(
        &self,
        mode_idx: usize,
        rank: usize,
        policy: Representative,
    ) -> Option<ModeReport> {
        let mode = self.modes.get(mode_idx)?;
        let env = self.thermo_context();
        let t = mode.thermodynamics(&self.poses, &env)?;
        let rep = mode.representative(&self.poses, policy)?;

        let mut member_ids: Vec<usize> = mode.members().to_vec();
        member_ids.sort_by(|&a, &b| classifier_cmp(&self.poses[a], &self.poses[b]));
        let best = member_ids
            .iter()
            .copied()
            .min_by(|&a, &b| ranker_cmp(&self.poses[a], &self.poses[b]))?;

        Some(ModeReport {
            rank,
            n_poses: mode.size(),
            representative_index: self.poses[rep].chrom_index,
            representative_energy: self.poses[rep].energy,
            representative_features: self.poses[rep].features.clone(),
            member_indices: member_ids.iter().map(|&id| self.poses[id].chrom_index).collect(),
            best_member_index: self.poses[best].chrom_index,
            complex_dg: t.complex.dg,
            complex_dh: t.complex.dh,
            complex_ds: t.complex.ds,
            free_ligand_dg: t.free_ligand.dg,
            free_ligand_dh: t.free_ligand.dh,
            free_ligand_ds: t.free_ligand.ds,
            solvated_dg: t.solvated.dg,
            solvated_dh: t.solvated.dh,
            solvated_ds: t.solvated.ds,
        })
    }

    /// Emit at most `n_results` valid modes in complex-energy rank
    /// order. Returns the number of modes actually emitted; fewer valid
    /// modes than requested is not an error.
    pub fn output_population(
        &mut self,
        n_results: usize,
        policy: Representative,
        writer: &mut dyn ResultWriter,
    ) -> Result<usize, Box<dyn std::error::Error>> {
        if let Some(rows) = &self.diagnostics {
            writer.write_diagnostics(rows)?;
        }

        let ranked = self.entropize();
        let mut emitted = 0;
        for (pos, &mode_idx) in ranked.iter().take(n_results).enumerate() {
            match self.mode_report(mode_idx, pos + 1, policy) {
                Some(report) => {
                    writer.write_mode(&report)?;
                    emitted += 1;
                }
                None => warn!("mode {} lost validity during emission", mode_idx),
            }
        }
        debug!("emitted {} of {} binding modes", emitted, self.modes.len());
        Ok(emitted)
    }
}
