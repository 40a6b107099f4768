use std::cmp::Ordering;

use crate::data::chromosome::SimParams;

/// Sentinel for a reachability distance that was never set. Kept below
/// the valid range so that `max()` against any real distance discards it.
pub const UNDEFINED_DIST: f32 = -0.1;

/// True when `d` still carries the sentinel value.
#[inline]
pub fn is_undefined_dist(d: f32) -> bool {
    (d - UNDEFINED_DIST) <= f32::EPSILON
}

/// One scored, vectorized chromosome instance.
///
/// Poses live in the `BindingPopulation`'s flat container for the whole
/// run; binding modes reference them by index.
#[derive(Clone, Debug)]
pub struct Pose {
    /// Index into the externally owned chromosome array.
    pub chrom_index: usize,
    /// Assigned cluster id, -1 while unclustered. Set once per pass.
    pub order: i32,
    /// OPTICS reachability, sentinel or a non-negative distance.
    pub reachability: f32,
    /// Expansion bookkeeping of the cluster orderer.
    pub processed: bool,
    pub energy: f64,
    pub solvated_energy: f64,
    pub boltzmann_weight: f64,
    pub solvated_boltzmann_weight: f64,
    pub features: Vec<f32>,
}

impl Pose {
    /// Build a pose from its scored chromosome. With a zero temperature
    /// Boltzmann weighting is disabled and every pose carries unit weight.
    pub fn new(
        chrom_index: usize,
        energy: f64,
        solvated_energy: f64,
        features: Vec<f32>,
        params: &SimParams,
    ) -> Self {
        let (w, ws) = if params.temperature > 0.0 {
            (
                (-params.beta * energy).exp(),
                (-params.beta * solvated_energy).exp(),
            )
        } else {
            (1.0, 1.0)
        };
        Pose {
            chrom_index,
            order: -1,
            reachability: UNDEFINED_DIST,
            processed: false,
            energy,
            solvated_energy,
            boltzmann_weight: w,
            solvated_boltzmann_weight: ws,
            features,
        }
    }

    #[inline]
    pub fn is_clustered(&self) -> bool {
        self.order >= 0
    }
}

/// Classification order: cluster id, then reachability, then chromosome
/// index. Used to list the members of a mode in a reproducible order.
pub fn classifier_cmp(a: &Pose, b: &Pose) -> Ordering {
    a.order
        .cmp(&b.order)
        .then(a.reachability.total_cmp(&b.reachability))
        .then(a.chrom_index.cmp(&b.chrom_index))
}

/// Ranking order: solvated energy, then raw energy, then the heavier
/// Boltzmann weight first, then chromosome index.
pub fn ranker_cmp(a: &Pose, b: &Pose) -> Ordering {
    a.solvated_energy
        .total_cmp(&b.solvated_energy)
        .then(a.energy.total_cmp(&b.energy))
        .then(b.boltzmann_weight.total_cmp(&a.boltzmann_weight))
        .then(a.chrom_index.cmp(&b.chrom_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(chrom_index: usize, energy: f64) -> Pose {
        Pose::new(chrom_index, energy, energy, vec![0.0; 3], &SimParams::default())
    }

    #[test]
    fn test_undefined_dist_sentinel() {
        assert!(is_undefined_dist(UNDEFINED_DIST));
        assert!(!is_undefined_dist(0.0));
        assert!(!is_undefined_dist(0.3));
    }

    #[test]
    fn test_new_pose_is_unclustered() {
        let p = pose(4, -12.0);
        assert_eq!(p.order, -1);
        assert!(!p.is_clustered());
        assert!(is_undefined_dist(p.reachability));
        assert!(p.boltzmann_weight.is_finite());
    }

    #[test]
    fn test_zero_temperature_gives_unit_weights() {
        let mut params = SimParams::default();
        params.temperature = 0.0;
        let p = Pose::new(0, -50.0, -40.0, vec![], &params);
        assert_eq!(p.boltzmann_weight, 1.0);
        assert_eq!(p.solvated_boltzmann_weight, 1.0);
    }

    #[test]
    fn test_ranker_prefers_lower_solvated_energy() {
        let a = pose(0, -3.0);
        let b = pose(1, -1.0);
        assert_eq!(ranker_cmp(&a, &b), Ordering::Less);
        assert_eq!(ranker_cmp(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_classifier_breaks_ties_on_chrom_index() {
        let a = pose(0, -1.0);
        let b = pose(1, -1.0);
        assert_eq!(classifier_cmp(&a, &b), Ordering::Less);
    }
}
