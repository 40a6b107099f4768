use tracing::warn;

use crate::data::chromosome::{Chromosome, RunContext};

/// Turn a chromosome into its fixed-length feature vector.
///
/// The first 3 components are the Cartesian offset of the translational
/// gene's grid slot relative to the reference origin; every further gene
/// `j >= 1` contributes one decoded scalar at index `j + 2`.
///
/// A malformed chromosome (gene count mismatch, grid index outside the
/// table) yields a vector whose length differs from
/// `RunContext::dimensions()`; callers must skip such chromosomes
/// instead of feeding them into distance computations.
pub fn vectorize_chromosome(ctx: &RunContext, chrom: &Chromosome) -> Vec<f32> {
    if chrom.genes.is_empty() || chrom.genes.len() != ctx.gene_limits.len() {
        return Vec::new();
    }

    let slot = chrom.genes[0].grid_index as usize;
    let grid_point = match ctx.grid.get(slot) {
        Some(gp) => gp,
        None => {
            warn!("grid index {} outside coordinate table of size {}", slot, ctx.grid.len());
            return Vec::new();
        }
    };

    let mut v = vec![0.0f32; ctx.dimensions()];
    for i in 0..3 {
        v[i] = grid_point.coor[i] - ctx.origin[i];
    }
    for j in 1..chrom.genes.len() {
        v[j + 2] = ctx.gene_limits[j].decode(chrom.genes[j].code) as f32;
    }
    v
}

/// Euclidean distance over two equally sized feature vectors.
///
/// The same signature services internal-coordinate feature vectors and
/// any alternate Cartesian projection of the same dimensionality.
#[inline]
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x - y;
        acc += d * d;
    }
    acc.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::chromosome::{Gene, GeneLimit, GridPoint, SimParams};

    fn test_context<'a>(
        limits: &'a [GeneLimit],
        grid: &'a [GridPoint],
    ) -> RunContext<'a> {
        RunContext {
            params: SimParams::default(),
            gene_limits: limits,
            grid,
            origin: [1.0, 1.0, 1.0],
            chromosomes: &[],
        }
    }

    fn chrom(grid_index: u32, codes: &[i32]) -> Chromosome {
        let mut genes = vec![Gene { code: 0, grid_index }];
        genes.extend(codes.iter().map(|&code| Gene { code, grid_index: 0 }));
        Chromosome { genes, app_evalue: 0.0, app_evalue_solvated: 0.0 }
    }

    #[test]
    fn test_vectorize_dimensionality() {
        let limits = vec![GeneLimit { min: 0.0, max: 1.0 }; 3];
        let grid = vec![GridPoint { coor: [2.0, 3.0, 4.0] }];
        let ctx = test_context(&limits, &grid);
        let v = vectorize_chromosome(&ctx, &chrom(0, &[i32::MAX, 0]));
        assert_eq!(v.len(), ctx.dimensions());
        assert_eq!(&v[0..3], &[1.0, 2.0, 3.0]);
        assert!((v[3] - 1.0).abs() < 1e-6);
        assert!(v[4].abs() < 1e-6);
    }

    #[test]
    fn test_vectorize_malformed_chromosome() {
        let limits = vec![GeneLimit { min: 0.0, max: 1.0 }; 3];
        let grid = vec![GridPoint { coor: [0.0; 3] }];
        let ctx = test_context(&limits, &grid);
        // grid index outside the table
        assert!(vectorize_chromosome(&ctx, &chrom(7, &[0, 0])).is_empty());
        // gene count mismatch
        assert!(vectorize_chromosome(&ctx, &chrom(0, &[0])).is_empty());
    }

    #[test]
    fn test_euclidean_metric_properties() {
        let a = vec![0.0f32, 0.0, 3.0];
        let b = vec![4.0f32, 0.0, 0.0];
        let c = vec![1.0f32, 1.0, 1.0];

        assert_eq!(euclidean(&a, &a), 0.0);
        assert!(euclidean(&a, &b) >= 0.0);
        assert!((euclidean(&a, &b) - euclidean(&b, &a)).abs() < f32::EPSILON);
        assert!((euclidean(&a, &b) - 5.0).abs() < 1e-6);
        // triangle inequality within float tolerance
        assert!(euclidean(&a, &b) <= euclidean(&a, &c) + euclidean(&c, &b) + 1e-6);
    }
}
