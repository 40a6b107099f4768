use poseclust::cluster::report::JsonLinesWriter;
use poseclust::data::chromosome::{Chromosome, Gene, GeneLimit, GridPoint, RunContext, SimParams};
use poseclust::data::mode::Representative;
use poseclust::{cluster_population, ClusteringStrategy};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    // synthetic search space: three pockets of poses on a coarse grid
    let gene_limits = vec![
        GeneLimit { min: 0.0, max: 1.0 },
        GeneLimit { min: -180.0, max: 180.0 },
    ];
    let grid: Vec<GridPoint> = (0..30)
        .map(|i| GridPoint { coor: [(i / 10) as f32 * 25.0, (i % 10) as f32 * 0.4, 0.0] })
        .collect();

    let chromosomes: Vec<Chromosome> = (0..30)
        .map(|i| Chromosome {
            genes: vec![
                Gene { code: 0, grid_index: i as u32 },
                Gene { code: (i as i32) * 1_000_000, grid_index: 0 },
            ],
            app_evalue: -10.0 + (i % 10) as f64 * 0.3,
            app_evalue_solvated: -8.0 + (i % 10) as f64 * 0.3,
        })
        .collect();

    let ctx = RunContext {
        params: SimParams {
            temperature: 298.0,
            beta: 1.0 / 298.0,
            cluster_distance: 4.0,
            min_points: 5,
            max_results: 5,
            seed: 7,
            ..SimParams::default()
        },
        gene_limits: &gene_limits,
        grid: &grid,
        origin: [0.0; 3],
        chromosomes: &chromosomes,
    };

    let mut population = cluster_population(&ctx, ClusteringStrategy::RandomProjectionOrdering)?;
    population.classify_binding_modes();

    let max_results = population.params().max_results;
    let mut writer = JsonLinesWriter::new(std::io::stdout());
    let emitted = population.output_population(max_results, Representative::Centroid, &mut writer)?;
    eprintln!("emitted {} of {} binding modes", emitted, population.size());
    Ok(())
}
