//! XOR example using the NEAT population engine.
//!
//! This example demonstrates evolving a neural network to solve the XOR problem,
//! a classic benchmark for neuroevolution algorithms.
//!
//! Run with: `RUST_LOG=info cargo run --example xor`

use symbios_neuroevolution::{
    EvolutionConfig, FitnessEvaluator, Genome, KMeansSpeciation, ManhattanDistanceMetric,
    NeatConfig, NetworkEvaluator, Population, ReproductionConfig,
};

const TEST_CASES: [([f64; 2], f64); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// XOR fitness evaluator.
///
/// Maximum fitness is 4.0 (perfect solution).
struct XorFitness;

impl FitnessEvaluator for XorFitness {
    fn evaluate(&self, genome: &Genome) -> f64 {
        let Ok(mut network) = NetworkEvaluator::try_new(genome) else {
            return 0.0;
        };

        let total_error: f64 = TEST_CASES
            .iter()
            .map(|(inputs, expected)| {
                let output = network.evaluate(inputs).map_or(0.0, |out| out[0]);
                (output - expected).powi(2)
            })
            .sum();

        (4.0 - total_error).max(0.0)
    }
}

fn main() {
    env_logger::init();

    println!("NEAT XOR Example");
    println!("================\n");

    let config = EvolutionConfig::new(
        NeatConfig::sigmoid_output(2, 1),
        ReproductionConfig {
            population_size: 150,
            species_count: 8,
            seed: 42,
            ..ReproductionConfig::default()
        },
    );
    let generations = 150;

    println!("Population: {}", config.reproduction.population_size);
    println!("Species: {}", config.reproduction.species_count);
    println!("Generations: {}", generations);
    println!();

    let strategy = KMeansSpeciation::<ManhattanDistanceMetric>::default();
    let mut population = match Population::new(config, strategy) {
        Ok(population) => population,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return;
        }
    };

    let evaluator = XorFitness;
    let mut solution_generation = None;

    for gen in 0..generations {
        population.evaluate(&evaluator);
        let best = population.best_genome().map_or(0.0, |g| g.fitness);

        // Check for solution (fitness >= 3.9 is close enough)
        if best >= 3.9 && solution_generation.is_none() {
            solution_generation = Some(gen);
        }

        if gen % 10 == 0 || gen == generations - 1 {
            let stats = population.stats();
            println!(
                "Gen {:3}: best={:.4}, avg={:.4}, max complexity={}, species={:?}",
                gen,
                stats.best_fitness,
                stats.mean_fitness,
                stats.max_complexity,
                stats.species_sizes
            );
        }

        if solution_generation.is_some() {
            break;
        }
        if let Err(e) = population.step() {
            eprintln!("evolution halted: {e}");
            return;
        }
    }

    println!();

    let Some(champion) = population.best_genome() else {
        println!("Population is empty");
        return;
    };

    println!("Evolution Complete!");
    println!("==================");
    println!("Best fitness: {:.4}", champion.fitness);
    println!("Nodes: {}", champion.nodes().len());
    println!(
        "Enabled connections: {}",
        champion.connections().iter().filter(|c| c.enabled).count()
    );

    if let Some(gen) = solution_generation {
        println!("Solution found at generation: {}", gen);
    }

    println!("\nChampion XOR outputs:");
    let Ok(mut network) = NetworkEvaluator::try_new(champion) else {
        println!("Champion could not be compiled");
        return;
    };

    for (inputs, expected) in &TEST_CASES {
        let output = network.evaluate(inputs).map_or(f64::NAN, |out| out[0]);
        let rounded = if output > 0.5 { 1.0 } else { 0.0 };
        let status = if (rounded - expected).abs() < 0.1 {
            "✓"
        } else {
            "✗"
        };
        println!(
            "  {} XOR {} = {:.4} (expected {}) {}",
            inputs[0] as i32, inputs[1] as i32, output, *expected as i32, status
        );
    }
}
