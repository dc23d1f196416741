//! # Symbios Neuroevolution
//!
//! A NEAT (`NeuroEvolution` of Augmenting Topologies) engine: feed-forward
//! genomes whose genes carry innovation IDs, crossover aligned by those IDs,
//! k-means speciation and a generational population controller.
//!
//! ## Features
//!
//! - **Shared Innovation History**: one [`EvolutionContext`] per run hands out
//!   innovation IDs, so the same structural mutation discovered in two genomes
//!   receives the same ID and their genes line up during crossover
//! - **Sorted Gene Lists**: genes live in [`GeneList`]s ordered by innovation
//!   ID, making lookup a binary search and correlation a linear merge
//! - **Acyclic by Construction**: every structural edit is cycle-checked, and
//!   nodes are kept in longest-path layers for single-pass evaluation
//! - **Parallel Fitness**: with the `parallel` feature (on by default) the
//!   population scores genomes across threads with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use symbios_neuroevolution::{
//!     EvolutionConfig, Genome, KMeansSpeciation, ManhattanDistanceMetric, NeatConfig,
//!     Population, ReproductionConfig,
//! };
//!
//! let config = EvolutionConfig::new(
//!     NeatConfig::new(2, 1),
//!     ReproductionConfig {
//!         population_size: 40,
//!         species_count: 4,
//!         ..ReproductionConfig::default()
//!     },
//! );
//! let mut population =
//!     Population::new(config, KMeansSpeciation::<ManhattanDistanceMetric>::default()).unwrap();
//!
//! // Reward networks whose output is close to 1 for input (1, 1).
//! let fitness = |genome: &Genome| {
//!     let mut genome = genome.clone();
//!     let output = genome.evaluate(&[1.0, 1.0]).map_or(0.0, |out| out[0]);
//!     1.0 / (1.0 + (1.0 - output).abs())
//! };
//!
//! for _ in 0..5 {
//!     population.run_generation(&fitness).unwrap();
//! }
//! assert_eq!(population.genomes().len(), 40);
//! ```
//!
//! ## Architecture
//!
//! ### Innovation IDs
//!
//! A new connection between two nodes asks the context for the ID already
//! assigned to that endpoint pair before minting a fresh one. Splitting a
//! connection likewise reuses the node and connection IDs recorded for the
//! first split of that connection. Both registries can be bounded with
//! [`ReproductionConfig::history_buffer_size`], evicting oldest first.
//!
//! ### Evaluation
//!
//! [`Genome::evaluate`] walks the cached layers directly. For hot loops,
//! [`NetworkEvaluator`] compiles a genome into flat CSR arrays and produces
//! identical outputs.
//!
//! ### Reproduction
//!
//! Species sizes come from fitness sharing with stochastic rounding, the
//! champion's species always keeps at least one elite, and offspring are
//! drawn by roulette from each species' fittest members.

pub mod activation;
pub mod config;
pub mod crossover;
pub mod evaluator;
pub mod gene;
pub mod gene_list;
pub mod genome;
pub mod innovation;
pub mod mutation;
pub mod population;
pub mod selection;
pub mod speciation;
pub mod topology;

// Re-exports for convenience
pub use activation::Activation;
pub use config::{ConfigError, EvolutionConfig, NeatConfig, ReproductionConfig};
pub use crossover::{
    correlate, CorrelationItem, CorrelationKind, CorrelationResult, CorrelationStatistics,
};
pub use evaluator::{EvaluatorError, NetworkEvaluator};
pub use gene::{ConnectionGene, Gene, InnovationId, NodeGene, NodeType};
pub use gene_list::GeneList;
pub use genome::{Genome, GenomeError, GenomeId};
pub use innovation::{EvolutionContext, SplitRecord};
pub use mutation::MutationKind;
pub use population::{
    allocate_target_sizes, EvolutionError, FitnessEvaluator, GenerationStats, Population,
};
pub use selection::{stochastic_round, RouletteWheel};
pub use speciation::{
    CoordinateVector, DistanceMetric, KMeansSpeciation, ManhattanDistanceMetric,
    SpeciationStrategy, Species,
};
