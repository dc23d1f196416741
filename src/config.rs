//! Run configuration.
//!
//! [`NeatConfig`] covers everything a single genome needs (shape, activation,
//! mutation and crossover knobs). [`ReproductionConfig`] covers the
//! population-level generation step. [`EvolutionConfig`] bundles both and is
//! validated once before a population is built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activation::Activation;

/// Errors raised by [`EvolutionConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A genome needs at least one input and one output.
    #[error("genome needs at least one input and one output (got {inputs} inputs, {outputs} outputs)")]
    EmptyInterface { inputs: usize, outputs: usize },
    /// At least one species is required.
    #[error("species count must be at least 1")]
    NoSpecies,
    /// Every species must be able to hold at least one genome.
    #[error("population size {population_size} is smaller than species count {species_count}")]
    PopulationTooSmall {
        population_size: usize,
        species_count: usize,
    },
    /// A probability or proportion outside `[0, 1]`.
    #[error("{name} must lie in [0, 1], got {value}")]
    ProportionOutOfRange { name: &'static str, value: f64 },
    /// A magnitude that must be finite and non-negative.
    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidMagnitude { name: &'static str, value: f64 },
    /// The add-connection mutation needs at least one attempt.
    #[error("add_connection_attempts must be at least 1")]
    NoConnectionAttempts,
}

/// Configuration for genome creation, mutation and crossover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeatConfig {
    /// Number of input nodes (excluding bias).
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Initial weights are drawn uniformly from `[-range, range]`.
    pub initial_weight_range: f64,
    /// Activation applied by hidden nodes.
    pub hidden_activation: Activation,
    /// Activation applied by output nodes.
    pub output_activation: Activation,
    /// Per-connection probability of a weight perturbation.
    pub perturb_chance: f64,
    /// Perturbations add `uniform(-1, 1) * perturb_amount`.
    pub perturb_amount: f64,
    /// Attempts made by the add-connection mutation before it gives up.
    pub add_connection_attempts: usize,
    /// Remove-connection never leaves fewer connections than this.
    pub min_connections_after_removal: usize,
    /// Perturbed weights are clamped into `[-weight_limit, weight_limit]`.
    pub weight_limit: f64,
    /// Chance that an acyclic gene unique to the less fit parent is inherited.
    /// The default of 1.0 inherits every such gene.
    pub secondary_parent_gene_probability: f64,
    /// Coefficient for excess genes in compatibility distance.
    pub compatibility_excess_coeff: f64,
    /// Coefficient for disjoint genes in compatibility distance.
    pub compatibility_disjoint_coeff: f64,
    /// Coefficient for mean weight difference in compatibility distance.
    pub compatibility_weight_coeff: f64,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 1,
            initial_weight_range: 1.0,
            hidden_activation: Activation::Tanh,
            output_activation: Activation::Tanh,
            perturb_chance: 0.5,
            perturb_amount: 0.5,
            add_connection_attempts: 5,
            min_connections_after_removal: 1,
            weight_limit: 1.0e6,
            secondary_parent_gene_probability: 1.0,
            compatibility_excess_coeff: 1.0,
            compatibility_disjoint_coeff: 1.0,
            compatibility_weight_coeff: 0.4,
        }
    }
}

impl NeatConfig {
    /// Default settings for a network with the given interface.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Sigmoid outputs for problems scored on `[0, 1]` targets.
    #[must_use]
    pub fn sigmoid_output(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            output_activation: Activation::Sigmoid,
            ..Self::new(num_inputs, num_outputs)
        }
    }

    /// Check interface sizes and numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_inputs == 0 || self.num_outputs == 0 {
            return Err(ConfigError::EmptyInterface {
                inputs: self.num_inputs,
                outputs: self.num_outputs,
            });
        }
        if self.add_connection_attempts == 0 {
            return Err(ConfigError::NoConnectionAttempts);
        }
        check_proportion("perturb_chance", self.perturb_chance)?;
        check_proportion(
            "secondary_parent_gene_probability",
            self.secondary_parent_gene_probability,
        )?;
        check_magnitude("initial_weight_range", self.initial_weight_range)?;
        check_magnitude("perturb_amount", self.perturb_amount)?;
        check_magnitude("weight_limit", self.weight_limit)?;
        check_magnitude("compatibility_excess_coeff", self.compatibility_excess_coeff)?;
        check_magnitude(
            "compatibility_disjoint_coeff",
            self.compatibility_disjoint_coeff,
        )?;
        check_magnitude("compatibility_weight_coeff", self.compatibility_weight_coeff)?;
        Ok(())
    }
}

/// Configuration for the population-level generation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionConfig {
    /// Number of genomes alive each generation.
    pub population_size: usize,
    /// Number of species the speciation strategy maintains.
    pub species_count: usize,
    /// Fraction of each species kept unchanged into the next generation.
    pub elitism_proportion: f64,
    /// Fraction of each species' fittest members eligible as parents.
    pub selection_proportion: f64,
    /// Fraction of offspring produced by cloning and mutating one parent.
    pub asexual_offspring_proportion: f64,
    /// Fraction of sexual offspring whose second parent comes from another species.
    pub interspecies_mating_proportion: f64,
    /// Chance that a crossover child is also mutated.
    pub sexual_offspring_mutation_probability: f64,
    /// Bound on each innovation registry. `None` keeps full history.
    pub history_buffer_size: Option<usize>,
    /// Seed for the run's random number generator.
    pub seed: u64,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            population_size: 150,
            species_count: 10,
            elitism_proportion: 0.2,
            selection_proportion: 0.2,
            asexual_offspring_proportion: 0.5,
            interspecies_mating_proportion: 0.01,
            sexual_offspring_mutation_probability: 0.2,
            history_buffer_size: None,
            seed: 0,
        }
    }
}

impl ReproductionConfig {
    /// Check sizes and proportions.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.species_count == 0 {
            return Err(ConfigError::NoSpecies);
        }
        if self.population_size < self.species_count {
            return Err(ConfigError::PopulationTooSmall {
                population_size: self.population_size,
                species_count: self.species_count,
            });
        }
        check_proportion("elitism_proportion", self.elitism_proportion)?;
        check_proportion("selection_proportion", self.selection_proportion)?;
        check_proportion(
            "asexual_offspring_proportion",
            self.asexual_offspring_proportion,
        )?;
        check_proportion(
            "interspecies_mating_proportion",
            self.interspecies_mating_proportion,
        )?;
        check_proportion(
            "sexual_offspring_mutation_probability",
            self.sexual_offspring_mutation_probability,
        )?;
        Ok(())
    }
}

/// Everything needed to run one evolutionary search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Genome-level settings.
    pub neat: NeatConfig,
    /// Population-level settings.
    pub reproduction: ReproductionConfig,
}

impl EvolutionConfig {
    /// Bundle the two halves.
    #[must_use]
    pub fn new(neat: NeatConfig, reproduction: ReproductionConfig) -> Self {
        Self { neat, reproduction }
    }

    /// Validate both halves.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.neat.validate()?;
        self.reproduction.validate()
    }
}

fn check_proportion(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProportionOutOfRange { name, value })
    }
}

fn check_magnitude(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidMagnitude { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EvolutionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_species_rejected() {
        let mut config = EvolutionConfig::default();
        config.reproduction.species_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoSpecies));
    }

    #[test]
    fn test_population_smaller_than_species_rejected() {
        let mut config = EvolutionConfig::default();
        config.reproduction.population_size = 5;
        config.reproduction.species_count = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PopulationTooSmall {
                population_size: 5,
                species_count: 6
            })
        ));
    }

    #[test]
    fn test_proportion_out_of_range_rejected() {
        let mut config = EvolutionConfig::default();
        config.reproduction.elitism_proportion = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProportionOutOfRange {
                name: "elitism_proportion",
                ..
            })
        ));

        let mut config = EvolutionConfig::default();
        config.neat.perturb_chance = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_interface_rejected() {
        let config = NeatConfig::new(0, 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyInterface { .. })
        ));
    }

    #[test]
    fn test_negative_magnitude_rejected() {
        let mut config = NeatConfig::default();
        config.perturb_amount = -0.1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMagnitude {
                name: "perturb_amount",
                ..
            })
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut config = EvolutionConfig::default();
        config.reproduction.history_buffer_size = Some(256);
        config.neat = NeatConfig::sigmoid_output(3, 2);

        let json = serde_json::to_string(&config).unwrap();
        let back: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
