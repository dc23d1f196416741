//! Generational population controller.
//!
//! A [`Population`] owns every genome (in a [`SlotMap`] arena), the species
//! partition, the run's [`EvolutionContext`] and its random number generator.
//! Each call to [`Population::step`] performs one generation:
//!
//! 1. Species target sizes from fitness sharing, stochastically rounded.
//! 2. Correction so targets sum to the population size, with the champion's
//!    species guaranteed a slot.
//! 3. Elites kept, the remaining quota filled with asexual and sexual
//!    offspring drawn from roulette wheels over each species' fittest members.
//! 4. Non-elites culled and offspring speciated. If a species went extinct
//!    the whole population is re-speciated.
//! 5. Members re-sorted and the champion recomputed.
//!
//! Fitness is supplied between steps through [`Population::evaluate`] or
//! [`Population::set_fitness`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use thiserror::Error;

use crate::config::{ConfigError, EvolutionConfig};
use crate::genome::{Genome, GenomeError, GenomeId};
use crate::innovation::EvolutionContext;
use crate::selection::{stochastic_round, RouletteWheel};
use crate::speciation::{SpeciationStrategy, Species};

/// Scores a genome. Higher is better; zero is a valid score.
///
/// Implementations must be thread-safe because the population may score
/// genomes in parallel.
pub trait FitnessEvaluator: Send + Sync {
    /// Fitness of `genome`.
    fn evaluate(&self, genome: &Genome) -> f64;
}

impl<F> FitnessEvaluator for F
where
    F: Fn(&Genome) -> f64 + Send + Sync,
{
    fn evaluate(&self, genome: &Genome) -> f64 {
        self(genome)
    }
}

/// Errors that halt evolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvolutionError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A genome operation failed.
    #[error(transparent)]
    Genome(#[from] GenomeError),
    /// The champion's species needed a slot and no other species had one.
    #[error(
        "no species can give up a slot for the champion (population {population_size}, {species_count} species)"
    )]
    NoDonorSpecies {
        population_size: usize,
        species_count: usize,
    },
    /// The population holds no genomes.
    #[error("population is empty")]
    EmptyPopulation,
    /// No genome with this key exists.
    #[error("unknown genome {0:?}")]
    UnknownGenome(GenomeId),
}

/// Summary of the population after a generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Generations completed so far.
    pub generation: u64,
    /// Fitness of the champion.
    pub best_fitness: f64,
    /// Mean fitness over all genomes.
    pub mean_fitness: f64,
    /// Largest node + connection count.
    pub max_complexity: usize,
    /// Mean node + connection count.
    pub mean_complexity: f64,
    /// Member count per species.
    pub species_sizes: Vec<usize>,
    /// Index of the species holding the champion.
    pub champion_species: Option<usize>,
}

/// Integer species sizes summing exactly to `population_size`.
///
/// Each non-empty species is allotted
/// `population_size * mean_fitness / total_mean_fitness` (an even share if
/// every mean is zero), stochastically rounded. The rounding error is then
/// corrected one unit at a time by roulette over the rounding residuals.
/// Finally `champion` is guaranteed at least one slot, taken from the
/// species with the largest allotment.
///
/// `mean_fitness` and `species_sizes` are parallel. Species with no members
/// receive nothing.
///
/// # Errors
///
/// Returns [`EvolutionError::NoDonorSpecies`] if the champion's species
/// needs a slot and no other species has one, and
/// [`EvolutionError::EmptyPopulation`] if every species is empty.
pub fn allocate_target_sizes<R: Rng>(
    mean_fitness: &[f64],
    species_sizes: &[usize],
    population_size: usize,
    champion: Option<usize>,
    rng: &mut R,
) -> Result<Vec<usize>, EvolutionError> {
    let live: Vec<usize> = (0..species_sizes.len())
        .filter(|&i| species_sizes[i] > 0)
        .collect();
    if live.is_empty() {
        return Err(EvolutionError::EmptyPopulation);
    }

    let share = |i: usize| mean_fitness.get(i).copied().unwrap_or(0.0).max(0.0);
    let total: f64 = live.iter().map(|&i| share(i)).sum();
    let mut exact = vec![0.0; species_sizes.len()];
    for &i in &live {
        exact[i] = if total > 0.0 {
            population_size as f64 * share(i) / total
        } else {
            population_size as f64 / live.len() as f64
        };
    }

    let mut targets: Vec<usize> = exact.iter().map(|&x| stochastic_round(x, rng)).collect();

    let mut corrections = 0usize;
    loop {
        let sum: usize = targets.iter().sum();
        if sum == population_size {
            break;
        }
        corrections += 1;
        if sum < population_size {
            let wheel = RouletteWheel::new(
                live.iter()
                    .map(|&i| (i, exact[i] - targets[i] as f64)),
            );
            if let Some(&i) = wheel.spin(rng) {
                targets[i] += 1;
            }
        } else {
            let wheel = RouletteWheel::new(
                live.iter()
                    .filter(|&&i| targets[i] > 0)
                    .map(|&i| (i, targets[i] as f64 - exact[i])),
            );
            if let Some(&i) = wheel.spin(rng) {
                targets[i] -= 1;
            }
        }
    }
    if corrections > 0 {
        log::debug!("corrected species targets by {corrections} unit(s)");
    }

    if let Some(champ) = champion.filter(|&c| c < targets.len()) {
        if targets[champ] == 0 {
            let donor = (0..targets.len())
                .filter(|&i| i != champ && targets[i] > 0)
                .max_by_key(|&i| targets[i])
                .ok_or(EvolutionError::NoDonorSpecies {
                    population_size,
                    species_count: species_sizes.len(),
                })?;
            targets[donor] -= 1;
            targets[champ] += 1;
            log::debug!("species {donor} gave a slot to champion species {champ}");
        }
    }

    Ok(targets)
}

/// Per-species reproduction plan for one generation.
#[derive(Debug, Clone, Copy, Default)]
struct SpeciesPlan {
    elites: usize,
    asexual: usize,
    sexual: usize,
    selection: usize,
}

/// A NEAT population evolving under a speciation strategy `S`.
#[derive(Debug, Clone)]
pub struct Population<S> {
    config: EvolutionConfig,
    strategy: S,
    genomes: SlotMap<GenomeId, Genome>,
    species: Vec<Species>,
    ctx: EvolutionContext,
    rng: ChaCha8Rng,
    generation: u64,
    champion: Option<(GenomeId, usize)>,
}

impl<S: SpeciationStrategy> Population<S> {
    /// Validate `config`, seed a population from one minimal genome with
    /// per-individual random weights, and speciate it.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Config`] for an invalid configuration.
    pub fn new(config: EvolutionConfig, strategy: S) -> Result<Self, EvolutionError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.reproduction.seed);
        let mut ctx = EvolutionContext::with_history_capacity(config.reproduction.history_buffer_size);

        let template = Genome::new(&config.neat, &mut ctx, &mut rng)?;
        let mut genomes = SlotMap::with_capacity_and_key(config.reproduction.population_size);
        let ids: Vec<GenomeId> = (0..config.reproduction.population_size)
            .map(|_| {
                let mut genome = template.clone();
                genome.randomize_weights(config.neat.initial_weight_range, &mut rng);
                genomes.insert(genome)
            })
            .collect();

        let species = strategy.initialize_speciation(
            &genomes,
            &ids,
            config.reproduction.species_count,
            &mut rng,
        );
        log::info!(
            "seeded {} genomes ({} inputs, {} outputs) across {} species",
            ids.len(),
            config.neat.num_inputs,
            config.neat.num_outputs,
            species.len()
        );

        let mut population = Self {
            config,
            strategy,
            genomes,
            species,
            ctx,
            rng,
            generation: 0,
            champion: None,
        };
        population.refresh_rankings();
        Ok(population)
    }

    /// The run configuration.
    #[must_use]
    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// All living genomes.
    #[must_use]
    pub fn genomes(&self) -> &SlotMap<GenomeId, Genome> {
        &self.genomes
    }

    /// Look up one genome.
    #[must_use]
    pub fn genome(&self, id: GenomeId) -> Option<&Genome> {
        self.genomes.get(id)
    }

    /// The current species partition.
    #[must_use]
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Generations completed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Innovation state of this run.
    #[must_use]
    pub fn context(&self) -> &EvolutionContext {
        &self.ctx
    }

    /// Key of the fittest genome.
    #[must_use]
    pub fn best_genome_id(&self) -> Option<GenomeId> {
        self.champion.map(|(id, _)| id)
    }

    /// The fittest genome.
    #[must_use]
    pub fn best_genome(&self) -> Option<&Genome> {
        self.best_genome_id().and_then(|id| self.genomes.get(id))
    }

    /// Index of the species holding the fittest genome.
    #[must_use]
    pub fn champion_species(&self) -> Option<usize> {
        self.champion.map(|(_, species)| species)
    }

    /// Score every genome with `evaluator`, in parallel when the `parallel`
    /// feature is enabled.
    pub fn evaluate<E: FitnessEvaluator>(&mut self, evaluator: &E) {
        #[cfg(feature = "parallel")]
        {
            let genomes: Vec<&mut Genome> = self.genomes.values_mut().collect();
            genomes
                .into_par_iter()
                .for_each(|genome| genome.fitness = evaluator.evaluate(genome));
        }
        #[cfg(not(feature = "parallel"))]
        for genome in self.genomes.values_mut() {
            genome.fitness = evaluator.evaluate(genome);
        }

        let mut sanitized = 0usize;
        for genome in self.genomes.values_mut() {
            if !genome.fitness.is_finite() || genome.fitness < 0.0 {
                genome.fitness = 0.0;
                sanitized += 1;
            }
        }
        if sanitized > 0 {
            log::warn!("{sanitized} fitness score(s) were NaN, infinite or negative; set to 0");
        }
        self.refresh_rankings();
    }

    /// Assign fitness to one genome. NaN, infinite and negative scores
    /// become 0.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::UnknownGenome`] if `id` is not alive.
    pub fn set_fitness(&mut self, id: GenomeId, fitness: f64) -> Result<(), EvolutionError> {
        let genome = self
            .genomes
            .get_mut(id)
            .ok_or(EvolutionError::UnknownGenome(id))?;
        genome.fitness = if fitness.is_finite() && fitness >= 0.0 {
            fitness
        } else {
            log::warn!("fitness {fitness} for {id:?} set to 0");
            0.0
        };
        Ok(())
    }

    /// Score every genome, then advance one generation.
    ///
    /// # Errors
    ///
    /// See [`step`](Self::step).
    pub fn run_generation<E: FitnessEvaluator>(
        &mut self,
        evaluator: &E,
    ) -> Result<GenerationStats, EvolutionError> {
        self.evaluate(evaluator);
        self.step()
    }

    /// Produce the next generation from the current fitness scores.
    ///
    /// # Errors
    ///
    /// Fails if the population is empty, if the champion's species cannot be
    /// given a slot, or if a genome operation fails.
    pub fn step(&mut self) -> Result<GenerationStats, EvolutionError> {
        if self.genomes.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        self.refresh_rankings();

        let plans = self.plan_generation()?;
        let offspring = self.create_offspring(&plans)?;

        // Cull everything but the elites.
        for (species, plan) in self.species.iter_mut().zip(&plans) {
            for id in species.members.split_off(plan.elites.min(species.members.len())) {
                self.genomes.remove(id);
            }
        }
        let any_extinct = self.species.iter().any(Species::is_empty);

        let new_ids: Vec<GenomeId> = offspring
            .into_iter()
            .map(|genome| self.genomes.insert(genome))
            .collect();

        if any_extinct {
            log::debug!(
                "generation {}: a species went extinct, re-speciating {} genomes",
                self.generation + 1,
                self.genomes.len()
            );
            let all: Vec<GenomeId> = self.genomes.keys().collect();
            for species in &mut self.species {
                species.members.clear();
            }
            self.strategy
                .speciate_genomes(&self.genomes, &all, &mut self.species, &mut self.rng);
        } else {
            self.strategy
                .speciate_offspring(&self.genomes, &new_ids, &mut self.species, &mut self.rng);
        }

        self.generation += 1;
        self.refresh_rankings();

        let stats = self.stats();
        log::info!(
            "generation {}: best {:.4}, mean {:.4}, max complexity {}, species {:?}",
            stats.generation,
            stats.best_fitness,
            stats.mean_fitness,
            stats.max_complexity,
            stats.species_sizes
        );
        Ok(stats)
    }

    /// Current population summary.
    #[must_use]
    pub fn stats(&self) -> GenerationStats {
        let count = self.genomes.len().max(1) as f64;
        let (fitness_sum, complexity_sum, max_complexity) = self.genomes.values().fold(
            (0.0, 0usize, 0usize),
            |(fitness, total, max), genome| {
                let complexity = genome.complexity();
                (fitness + genome.fitness, total + complexity, max.max(complexity))
            },
        );

        GenerationStats {
            generation: self.generation,
            best_fitness: self.best_genome().map_or(0.0, |genome| genome.fitness),
            mean_fitness: fitness_sum / count,
            max_complexity,
            mean_complexity: complexity_sum as f64 / count,
            species_sizes: self.species.iter().map(Species::len).collect(),
            champion_species: self.champion_species(),
        }
    }

    /// Sort every species fittest first (younger first on ties) and pick the
    /// champion from the species leaders.
    fn refresh_rankings(&mut self) {
        let genomes = &self.genomes;
        for species in &mut self.species {
            species.members.retain(|&id| genomes.contains_key(id));
            species.members.sort_by(|&a, &b| {
                let (a, b) = (&genomes[a], &genomes[b]);
                b.fitness
                    .total_cmp(&a.fitness)
                    .then(b.birth_generation.cmp(&a.birth_generation))
            });
        }

        self.champion = None;
        let mut best_fitness = f64::NEG_INFINITY;
        for (index, species) in self.species.iter().enumerate() {
            if let Some(&leader) = species.members.first() {
                let fitness = genomes[leader].fitness;
                if fitness > best_fitness {
                    best_fitness = fitness;
                    self.champion = Some((leader, index));
                }
            }
        }
    }

    fn plan_generation(&mut self) -> Result<Vec<SpeciesPlan>, EvolutionError> {
        let reproduction = &self.config.reproduction;
        let sizes: Vec<usize> = self.species.iter().map(Species::len).collect();
        let means: Vec<f64> = self
            .species
            .iter()
            .map(|species| {
                if species.is_empty() {
                    0.0
                } else {
                    species
                        .members
                        .iter()
                        .map(|&id| self.genomes[id].fitness)
                        .sum::<f64>()
                        / species.len() as f64
                }
            })
            .collect();

        let champion_species = self.champion_species();
        let targets = allocate_target_sizes(
            &means,
            &sizes,
            reproduction.population_size,
            champion_species,
            &mut self.rng,
        )?;

        let mut plans = Vec::with_capacity(targets.len());
        for (index, (&target, &size)) in targets.iter().zip(&sizes).enumerate() {
            let mut elites =
                ((size as f64 * reproduction.elitism_proportion).round() as usize).min(target);
            if champion_species == Some(index) {
                elites = elites.max(1);
            }
            let offspring = target - elites;
            let asexual = stochastic_round(
                offspring as f64 * reproduction.asexual_offspring_proportion,
                &mut self.rng,
            )
            .min(offspring);
            let selection = stochastic_round(
                size as f64 * reproduction.selection_proportion,
                &mut self.rng,
            )
            .clamp(1, size.max(1));

            plans.push(SpeciesPlan {
                elites,
                asexual,
                sexual: offspring - asexual,
                selection,
            });
        }
        Ok(plans)
    }

    fn create_offspring(&mut self, plans: &[SpeciesPlan]) -> Result<Vec<Genome>, EvolutionError> {
        let birth = self.generation + 1;
        let neat = &self.config.neat;
        let reproduction = &self.config.reproduction;
        let genomes = &self.genomes;

        let parent_wheels: Vec<RouletteWheel<GenomeId>> = self
            .species
            .iter()
            .zip(plans)
            .map(|(species, plan)| {
                RouletteWheel::new(
                    species.members[..plan.selection.min(species.len())]
                        .iter()
                        .map(|&id| (id, genomes[id].fitness)),
                )
            })
            .collect();
        let species_wheel = RouletteWheel::new(
            self.species
                .iter()
                .enumerate()
                .filter(|(_, species)| !species.is_empty())
                .map(|(index, species)| {
                    let total: f64 = species.members.iter().map(|&id| genomes[id].fitness).sum();
                    (index, total / species.len() as f64)
                }),
        );

        let mut offspring = Vec::new();
        for (index, plan) in plans.iter().enumerate() {
            let wheel = &parent_wheels[index];
            if wheel.is_empty() {
                continue;
            }

            for _ in 0..plan.asexual {
                if let Some(&parent) = wheel.spin(&mut self.rng) {
                    let mut child = genomes[parent].create_asexual_offspring();
                    child.mutate(&mut self.ctx, neat, &mut self.rng)?;
                    child.birth_generation = birth;
                    offspring.push(child);
                }
            }

            for _ in 0..plan.sexual {
                let Some(&first) = wheel.spin(&mut self.rng) else {
                    continue;
                };

                let interspecies = species_wheel.len() > 1
                    && self.rng.random::<f64>() < reproduction.interspecies_mating_proportion;
                let second = if interspecies {
                    let mut others = species_wheel.clone();
                    others.remove_outcome(&index);
                    others
                        .spin(&mut self.rng)
                        .and_then(|&other| parent_wheels[other].spin(&mut self.rng))
                        .copied()
                } else if wheel.len() > 1 {
                    let mut rest = wheel.clone();
                    rest.remove_outcome(&first);
                    rest.spin(&mut self.rng).copied()
                } else {
                    None
                };

                let mut child = match second {
                    Some(second) => {
                        let mut child =
                            genomes[first].create_offspring(&genomes[second], neat, &mut self.rng)?;
                        if self.rng.random::<f64>() < reproduction.sexual_offspring_mutation_probability
                        {
                            child.mutate(&mut self.ctx, neat, &mut self.rng)?;
                        }
                        child
                    }
                    None => {
                        let mut child = genomes[first].create_asexual_offspring();
                        child.mutate(&mut self.ctx, neat, &mut self.rng)?;
                        child
                    }
                };
                child.birth_generation = birth;
                offspring.push(child);
            }
        }
        Ok(offspring)
    }
}
