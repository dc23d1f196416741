//! Mutation operators.
//!
//! [`Genome::mutate`] picks one of four operators uniformly at random. An
//! operator that cannot apply (nothing to split, no legal connection found,
//! too few connections to remove one) is dropped from the candidate set and
//! another is drawn. Weight modification always applies, so every call
//! changes the genome.
//!
//! Structural operators consult the [`EvolutionContext`] so that the same
//! structural change made independently in two genomes receives the same
//! innovation IDs.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::NeatConfig;
use crate::gene::{ConnectionGene, InnovationId, NodeGene, NodeType};
use crate::genome::{Genome, GenomeError};
use crate::innovation::{EvolutionContext, SplitRecord};
use crate::topology::would_create_cycle;

/// The mutation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Perturb connection weights.
    ModifyWeights,
    /// Split a connection with a new hidden node.
    AddNode,
    /// Connect two previously unconnected nodes.
    AddConnection,
    /// Delete a connection, pruning hidden nodes it leaves isolated.
    RemoveConnection,
}

impl MutationKind {
    /// Every operator, in dispatch order.
    pub const ALL: [Self; 4] = [
        Self::ModifyWeights,
        Self::AddNode,
        Self::AddConnection,
        Self::RemoveConnection,
    ];
}

impl Genome {
    /// Apply one randomly chosen mutation and return which one applied.
    ///
    /// # Errors
    ///
    /// Only fails if the genome's internal bookkeeping is inconsistent.
    pub fn mutate<R: Rng>(
        &mut self,
        ctx: &mut EvolutionContext,
        config: &NeatConfig,
        rng: &mut R,
    ) -> Result<MutationKind, GenomeError> {
        let mut candidates = MutationKind::ALL.to_vec();
        while !candidates.is_empty() {
            let kind = candidates.swap_remove(rng.random_range(0..candidates.len()));
            let applied = match kind {
                MutationKind::ModifyWeights => {
                    self.mutate_weights(config, rng);
                    true
                }
                MutationKind::AddNode => self.mutate_add_node(ctx, rng)?,
                MutationKind::AddConnection => self.mutate_add_connection(ctx, config, rng)?,
                MutationKind::RemoveConnection => self.mutate_remove_connection(config, rng)?,
            };
            if applied {
                return Ok(kind);
            }
        }
        // ModifyWeights always applies.
        Ok(MutationKind::ModifyWeights)
    }

    /// Perturb each weight with probability `perturb_chance`, forcing one
    /// perturbation if none happened.
    pub fn mutate_weights<R: Rng>(&mut self, config: &NeatConfig, rng: &mut R) {
        let limit = config.weight_limit;
        let perturb = |weight: &mut f64, rng: &mut R| {
            let delta = rng.random_range(-1.0..1.0) * config.perturb_amount;
            *weight = (*weight + delta).clamp(-limit, limit);
        };

        let mut perturbed = false;
        for connection in self.connections.iter_mut() {
            if rng.random::<f64>() < config.perturb_chance {
                perturb(&mut connection.weight, rng);
                perturbed = true;
            }
        }
        if !perturbed && !self.connections.is_empty() {
            let index = rng.random_range(0..self.connections.len());
            perturb(&mut self.connections[index].weight, rng);
        }
        self.invalidate_position();
    }

    /// Split a random connection. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// Propagates bookkeeping failures from [`split_connection`](Self::split_connection).
    pub fn mutate_add_node<R: Rng>(
        &mut self,
        ctx: &mut EvolutionContext,
        rng: &mut R,
    ) -> Result<bool, GenomeError> {
        if self.connections.is_empty() {
            return Ok(false);
        }
        let index = rng.random_range(0..self.connections.len());
        let id = self.connections[index].innovation;
        self.split_connection(id, ctx)?;
        Ok(true)
    }

    /// Replace connection `id` with a hidden node and two connections.
    ///
    /// The incoming connection gets weight 1 and the outgoing one keeps the
    /// original weight. IDs recorded for an earlier split of the same
    /// connection are reused unless any of them is already present in this
    /// genome; otherwise three fresh IDs are minted and recorded.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::UnknownGene`] if `id` is not a connection here.
    pub fn split_connection(
        &mut self,
        id: InnovationId,
        ctx: &mut EvolutionContext,
    ) -> Result<SplitRecord, GenomeError> {
        let original = self.detach_connection(id)?;
        let (source, target) = original.endpoints();

        let record = match ctx.lookup_split(id) {
            Some(record) if !self.uses_any_split_id(&record) => record,
            _ => {
                let record = SplitRecord {
                    node_id: ctx.next_id(),
                    input_connection_id: ctx.next_id(),
                    output_connection_id: ctx.next_id(),
                };
                ctx.record_split(id, record);
                record
            }
        };
        ctx.register_connection(source, record.node_id, record.input_connection_id);
        ctx.register_connection(record.node_id, target, record.output_connection_id);

        self.insert_node(NodeGene::new(record.node_id, NodeType::Hidden))?;
        self.insert_connection(ConnectionGene::new(
            record.input_connection_id,
            source,
            record.node_id,
            1.0,
        ))?;
        self.insert_connection(ConnectionGene::new(
            record.output_connection_id,
            record.node_id,
            target,
            original.weight,
        ))?;

        self.rebuild_layers()?;
        Ok(record)
    }

    fn uses_any_split_id(&self, record: &SplitRecord) -> bool {
        self.nodes.contains(record.node_id)
            || self.connections.contains(record.input_connection_id)
            || self.connections.contains(record.output_connection_id)
    }

    /// Try up to `add_connection_attempts` random node pairs and connect the
    /// first one that is new and keeps the network acyclic.
    ///
    /// Returns `false` if the genome has fewer than three nodes or every
    /// attempt was rejected.
    ///
    /// # Errors
    ///
    /// Only fails if the genome's internal bookkeeping is inconsistent.
    pub fn mutate_add_connection<R: Rng>(
        &mut self,
        ctx: &mut EvolutionContext,
        config: &NeatConfig,
        rng: &mut R,
    ) -> Result<bool, GenomeError> {
        if self.nodes.len() < 3 {
            return Ok(false);
        }

        let sources: Vec<InnovationId> = self
            .nodes
            .iter()
            .filter(|node| node.node_type != NodeType::Output)
            .map(|node| node.innovation)
            .collect();
        let targets: Vec<InnovationId> = self
            .nodes
            .iter()
            .filter(|node| !node.node_type.is_source_only())
            .map(|node| node.innovation)
            .collect();

        for _ in 0..config.add_connection_attempts {
            let (Some(&source), Some(&target)) = (sources.choose(rng), targets.choose(rng)) else {
                return Ok(false);
            };
            if self.contains_edge(source, target) || would_create_cycle(&*self, source, target) {
                continue;
            }

            let id = match ctx.lookup_connection(source, target) {
                Some(id) if !self.nodes.contains(id) && !self.connections.contains(id) => id,
                Some(_) => ctx.next_id(),
                None => ctx.connection_innovation(source, target),
            };
            let range = config.initial_weight_range;
            let weight = rng.random_range(-range..=range);
            self.insert_connection(ConnectionGene::new(id, source, target, weight))?;
            self.rebuild_layers()?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Remove a random connection, pruning hidden endpoints left without
    /// connections.
    ///
    /// Returns `false` if that would leave fewer than
    /// `min_connections_after_removal` connections.
    ///
    /// # Errors
    ///
    /// Only fails if the genome's internal bookkeeping is inconsistent.
    pub fn mutate_remove_connection<R: Rng>(
        &mut self,
        config: &NeatConfig,
        rng: &mut R,
    ) -> Result<bool, GenomeError> {
        if self.connections.len() <= config.min_connections_after_removal
            || self.connections.is_empty()
        {
            return Ok(false);
        }
        let index = rng.random_range(0..self.connections.len());
        let id = self.connections[index].innovation;
        self.remove_connection(id)?;
        self.rebuild_layers()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn setup() -> (Genome, EvolutionContext, NeatConfig) {
        let config = NeatConfig::new(2, 1);
        let mut ctx = EvolutionContext::new();
        let genome = Genome::new(&config, &mut ctx, &mut test_rng()).unwrap();
        (genome, ctx, config)
    }

    fn assert_well_formed(genome: &Genome) {
        assert!(genome.nodes().is_sorted());
        assert!(genome.connections().is_sorted());
        assert!(!genome.has_cycle());
        let edges: HashSet<_> = genome.connections().iter().map(|c| c.endpoints()).collect();
        assert_eq!(edges.len(), genome.connections().len(), "duplicate edge");
        for conn in genome.connections() {
            assert!(genome.nodes().contains(conn.source));
            assert!(genome.nodes().contains(conn.target));
        }
    }

    #[test]
    fn test_mutate_weights_changes_something() {
        let (mut genome, _, mut config) = setup();
        config.perturb_chance = 0.0;
        let before: Vec<f64> = genome.connections().iter().map(|c| c.weight).collect();
        genome.mutate_weights(&config, &mut test_rng());
        let after: Vec<f64> = genome.connections().iter().map(|c| c.weight).collect();
        let changed = before.iter().zip(&after).filter(|(a, b)| a != b).count();
        assert_eq!(changed, 1, "exactly one forced perturbation");
    }

    #[test]
    fn test_weights_respect_limit() {
        let (mut genome, _, mut config) = setup();
        config.perturb_chance = 1.0;
        config.perturb_amount = 100.0;
        config.weight_limit = 2.0;
        let mut rng = test_rng();
        for _ in 0..50 {
            genome.mutate_weights(&config, &mut rng);
        }
        assert!(genome.connections().iter().all(|c| c.weight.abs() <= 2.0));
    }

    #[test]
    fn test_split_connection_bookkeeping() {
        let (mut genome, mut ctx, _) = setup();
        let original_weight = genome.connections().get(4).unwrap().weight;

        let record = genome.split_connection(4, &mut ctx).unwrap();
        assert_eq!(
            record,
            SplitRecord {
                node_id: 6,
                input_connection_id: 7,
                output_connection_id: 8,
            }
        );
        assert!(!genome.connections().contains(4));
        assert_eq!(genome.nodes().len(), 5);
        assert_eq!(genome.connections().len(), 3);

        let incoming = genome.connections().get(7).unwrap();
        assert_eq!(incoming.endpoints(), (0, 6));
        assert!((incoming.weight - 1.0).abs() < 1e-12);
        let outgoing = genome.connections().get(8).unwrap();
        assert_eq!(outgoing.endpoints(), (6, 3));
        assert!((outgoing.weight - original_weight).abs() < 1e-12);

        assert_eq!(ctx.lookup_split(4), Some(record));
        assert_eq!(ctx.lookup_connection(0, 6), Some(7));
        assert_eq!(genome.nodes().get(6).unwrap().depth, 1);
        assert_well_formed(&genome);
    }

    #[test]
    fn test_split_reuses_history_across_genomes() {
        let (template, mut ctx, _) = setup();
        let mut first = template.clone();
        let mut second = template;

        let a = first.split_connection(5, &mut ctx).unwrap();
        let b = second.split_connection(5, &mut ctx).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            first.connections().ids().collect::<Vec<_>>(),
            second.connections().ids().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_split_mints_fresh_ids_on_conflict() {
        let (mut genome, mut ctx, _) = setup();
        let first = genome.split_connection(4, &mut ctx).unwrap();

        // Re-add 0 -> 3 under its historical ID and split it again.
        let weight = 0.5;
        genome
            .insert_connection(ConnectionGene::new(4, 0, 3, weight))
            .unwrap();
        let second = genome.split_connection(4, &mut ctx).unwrap();

        assert_ne!(first.node_id, second.node_id);
        assert_eq!(ctx.lookup_split(4), Some(first), "first record wins");
        assert_well_formed(&genome);
    }

    #[test]
    fn test_split_keeps_hidden_source() {
        let (mut genome, mut ctx, _) = setup();
        let record = genome.split_connection(4, &mut ctx).unwrap();
        genome.remove_connection(record.input_connection_id).unwrap();
        assert_eq!(genome.nodes().get(record.node_id).unwrap().degree(), 1);

        // Splitting the hidden node's last connection must not prune it.
        genome
            .split_connection(record.output_connection_id, &mut ctx)
            .unwrap();
        assert!(genome.nodes().contains(record.node_id));
        assert_well_formed(&genome);
    }

    #[test]
    fn test_add_node_needs_connection() {
        let (mut genome, mut ctx, config) = setup();
        let config = NeatConfig {
            min_connections_after_removal: 0,
            ..config
        };
        let mut rng = test_rng();
        while genome.mutate_remove_connection(&config, &mut rng).unwrap() {}
        assert!(genome.connections().is_empty());
        assert!(!genome.mutate_add_node(&mut ctx, &mut rng).unwrap());
    }

    #[test]
    fn test_add_connection_fills_remaining_pair() {
        let (mut genome, mut ctx, config) = setup();
        let mut rng = test_rng();

        let mut added = false;
        for _ in 0..50 {
            if genome.mutate_add_connection(&mut ctx, &config, &mut rng).unwrap() {
                added = true;
                break;
            }
        }
        assert!(added);
        assert!(genome.contains_edge(2, 3), "bias -> output is the only free pair");
        assert_eq!(genome.connections().last().unwrap().innovation, 6);

        // Fully connected now.
        for _ in 0..20 {
            assert!(!genome.mutate_add_connection(&mut ctx, &config, &mut rng).unwrap());
        }
    }

    #[test]
    fn test_add_connection_needs_three_nodes() {
        let config = NeatConfig::new(1, 1);
        let mut ctx = EvolutionContext::new();
        let mut rng = test_rng();
        let mut genome = Genome::from_parts(
            vec![
                NodeGene::new(0, NodeType::Input),
                NodeGene::new(1, NodeType::Output),
            ],
            vec![],
            1,
            1,
            config.hidden_activation,
            config.output_activation,
        )
        .unwrap();
        assert!(!genome.mutate_add_connection(&mut ctx, &config, &mut rng).unwrap());
    }

    #[test]
    fn test_remove_connection_guard() {
        let (mut genome, _, config) = setup();
        let mut rng = test_rng();
        assert!(genome.mutate_remove_connection(&config, &mut rng).unwrap());
        assert_eq!(genome.connections().len(), 1);
        assert!(!genome.mutate_remove_connection(&config, &mut rng).unwrap());
        assert_eq!(genome.connections().len(), 1);
    }

    #[test]
    fn test_mutate_many_times_stays_well_formed() {
        let (mut genome, mut ctx, config) = setup();
        let mut rng = test_rng();
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let kind = genome.mutate(&mut ctx, &config, &mut rng).unwrap();
            seen.insert(kind);
            assert_well_formed(&genome);
            assert!(genome.evaluate(&[0.5, -0.5]).unwrap()[0].is_finite());
        }
        assert!(seen.contains(&MutationKind::AddNode));
        assert!(seen.contains(&MutationKind::ModifyWeights));
    }
}
