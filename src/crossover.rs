//! Gene correlation and crossover.
//!
//! [`correlate`] aligns two innovation-sorted connection lists in a single
//! linear merge, tagging every gene as matching, disjoint or excess. The
//! same pass yields the statistics used for compatibility distance.
//!
//! [`Genome::create_offspring`] builds a child from a correlation: matching
//! genes come from either parent at random, genes unique to the fitter
//! parent are always inherited, and genes unique to the other parent are
//! inherited occasionally, and only if they keep the child acyclic.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::NeatConfig;
use crate::gene::{ConnectionGene, InnovationId, NodeGene, NodeType};
use crate::genome::{Genome, GenomeError};
use crate::topology::{would_create_cycle, SourceGraph};

/// How a gene lines up against the other genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationKind {
    /// Both genomes carry this innovation.
    Match,
    /// Only one genome carries it, inside the other's ID range.
    Disjoint,
    /// Only one genome carries it, beyond the other's highest ID.
    Excess,
}

/// One aligned innovation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationItem<'a> {
    /// Classification of this innovation.
    pub kind: CorrelationKind,
    /// The gene from the first genome, if present.
    pub gene1: Option<&'a ConnectionGene>,
    /// The gene from the second genome, if present.
    pub gene2: Option<&'a ConnectionGene>,
}

impl CorrelationItem<'_> {
    /// Innovation ID of this item.
    #[must_use]
    pub fn innovation(&self) -> InnovationId {
        self.gene1
            .or(self.gene2)
            .map_or(InnovationId::MAX, |gene| gene.innovation)
    }
}

/// Aggregate counts from a correlation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationStatistics {
    /// Innovations present in both genomes.
    pub matching: usize,
    /// Innovations present in one genome within the other's ID range.
    pub disjoint: usize,
    /// Innovations present in one genome beyond the other's ID range.
    pub excess: usize,
    /// Sum of `|w1 - w2|` over matching genes.
    pub weight_delta: f64,
}

/// Aligned genes in ascending innovation order, plus statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationResult<'a> {
    /// One entry per distinct innovation.
    pub items: Vec<CorrelationItem<'a>>,
    /// Counts and weight delta.
    pub stats: CorrelationStatistics,
}

impl CorrelationResult<'_> {
    /// Check that the items agree with the statistics and with their tags.
    #[must_use]
    pub fn integrity_check(&self) -> bool {
        let mut counts = CorrelationStatistics::default();
        let mut previous: Option<InnovationId> = None;

        for item in &self.items {
            match (item.kind, item.gene1, item.gene2) {
                (CorrelationKind::Match, Some(a), Some(b)) => {
                    if a.innovation != b.innovation {
                        return false;
                    }
                    counts.matching += 1;
                    counts.weight_delta += (a.weight - b.weight).abs();
                }
                (CorrelationKind::Disjoint, Some(_), None)
                | (CorrelationKind::Disjoint, None, Some(_)) => counts.disjoint += 1,
                (CorrelationKind::Excess, Some(_), None)
                | (CorrelationKind::Excess, None, Some(_)) => counts.excess += 1,
                _ => return false,
            }

            let id = item.innovation();
            if previous.is_some_and(|prev| prev >= id) {
                return false;
            }
            previous = Some(id);
        }

        counts.matching == self.stats.matching
            && counts.disjoint == self.stats.disjoint
            && counts.excess == self.stats.excess
            && (counts.weight_delta - self.stats.weight_delta).abs() <= 1e-9
    }
}

/// Align two connection lists, each ascending by innovation ID.
#[must_use]
pub fn correlate<'a>(a: &'a [ConnectionGene], b: &'a [ConnectionGene]) -> CorrelationResult<'a> {
    let mut result = CorrelationResult {
        items: Vec::with_capacity(a.len().max(b.len())),
        stats: CorrelationStatistics::default(),
    };
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (gene_a, gene_b) = (&a[i], &b[j]);
        if gene_a.innovation == gene_b.innovation {
            result.stats.matching += 1;
            result.stats.weight_delta += (gene_a.weight - gene_b.weight).abs();
            result.items.push(CorrelationItem {
                kind: CorrelationKind::Match,
                gene1: Some(gene_a),
                gene2: Some(gene_b),
            });
            i += 1;
            j += 1;
        } else if gene_b.innovation < gene_a.innovation {
            result.stats.disjoint += 1;
            result.items.push(CorrelationItem {
                kind: CorrelationKind::Disjoint,
                gene1: None,
                gene2: Some(gene_b),
            });
            j += 1;
        } else {
            result.stats.disjoint += 1;
            result.items.push(CorrelationItem {
                kind: CorrelationKind::Disjoint,
                gene1: Some(gene_a),
                gene2: None,
            });
            i += 1;
        }
    }

    for gene in &a[i..] {
        result.stats.excess += 1;
        result.items.push(CorrelationItem {
            kind: CorrelationKind::Excess,
            gene1: Some(gene),
            gene2: None,
        });
    }
    for gene in &b[j..] {
        result.stats.excess += 1;
        result.items.push(CorrelationItem {
            kind: CorrelationKind::Excess,
            gene1: None,
            gene2: Some(gene),
        });
    }

    result
}

/// Child genome under construction.
///
/// Connections are deduplicated by endpoints, and node genes are copied in
/// from a parent the first time one of their IDs is referenced.
#[derive(Debug, Default)]
struct OffspringBuilder {
    nodes: BTreeMap<InnovationId, NodeGene>,
    connections: BTreeMap<InnovationId, ConnectionGene>,
    edges: HashMap<(InnovationId, InnovationId), InnovationId>,
}

impl OffspringBuilder {
    /// Start with every input, bias and output node of `parent`.
    fn seeded_from(parent: &Genome) -> Self {
        let mut builder = Self::default();
        for node in parent.nodes() {
            if node.node_type != NodeType::Hidden {
                builder.nodes.insert(node.innovation, node.detached());
            }
        }
        builder
    }

    /// Add `gene`, copying missing hidden endpoint nodes from `parent`.
    ///
    /// If the child already connects the same endpoints the existing gene
    /// keeps its ID; with `overwrite` it takes this gene's weight and enabled
    /// flag, otherwise the call is a no-op. A gene touching an input, bias or
    /// output node the child does not already have is skipped, so the child
    /// keeps the fitter parent's interface. Returns whether anything changed.
    fn try_add_gene(&mut self, gene: &ConnectionGene, parent: &Genome, overwrite: bool) -> bool {
        let endpoints = gene.endpoints();
        let existing = self
            .edges
            .get(&endpoints)
            .copied()
            .or_else(|| self.connections.contains_key(&gene.innovation).then_some(gene.innovation));
        if let Some(id) = existing {
            if !overwrite {
                return false;
            }
            return match self.connections.get_mut(&id) {
                Some(current) => {
                    current.weight = gene.weight;
                    current.enabled = gene.enabled;
                    true
                }
                None => false,
            };
        }

        let mut missing = Vec::with_capacity(2);
        for endpoint in [gene.source, gene.target] {
            if self.nodes.contains_key(&endpoint) {
                continue;
            }
            match parent.nodes().get(endpoint) {
                Some(node) if node.node_type == NodeType::Hidden => missing.push(node.detached()),
                _ => return false,
            }
        }
        for node in missing {
            self.nodes.insert(node.innovation, node);
        }

        if let Some(node) = self.nodes.get_mut(&gene.source) {
            node.output_connections.insert(gene.innovation);
        }
        if let Some(node) = self.nodes.get_mut(&gene.target) {
            node.input_connections.insert(gene.innovation);
        }
        self.edges.insert(endpoints, gene.innovation);
        self.connections.insert(gene.innovation, gene.clone());
        true
    }

    fn build(self, template: &Genome) -> Result<Genome, GenomeError> {
        Genome::from_parts(
            self.nodes.into_values().collect(),
            self.connections.into_values().collect(),
            template.input_count(),
            template.output_count(),
            template.hidden_activation(),
            template.output_activation(),
        )
    }
}

impl SourceGraph for OffspringBuilder {
    fn contains_node(&self, node: InnovationId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn push_sources(&self, node: InnovationId, stack: &mut Vec<InnovationId>) {
        if let Some(node) = self.nodes.get(&node) {
            stack.extend(
                node.input_connections
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .map(|conn| conn.source),
            );
        }
    }
}

impl Genome {
    /// Sexual reproduction with `other`.
    ///
    /// The fitter parent (`self` on ties) contributes its full topology;
    /// matching genes are copied as-is from either parent at random. Genes
    /// only the less fit parent has are added when they do not close a cycle
    /// (gated by `secondary_parent_gene_probability`, 1.0 by default).
    ///
    /// The child has zero fitness and birth generation 0.
    ///
    /// # Errors
    ///
    /// Only fails if a parent's internal bookkeeping is inconsistent.
    pub fn create_offspring<R: Rng>(
        &self,
        other: &Self,
        config: &NeatConfig,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        let (fitter, weaker) = if self.fitness >= other.fitness {
            (self, other)
        } else {
            (other, self)
        };

        let correlation = correlate(
            fitter.connections().as_slice(),
            weaker.connections().as_slice(),
        );
        let mut builder = OffspringBuilder::seeded_from(fitter);
        let mut deferred = Vec::new();

        for item in &correlation.items {
            match (item.kind, item.gene1, item.gene2) {
                (CorrelationKind::Match, Some(a), Some(b)) => {
                    let chosen = if rng.random_bool(0.5) { a } else { b };
                    builder.try_add_gene(chosen, fitter, true);
                }
                (_, Some(gene), None) => {
                    builder.try_add_gene(gene, fitter, false);
                }
                (_, None, Some(gene)) => deferred.push(gene),
                _ => {}
            }
        }

        for gene in deferred {
            if rng.random::<f64>() < config.secondary_parent_gene_probability
                && !would_create_cycle(&builder, gene.source, gene.target)
            {
                builder.try_add_gene(gene, weaker, false);
            }
        }

        builder.build(fitter)
    }

    /// Asexual reproduction: a copy with fitness reset.
    #[must_use]
    pub fn create_asexual_offspring(&self) -> Self {
        let mut child = self.clone();
        child.fitness = 0.0;
        child.birth_generation = 0;
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::innovation::EvolutionContext;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    fn genes(ids: &[InnovationId]) -> Vec<ConnectionGene> {
        ids.iter()
            .map(|&id| ConnectionGene::new(id, id, id + 100, id as f64))
            .collect()
    }

    fn genome(
        hidden: &[InnovationId],
        connections: &[(InnovationId, InnovationId, InnovationId)],
        fitness: f64,
    ) -> Genome {
        let mut nodes = vec![
            NodeGene::new(0, NodeType::Input),
            NodeGene::new(1, NodeType::Bias),
            NodeGene::new(2, NodeType::Output),
        ];
        nodes.extend(hidden.iter().map(|&id| NodeGene::new(id, NodeType::Hidden)));
        let mut genome = Genome::from_parts(
            nodes,
            connections
                .iter()
                .map(|&(id, src, dst)| ConnectionGene::new(id, src, dst, id as f64 / 10.0))
                .collect(),
            1,
            1,
            Activation::Tanh,
            Activation::Tanh,
        )
        .unwrap();
        genome.fitness = fitness;
        genome
    }

    #[test]
    fn test_correlation_scenario() {
        let a = genes(&[0, 1, 3, 5]);
        let b = genes(&[0, 2, 3, 4]);
        let result = correlate(&a, &b);

        let summary: Vec<_> = result
            .items
            .iter()
            .map(|item| (item.innovation(), item.kind, item.gene1.is_some()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, CorrelationKind::Match, true),
                (1, CorrelationKind::Disjoint, true),
                (2, CorrelationKind::Disjoint, false),
                (3, CorrelationKind::Match, true),
                (4, CorrelationKind::Disjoint, false),
                (5, CorrelationKind::Excess, true),
            ]
        );
        assert_eq!(result.stats.matching, 2);
        assert_eq!(result.stats.disjoint, 3);
        assert_eq!(result.stats.excess, 1);
        assert!(result.integrity_check());
    }

    #[test]
    fn test_correlation_is_symmetric() {
        let a = genes(&[0, 1, 3, 5, 9]);
        let b = genes(&[0, 2, 3, 4]);
        let ab = correlate(&a, &b);
        let ba = correlate(&b, &a);

        assert_eq!(ab.stats.matching, ba.stats.matching);
        assert_eq!(ab.stats.disjoint, ba.stats.disjoint);
        assert_eq!(ab.stats.excess, ba.stats.excess);
        let kinds = |r: &CorrelationResult<'_>| {
            r.items
                .iter()
                .map(|item| (item.innovation(), item.kind))
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds(&ab), kinds(&ba));
    }

    #[test]
    fn test_correlation_of_empty_lists() {
        let result = correlate(&[], &[]);
        assert!(result.items.is_empty());
        assert_eq!(result.stats, CorrelationStatistics::default());

        let a = genes(&[3, 4]);
        let one_sided = correlate(&a, &[]);
        assert_eq!(one_sided.stats.excess, 2);
        assert!(one_sided.integrity_check());
    }

    #[test]
    fn test_integrity_check_catches_bad_stats() {
        let a = genes(&[0, 1]);
        let b = genes(&[0]);
        let mut result = correlate(&a, &b);
        result.stats.excess = 5;
        assert!(!result.integrity_check());
    }

    #[test]
    fn test_offspring_of_clones_keeps_structure() {
        let mut ctx = EvolutionContext::new();
        let mut rng = test_rng();
        let config = NeatConfig::new(3, 2);
        let parent = Genome::new(&config, &mut ctx, &mut rng).unwrap();
        let child = parent.create_offspring(&parent.clone(), &config, &mut rng).unwrap();
        assert_eq!(
            child.connections().ids().collect::<Vec<_>>(),
            parent.connections().ids().collect::<Vec<_>>()
        );
        assert_eq!(child.nodes().len(), parent.nodes().len());
    }

    #[test]
    fn test_fitter_parent_topology_without_secondary_genes() {
        let fitter = genome(&[10], &[(3, 0, 2), (11, 0, 10), (12, 10, 2)], 2.0);
        let weaker = genome(&[20], &[(3, 0, 2), (21, 1, 20), (22, 20, 2)], 1.0);
        let config = NeatConfig {
            secondary_parent_gene_probability: 0.0,
            ..NeatConfig::new(1, 1)
        };

        // Argument order must not matter.
        let child = weaker.create_offspring(&fitter, &config, &mut test_rng()).unwrap();
        assert_eq!(child.connections().ids().collect::<Vec<_>>(), vec![3, 11, 12]);
        assert!(child.nodes().contains(1), "bias is kept even when unconnected");
        assert!(!child.nodes().contains(20));
    }

    #[test]
    fn test_secondary_genes_inherited_when_acyclic() {
        let fitter = genome(&[10], &[(3, 0, 2), (11, 0, 10), (12, 10, 2)], 2.0);
        let weaker = genome(&[20], &[(3, 0, 2), (21, 1, 20), (22, 20, 2)], 1.0);
        let config = NeatConfig {
            secondary_parent_gene_probability: 1.0,
            ..NeatConfig::new(1, 1)
        };

        let child = fitter.create_offspring(&weaker, &config, &mut test_rng()).unwrap();
        assert_eq!(
            child.connections().ids().collect::<Vec<_>>(),
            vec![3, 11, 12, 21, 22]
        );
        assert!(child.nodes().contains(20));
    }

    #[test]
    fn test_secondary_gene_rejected_when_cyclic() {
        // Fitter: 0 -> 10 -> 11 -> 2. Weaker adds 11 -> 10, which would close a loop.
        let fitter = genome(&[10, 11], &[(5, 0, 10), (6, 10, 11), (7, 11, 2)], 2.0);
        let weaker = genome(&[10, 11], &[(5, 0, 10), (7, 11, 2), (8, 11, 10)], 1.0);
        let config = NeatConfig {
            secondary_parent_gene_probability: 1.0,
            ..NeatConfig::new(1, 1)
        };

        let child = fitter.create_offspring(&weaker, &config, &mut test_rng()).unwrap();
        assert!(!child.connections().contains(8));
        assert!(!child.has_cycle());
    }

    #[test]
    fn test_duplicate_endpoints_deduplicated() {
        // Same edge 0 -> 2 under two different IDs.
        let fitter = genome(&[], &[(3, 0, 2)], 2.0);
        let weaker = genome(&[], &[(9, 0, 2)], 1.0);
        let config = NeatConfig {
            secondary_parent_gene_probability: 1.0,
            ..NeatConfig::new(1, 1)
        };

        let child = fitter.create_offspring(&weaker, &config, &mut test_rng()).unwrap();
        assert_eq!(child.connections().ids().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_matching_gene_copied_as_is() {
        let mut a = genome(&[], &[(3, 0, 2)], 1.0);
        {
            let gene = a.connections.get_mut(3).unwrap();
            gene.enabled = false;
            gene.weight = 0.5;
        }
        let mut b = genome(&[], &[(3, 0, 2)], 1.0);
        b.connections.get_mut(3).unwrap().weight = -0.5;

        let config = NeatConfig::new(1, 1);
        let mut rng = test_rng();
        let mut seen = (false, false);
        for _ in 0..64 {
            let child = a.create_offspring(&b, &config, &mut rng).unwrap();
            let gene = child.connections().get(3).unwrap();
            if gene.weight == 0.5 {
                assert!(!gene.enabled);
                seen.0 = true;
            } else {
                assert_eq!(gene.weight, -0.5);
                assert!(gene.enabled);
                seen.1 = true;
            }
        }
        assert_eq!(seen, (true, true));
    }

    #[test]
    fn test_acyclic_secondary_genes_inherited_by_default() {
        let fitter = genome(&[10], &[(3, 0, 2), (11, 0, 10), (12, 10, 2)], 1.0);
        let weaker = genome(&[20], &[(3, 0, 2), (21, 1, 20), (22, 20, 2)], 0.0);
        let config = NeatConfig::new(1, 1);
        let mut rng = test_rng();

        for _ in 0..100 {
            let child = fitter.create_offspring(&weaker, &config, &mut rng).unwrap();
            assert!(child.connections().contains(21));
            assert!(child.connections().contains(22));
            assert!(child.nodes().contains(20));
        }
    }

    #[test]
    fn test_independently_initialized_parents_keep_interface() {
        let config = NeatConfig::new(2, 1);
        let mut ctx = EvolutionContext::new();
        let mut rng = test_rng();
        let mut a = Genome::new(&config, &mut ctx, &mut rng).unwrap();
        let mut b = Genome::new(&config, &mut ctx, &mut rng).unwrap();
        for _ in 0..5 {
            a.mutate(&mut ctx, &config, &mut rng).unwrap();
            b.mutate(&mut ctx, &config, &mut rng).unwrap();
        }
        a.fitness = 2.0;
        b.fitness = 1.0;

        for (fitter, weaker) in [(&a, &b), (&b, &a)] {
            let child = weaker.create_offspring(fitter, &config, &mut rng).unwrap();
            assert_eq!(child.input_count(), config.num_inputs);
            assert_eq!(child.output_count(), config.num_outputs);
            let count = |node_type: NodeType| {
                child
                    .nodes()
                    .iter()
                    .filter(|node| node.node_type == node_type)
                    .count()
            };
            assert_eq!(count(NodeType::Input), config.num_inputs);
            assert_eq!(count(NodeType::Bias), 1);
            assert_eq!(count(NodeType::Output), config.num_outputs);
            assert!(!child.has_cycle());
        }
    }

    #[test]
    fn test_asexual_offspring_resets_fitness() {
        let parent = genome(&[], &[(3, 0, 2)], 5.0);
        let child = parent.create_asexual_offspring();
        assert_eq!(child.fitness, 0.0);
        assert_eq!(child.connections(), parent.connections());
    }
}
