//! NEAT genome: sorted node and connection genes plus a derived layering.
//!
//! A [`Genome`] keeps both gene collections in [`GeneList`]s, so they stay
//! strictly ascending by innovation ID. Each node also tracks its incident
//! connections by ID, which lets the cycle test and the remove-connection
//! mutation walk the graph without scanning every connection.
//!
//! Evaluation walks the layers computed by [`Genome::rebuild_layers`]:
//! layer 0 holds every node without incoming enabled connections, and every
//! other node sits one layer past its deepest predecessor.

use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

use crate::activation::Activation;
use crate::config::NeatConfig;
use crate::crossover::correlate;
use crate::gene::{ConnectionGene, InnovationId, NodeGene, NodeType};
use crate::gene_list::GeneList;
use crate::innovation::EvolutionContext;
use crate::speciation::CoordinateVector;
use crate::topology::{self, SourceGraph};

new_key_type! {
    /// Arena key for a genome held by a population.
    pub struct GenomeId;
}

/// Invalid operations on a genome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenomeError {
    /// The input vector does not match the genome's input count.
    #[error("expected {expected} inputs, got {actual}")]
    InputLengthMismatch { expected: usize, actual: usize },
    /// No gene with this innovation ID exists.
    #[error("no gene with innovation id {0}")]
    UnknownGene(InnovationId),
    /// A gene with this innovation ID already exists.
    #[error("duplicate gene with innovation id {0}")]
    DuplicateGene(InnovationId),
    /// The genome already connects these two nodes.
    #[error("connection {from} -> {to} already exists")]
    DuplicateEdge { from: InnovationId, to: InnovationId },
    /// A connection would end at an input or bias node.
    #[error("connection {from} -> {to} enters an input or bias node")]
    InvalidTarget { from: InnovationId, to: InnovationId },
    /// The enabled connections contain a directed cycle.
    #[error("genome topology contains a cycle")]
    CyclicTopology,
    /// The node genes disagree with the declared interface.
    #[error("expected {expected} {node_type:?} nodes, found {actual}")]
    NodeCountMismatch {
        node_type: NodeType,
        expected: usize,
        actual: usize,
    },
}

/// A NEAT genome representing a feed-forward neural network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genome {
    pub(crate) nodes: GeneList<NodeGene>,
    pub(crate) connections: GeneList<ConnectionGene>,
    input_count: usize,
    output_count: usize,
    hidden_activation: Activation,
    output_activation: Activation,
    /// Externally assigned fitness. Higher is better.
    pub fitness: f64,
    /// Generation in which this genome was created.
    pub birth_generation: u64,
    /// Node indices grouped by depth, ascending by innovation ID within a layer.
    #[serde(skip)]
    layers: Vec<Vec<usize>>,
    #[serde(skip)]
    position: OnceLock<CoordinateVector>,
}

impl Genome {
    /// Create a minimal genome: inputs, one bias node, outputs, and one
    /// connection from every input to every output.
    ///
    /// IDs are minted from `ctx` in exactly that order, and the initial
    /// connections are recorded in the connection registry.
    ///
    /// # Errors
    ///
    /// Only fails if `ctx` hands out an ID that is already in use.
    pub fn new<R: Rng>(
        config: &NeatConfig,
        ctx: &mut EvolutionContext,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        let mut nodes = GeneList::with_capacity(config.num_inputs + config.num_outputs + 1);

        let input_ids: Vec<InnovationId> = (0..config.num_inputs).map(|_| ctx.next_id()).collect();
        for &id in &input_ids {
            nodes.insert(NodeGene::new(id, NodeType::Input))?;
        }
        nodes.insert(NodeGene::new(ctx.next_id(), NodeType::Bias))?;
        let output_ids: Vec<InnovationId> =
            (0..config.num_outputs).map(|_| ctx.next_id()).collect();
        for &id in &output_ids {
            nodes.insert(NodeGene::new(id, NodeType::Output))?;
        }

        let mut genome = Self {
            nodes,
            connections: GeneList::with_capacity(config.num_inputs * config.num_outputs),
            input_count: config.num_inputs,
            output_count: config.num_outputs,
            hidden_activation: config.hidden_activation,
            output_activation: config.output_activation,
            fitness: 0.0,
            birth_generation: 0,
            layers: Vec::new(),
            position: OnceLock::new(),
        };

        let range = config.initial_weight_range;
        for &source in &input_ids {
            for &target in &output_ids {
                let id = ctx.connection_innovation(source, target);
                let weight = rng.random_range(-range..=range);
                genome.insert_connection(ConnectionGene::new(id, source, target, weight))?;
            }
        }

        genome.rebuild_layers()?;
        Ok(genome)
    }

    /// Assemble a genome from raw genes.
    ///
    /// Node connectivity sets are recomputed from the connections, so any
    /// adjacency data on the incoming nodes is ignored.
    ///
    /// # Errors
    ///
    /// Fails on duplicate IDs or edges, dangling endpoints, edges into input
    /// or bias nodes, input/output counts that disagree with the node types,
    /// or a cyclic topology.
    pub fn from_parts(
        nodes: Vec<NodeGene>,
        connections: Vec<ConnectionGene>,
        input_count: usize,
        output_count: usize,
        hidden_activation: Activation,
        output_activation: Activation,
    ) -> Result<Self, GenomeError> {
        let nodes = GeneList::from_unsorted(nodes.iter().map(NodeGene::detached).collect())?;
        for (node_type, expected) in [
            (NodeType::Input, input_count),
            (NodeType::Output, output_count),
        ] {
            let actual = nodes.iter().filter(|n| n.node_type == node_type).count();
            if actual != expected {
                return Err(GenomeError::NodeCountMismatch {
                    node_type,
                    expected,
                    actual,
                });
            }
        }

        let mut genome = Self {
            nodes,
            connections: GeneList::with_capacity(connections.len()),
            input_count,
            output_count,
            hidden_activation,
            output_activation,
            fitness: 0.0,
            birth_generation: 0,
            layers: Vec::new(),
            position: OnceLock::new(),
        };
        for connection in connections {
            genome.insert_connection(connection)?;
        }

        if genome.has_cycle() {
            return Err(GenomeError::CyclicTopology);
        }
        genome.rebuild_layers()?;
        Ok(genome)
    }

    /// Node genes, ascending by innovation ID.
    #[must_use]
    pub fn nodes(&self) -> &GeneList<NodeGene> {
        &self.nodes
    }

    /// Connection genes, ascending by innovation ID.
    #[must_use]
    pub fn connections(&self) -> &GeneList<ConnectionGene> {
        &self.connections
    }

    /// Number of input nodes.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Number of output nodes.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Activation applied by hidden nodes.
    #[must_use]
    pub fn hidden_activation(&self) -> Activation {
        self.hidden_activation
    }

    /// Activation applied by output nodes.
    #[must_use]
    pub fn output_activation(&self) -> Activation {
        self.output_activation
    }

    /// Node count plus connection count.
    #[must_use]
    pub fn complexity(&self) -> usize {
        self.nodes.len() + self.connections.len()
    }

    /// Node indices grouped by evaluation layer.
    #[must_use]
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Whether some connection already runs from `source` to `target`.
    #[must_use]
    pub fn contains_edge(&self, source: InnovationId, target: InnovationId) -> bool {
        self.nodes.get(source).is_some_and(|node| {
            node.output_connections.iter().any(|&id| {
                self.connections
                    .get(id)
                    .is_some_and(|conn| conn.target == target)
            })
        })
    }

    /// Whether the connections, enabled or not, contain a directed cycle.
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        topology::has_cycle(
            &self.nodes,
            self.connections.iter().map(ConnectionGene::endpoints),
        )
    }

    /// Redraw every connection weight uniformly from `[-range, range]`.
    pub fn randomize_weights<R: Rng>(&mut self, range: f64, rng: &mut R) {
        for connection in self.connections.iter_mut() {
            connection.weight = rng.random_range(-range..=range);
        }
        self.invalidate_position();
    }

    /// Add a node gene with no connections. Cached layers are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::DuplicateGene`] if the ID is taken.
    pub fn insert_node(&mut self, node: NodeGene) -> Result<(), GenomeError> {
        self.nodes.insert(node.detached())?;
        self.layers.clear();
        Ok(())
    }

    /// Add a connection gene and register it with both endpoint nodes.
    ///
    /// Cached layers are dropped and rebuilt on the next evaluation, or
    /// eagerly through [`rebuild_layers`](Self::rebuild_layers).
    ///
    /// # Errors
    ///
    /// Fails if either endpoint is missing, the target is an input or bias
    /// node, the edge already exists, or the ID is taken.
    pub fn insert_connection(&mut self, connection: ConnectionGene) -> Result<(), GenomeError> {
        let (source, target) = connection.endpoints();
        if !self.nodes.contains(source) {
            return Err(GenomeError::UnknownGene(source));
        }
        match self.nodes.get(target) {
            None => return Err(GenomeError::UnknownGene(target)),
            Some(node) if node.node_type.is_source_only() => {
                return Err(GenomeError::InvalidTarget {
                    from: source,
                    to: target,
                });
            }
            Some(_) => {}
        }
        if self.contains_edge(source, target) {
            return Err(GenomeError::DuplicateEdge {
                from: source,
                to: target,
            });
        }

        let id = connection.innovation;
        self.connections.insert(connection)?;
        if let Some(node) = self.nodes.get_mut(source) {
            node.output_connections.insert(id);
        }
        if let Some(node) = self.nodes.get_mut(target) {
            node.input_connections.insert(id);
        }
        self.layers.clear();
        self.invalidate_position();
        Ok(())
    }

    /// Remove a connection gene, detach it from its endpoints, and drop any
    /// hidden endpoint left without connections.
    ///
    /// Cached layers are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::UnknownGene`] if no such connection exists.
    pub fn remove_connection(&mut self, id: InnovationId) -> Result<ConnectionGene, GenomeError> {
        let removed = self.detach_connection(id)?;
        for endpoint in [removed.source, removed.target] {
            if self.nodes.get(endpoint).is_some_and(NodeGene::is_redundant) {
                self.nodes.remove(endpoint)?;
            }
        }
        Ok(removed)
    }

    /// Remove a connection gene and unregister it from its endpoints,
    /// leaving the endpoint nodes in place.
    pub(crate) fn detach_connection(
        &mut self,
        id: InnovationId,
    ) -> Result<ConnectionGene, GenomeError> {
        let removed = self.connections.remove(id)?;
        if let Some(node) = self.nodes.get_mut(removed.source) {
            node.output_connections.remove(&id);
        }
        if let Some(node) = self.nodes.get_mut(removed.target) {
            node.input_connections.remove(&id);
        }
        self.layers.clear();
        self.invalidate_position();
        Ok(removed)
    }

    /// Recompute node depths and evaluation layers from the enabled
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::CyclicTopology`] if the enabled connections
    /// contain a cycle.
    pub fn rebuild_layers(&mut self) -> Result<(), GenomeError> {
        let depths = topology::longest_path_depths(
            &self.nodes,
            self.connections
                .iter()
                .filter(|conn| conn.enabled)
                .map(ConnectionGene::endpoints),
        )
        .ok_or(GenomeError::CyclicTopology)?;

        let layer_count = depths.iter().max().map_or(0, |&deepest| deepest + 1);
        let mut layers = vec![Vec::new(); layer_count];
        // Node indices are visited in ascending order, so every layer comes
        // out sorted by innovation ID.
        for (index, &depth) in depths.iter().enumerate() {
            layers[depth].push(index);
            self.nodes[index].depth = depth;
        }
        self.layers = layers;
        Ok(())
    }

    /// Run a feed-forward pass and return output activations in output
    /// node order.
    ///
    /// Input nodes take the input vector in ascending ID order, the bias node
    /// emits 1, and every other node applies its activation to the weighted
    /// sum of its enabled incoming connections.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::InputLengthMismatch`] if `inputs` has the wrong
    /// length.
    pub fn evaluate(&mut self, inputs: &[f64]) -> Result<Vec<f64>, GenomeError> {
        if inputs.len() != self.input_count {
            return Err(GenomeError::InputLengthMismatch {
                expected: self.input_count,
                actual: inputs.len(),
            });
        }
        if self.layers.is_empty() && !self.nodes.is_empty() {
            self.rebuild_layers()?;
        }

        for node in self.nodes.iter_mut() {
            node.activation_sum = 0.0;
        }

        let mut next_input = inputs.iter();
        for layer in &self.layers {
            for &index in layer {
                let node = &self.nodes[index];
                let value = match node.node_type {
                    NodeType::Input => next_input.next().copied().unwrap_or(0.0),
                    NodeType::Bias => 1.0,
                    NodeType::Hidden | NodeType::Output => {
                        let sum: f64 = node
                            .input_connections
                            .iter()
                            .filter_map(|&id| self.connections.get(id))
                            .filter(|conn| conn.enabled)
                            .map(|conn| {
                                let source = self
                                    .nodes
                                    .get(conn.source)
                                    .map_or(0.0, |src| src.activation_sum);
                                conn.weight * source
                            })
                            .sum();
                        if node.node_type == NodeType::Output {
                            self.output_activation.apply(sum)
                        } else {
                            self.hidden_activation.apply(sum)
                        }
                    }
                };
                self.nodes[index].activation_sum = value;
            }
        }

        Ok(self
            .nodes
            .iter()
            .filter(|node| node.node_type == NodeType::Output)
            .map(|node| node.activation_sum)
            .collect())
    }

    /// This genome's position in genetic space: its `(innovation, weight)`
    /// pairs, computed on first use and cached until the next change.
    pub fn position(&self) -> &CoordinateVector {
        self.position
            .get_or_init(|| CoordinateVector::from_connections(self.connections.as_slice()))
    }

    /// Drop the cached position after weights or structure change.
    pub(crate) fn invalidate_position(&mut self) {
        self.position.take();
    }

    /// Classic NEAT compatibility distance `c1*E/N + c2*D/N + c3*W`.
    ///
    /// `N` is the larger connection count (at least 1) and `W` the mean
    /// absolute weight difference of matching genes.
    #[must_use]
    pub fn compatibility_distance(&self, other: &Self, config: &NeatConfig) -> f64 {
        let stats = correlate(self.connections.as_slice(), other.connections.as_slice()).stats;
        let n = self.connections.len().max(other.connections.len()).max(1) as f64;
        let mean_weight_delta = if stats.matching > 0 {
            stats.weight_delta / stats.matching as f64
        } else {
            0.0
        };

        config.compatibility_excess_coeff * stats.excess as f64 / n
            + config.compatibility_disjoint_coeff * stats.disjoint as f64 / n
            + config.compatibility_weight_coeff * mean_weight_delta
    }
}

impl SourceGraph for Genome {
    fn contains_node(&self, node: InnovationId) -> bool {
        self.nodes.contains(node)
    }

    fn push_sources(&self, node: InnovationId, stack: &mut Vec<InnovationId>) {
        if let Some(node) = self.nodes.get(node) {
            stack.extend(
                node.input_connections
                    .iter()
                    .filter_map(|&id| self.connections.get(id))
                    .map(|conn| conn.source),
            );
        }
    }
}
