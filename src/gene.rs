//! Gene types for NEAT genomes.
//!
//! This module defines the fundamental building blocks of NEAT networks:
//! - [`NodeGene`]: Represents neurons in the network
//! - [`ConnectionGene`]: Represents weighted connections between nodes
//!
//! Both gene kinds are identified by an [`InnovationId`] drawn from the
//! population's shared counter, so genes that share an ID across genomes
//! describe the same historical mutation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Globally unique, monotonically assigned gene identifier.
pub type InnovationId = u64;

/// Anything stored in a [`GeneList`](crate::gene_list::GeneList).
pub trait Gene {
    /// The innovation ID that orders this gene within its list.
    fn innovation(&self) -> InnovationId;
}

/// The type/role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Input node - receives external values, no activation applied.
    Input,
    /// Output node - produces final network output.
    Output,
    /// Hidden node - internal processing node added through mutation.
    Hidden,
    /// Bias node - always outputs 1.0.
    Bias,
}

impl NodeType {
    /// Input and bias nodes are seeded directly and never receive connections.
    #[inline]
    #[must_use]
    pub const fn is_source_only(self) -> bool {
        matches!(self, Self::Input | Self::Bias)
    }
}

/// A node gene representing a neuron in the NEAT network.
///
/// Connectivity is tracked by connection innovation ID in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    /// Innovation ID of this node.
    pub innovation: InnovationId,
    /// The type/role of this node in the network.
    pub node_type: NodeType,
    /// Connections (by innovation ID) that feed into this node.
    pub input_connections: BTreeSet<InnovationId>,
    /// Connections (by innovation ID) that leave this node.
    pub output_connections: BTreeSet<InnovationId>,
    /// Longest-path distance from any input/bias node. Rebuilt with the layers.
    #[serde(skip)]
    pub depth: usize,
    /// Activation accumulator, reset at the start of each evaluation.
    #[serde(skip)]
    pub activation_sum: f64,
}

impl NodeGene {
    /// Create an unconnected node.
    #[must_use]
    pub fn new(innovation: InnovationId, node_type: NodeType) -> Self {
        Self {
            innovation,
            node_type,
            input_connections: BTreeSet::new(),
            output_connections: BTreeSet::new(),
            depth: 0,
            activation_sum: 0.0,
        }
    }

    /// Copy of this node without any connectivity data.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::new(self.innovation, self.node_type)
    }

    /// Total number of incident connections.
    #[inline]
    #[must_use]
    pub fn degree(&self) -> usize {
        self.input_connections.len() + self.output_connections.len()
    }

    /// A hidden node with no remaining connections can be dropped.
    ///
    /// Input, output and bias nodes are never redundant even when unconnected.
    #[must_use]
    pub fn is_redundant(&self) -> bool {
        self.node_type == NodeType::Hidden && self.degree() == 0
    }
}

impl Gene for NodeGene {
    #[inline]
    fn innovation(&self) -> InnovationId {
        self.innovation
    }
}

/// A connection gene representing a weighted link between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    /// Innovation ID of this connection.
    pub innovation: InnovationId,
    /// Innovation ID of the source node.
    pub source: InnovationId,
    /// Innovation ID of the destination node.
    pub target: InnovationId,
    /// The connection weight.
    pub weight: f64,
    /// Whether this connection is active.
    /// Disabled connections are skipped during evaluation but preserved for crossover.
    pub enabled: bool,
}

impl ConnectionGene {
    /// Create a new enabled connection.
    #[must_use]
    pub fn new(
        innovation: InnovationId,
        source: InnovationId,
        target: InnovationId,
        weight: f64,
    ) -> Self {
        Self {
            innovation,
            source,
            target,
            weight,
            enabled: true,
        }
    }

    /// The `(source, target)` pair identifying this edge within a genome.
    #[inline]
    #[must_use]
    pub const fn endpoints(&self) -> (InnovationId, InnovationId) {
        (self.source, self.target)
    }
}

impl Gene for ConnectionGene {
    #[inline]
    fn innovation(&self) -> InnovationId {
        self.innovation
    }
}
