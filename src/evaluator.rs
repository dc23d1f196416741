//! Compiled phenotype for fast repeated evaluation.
//!
//! [`NetworkEvaluator`] flattens a [`Genome`] into topologically ordered
//! arrays with incoming edges in Compressed Sparse Row (CSR) form. Building
//! one only needs `&Genome`, so fitness functions running in parallel can
//! each compile their own copy without touching the population.

use thiserror::Error;

use crate::activation::Activation;
use crate::gene::NodeType;
use crate::genome::Genome;
use crate::topology;

/// Errors from building or running a [`NetworkEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluatorError {
    /// The genome's enabled connections contain a cycle.
    #[error("genome contains cycles; feedforward evaluation requires an acyclic graph")]
    CyclicGenome,
    /// The input slice has the wrong length.
    #[error("expected {expected} inputs, got {actual}")]
    InputLengthMismatch { expected: usize, actual: usize },
    /// The output buffer has the wrong length.
    #[error("expected an output buffer of length {expected}, got {actual}")]
    OutputLengthMismatch { expected: usize, actual: usize },
}

/// A compiled, evaluation-ready feed-forward network.
#[derive(Debug, Clone)]
pub struct NetworkEvaluator {
    /// Node activations, indexed by evaluation position.
    activations: Vec<f64>,
    /// Activation function per position. Unused for inputs and bias.
    activation_fns: Vec<Activation>,
    // For position i, incoming edges live at [csr_offsets[i]..csr_offsets[i+1]).
    /// CSR: source positions for every enabled connection.
    csr_sources: Vec<usize>,
    /// CSR: weights, parallel to `csr_sources`.
    csr_weights: Vec<f64>,
    /// CSR: offsets per position (len = positions + 1).
    csr_offsets: Vec<usize>,
    /// Positions of input nodes in ascending innovation order.
    input_indices: Vec<usize>,
    /// Positions of output nodes in ascending innovation order.
    output_indices: Vec<usize>,
    /// Positions of bias nodes.
    bias_indices: Vec<usize>,
    /// Positions to compute, in order (hidden and output nodes).
    eval_order: Vec<usize>,
}

impl NetworkEvaluator {
    /// Compile `genome`.
    ///
    /// Depths are recomputed from the enabled connections, so a genome whose
    /// cached layers are stale still compiles correctly. Incoming edges are
    /// summed in ascending connection ID, matching [`Genome::evaluate`]
    /// bit for bit.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::CyclicGenome`] if the enabled connections
    /// contain a cycle.
    pub fn try_new(genome: &Genome) -> Result<Self, EvaluatorError> {
        let nodes = genome.nodes();
        let depths = topology::longest_path_depths(
            nodes,
            genome
                .connections()
                .iter()
                .filter(|conn| conn.enabled)
                .map(|conn| conn.endpoints()),
        )
        .ok_or(EvaluatorError::CyclicGenome)?;

        // Evaluation order: by depth, then innovation ID.
        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by_key(|&index| (depths[index], nodes[index].innovation));
        let mut position_of = vec![0usize; nodes.len()];
        for (position, &index) in order.iter().enumerate() {
            position_of[index] = position;
        }

        let mut activation_fns = Vec::with_capacity(order.len());
        let mut input_indices = Vec::with_capacity(genome.input_count());
        let mut output_indices = Vec::with_capacity(genome.output_count());
        let mut bias_indices = Vec::new();
        let mut eval_order = Vec::new();
        let mut csr_offsets = Vec::with_capacity(order.len() + 1);
        let mut csr_sources = Vec::new();
        let mut csr_weights = Vec::new();
        csr_offsets.push(0);

        for (position, &index) in order.iter().enumerate() {
            let node = &nodes[index];
            match node.node_type {
                NodeType::Input => {
                    activation_fns.push(Activation::Identity);
                }
                NodeType::Bias => {
                    activation_fns.push(Activation::Identity);
                    bias_indices.push(position);
                }
                NodeType::Hidden => {
                    activation_fns.push(genome.hidden_activation());
                    eval_order.push(position);
                }
                NodeType::Output => {
                    activation_fns.push(genome.output_activation());
                    eval_order.push(position);
                }
            }

            for conn in node
                .input_connections
                .iter()
                .filter_map(|&id| genome.connections().get(id))
                .filter(|conn| conn.enabled)
            {
                if let Ok(source) = nodes.search(conn.source) {
                    csr_sources.push(position_of[source]);
                    csr_weights.push(conn.weight);
                }
            }
            csr_offsets.push(csr_sources.len());
        }

        // Interface order follows innovation IDs, not depth.
        for (index, node) in nodes.iter().enumerate() {
            match node.node_type {
                NodeType::Input => input_indices.push(position_of[index]),
                NodeType::Output => output_indices.push(position_of[index]),
                _ => {}
            }
        }

        Ok(Self {
            activations: vec![0.0; order.len()],
            activation_fns,
            csr_sources,
            csr_weights,
            csr_offsets,
            input_indices,
            output_indices,
            bias_indices,
            eval_order,
        })
    }

    /// Evaluate the network, writing outputs into a caller-provided buffer.
    ///
    /// # Errors
    ///
    /// Returns a length-mismatch error if `inputs` or `outputs` does not
    /// match the network interface.
    pub fn evaluate_into(
        &mut self,
        inputs: &[f64],
        outputs: &mut [f64],
    ) -> Result<(), EvaluatorError> {
        if inputs.len() != self.input_indices.len() {
            return Err(EvaluatorError::InputLengthMismatch {
                expected: self.input_indices.len(),
                actual: inputs.len(),
            });
        }
        if outputs.len() != self.output_indices.len() {
            return Err(EvaluatorError::OutputLengthMismatch {
                expected: self.output_indices.len(),
                actual: outputs.len(),
            });
        }

        self.activations.fill(0.0);
        for (&index, &value) in self.input_indices.iter().zip(inputs) {
            self.activations[index] = value;
        }
        for &index in &self.bias_indices {
            self.activations[index] = 1.0;
        }

        for &node in &self.eval_order {
            let (start, end) = (self.csr_offsets[node], self.csr_offsets[node + 1]);
            let sum: f64 = (start..end)
                .map(|i| self.activations[self.csr_sources[i]] * self.csr_weights[i])
                .sum();
            self.activations[node] = self.activation_fns[node].apply(sum);
        }

        for (slot, &index) in outputs.iter_mut().zip(&self.output_indices) {
            *slot = self.activations[index];
        }
        Ok(())
    }

    /// Evaluate the network and return its outputs.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluatorError::InputLengthMismatch`] if `inputs` has the
    /// wrong length.
    pub fn evaluate(&mut self, inputs: &[f64]) -> Result<Vec<f64>, EvaluatorError> {
        let mut outputs = vec![0.0; self.output_indices.len()];
        self.evaluate_into(inputs, &mut outputs)?;
        Ok(outputs)
    }

    /// Number of input nodes.
    #[must_use]
    pub fn num_inputs(&self) -> usize {
        self.input_indices.len()
    }

    /// Number of output nodes.
    #[must_use]
    pub fn num_outputs(&self) -> usize {
        self.output_indices.len()
    }

    /// Number of enabled connections compiled in.
    #[must_use]
    pub fn num_connections(&self) -> usize {
        self.csr_sources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeatConfig;
    use crate::innovation::EvolutionContext;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_matches_genome_evaluation() {
        let config = NeatConfig::new(3, 2);
        let mut ctx = EvolutionContext::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(&config, &mut ctx, &mut rng).unwrap();
        for _ in 0..60 {
            genome.mutate(&mut ctx, &config, &mut rng).unwrap();
        }

        let mut evaluator = NetworkEvaluator::try_new(&genome).unwrap();
        for inputs in [[0.0, 0.0, 0.0], [1.0, -0.5, 0.25], [-3.0, 2.0, 10.0]] {
            let compiled = evaluator.evaluate(&inputs).unwrap();
            let direct = genome.evaluate(&inputs).unwrap();
            assert_eq!(compiled, direct);
        }
    }

    #[test]
    fn test_input_length_checked() {
        let config = NeatConfig::new(2, 1);
        let mut ctx = EvolutionContext::new();
        let genome = Genome::new(&config, &mut ctx, &mut test_rng()).unwrap();
        let mut evaluator = NetworkEvaluator::try_new(&genome).unwrap();

        assert_eq!(
            evaluator.evaluate(&[1.0]),
            Err(EvaluatorError::InputLengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        let mut outputs = [0.0; 2];
        assert!(matches!(
            evaluator.evaluate_into(&[1.0, 1.0], &mut outputs),
            Err(EvaluatorError::OutputLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_interface_sizes() {
        let config = NeatConfig::new(4, 3);
        let mut ctx = EvolutionContext::new();
        let genome = Genome::new(&config, &mut ctx, &mut test_rng()).unwrap();
        let evaluator = NetworkEvaluator::try_new(&genome).unwrap();
        assert_eq!(evaluator.num_inputs(), 4);
        assert_eq!(evaluator.num_outputs(), 3);
        assert_eq!(evaluator.num_connections(), 12);
    }
}
