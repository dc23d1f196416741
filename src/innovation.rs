//! Innovation tracking for NEAT.
//!
//! Every node and connection gene receives an ID from one shared counter.
//! Two registries let structural mutations that arise independently in
//! different genomes receive the same IDs, which is what makes crossover
//! alignment meaningful:
//!
//! - **Connections**: `(source_id, target_id) -> connection_id`
//! - **Node splits**: `split_connection_id -> (node_id, input_conn_id, output_conn_id)`
//!
//! All of this state lives in an [`EvolutionContext`] owned by the
//! population and passed `&mut` into every mutation, so independent runs
//! never share numbering.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::gene::InnovationId;

/// The three IDs minted when a connection is split by an add-node mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SplitRecord {
    /// The inserted hidden node.
    pub node_id: InnovationId,
    /// The connection from the original source into the new node.
    pub input_connection_id: InnovationId,
    /// The connection from the new node to the original target.
    pub output_connection_id: InnovationId,
}

/// Innovation counter plus structural mutation history for one run.
#[derive(Debug, Clone, Default)]
pub struct EvolutionContext {
    next_innovation: InnovationId,
    connections: HashMap<(InnovationId, InnovationId), InnovationId>,
    connection_order: VecDeque<(InnovationId, InnovationId)>,
    splits: HashMap<InnovationId, SplitRecord>,
    split_order: VecDeque<InnovationId>,
    history_capacity: Option<usize>,
}

impl EvolutionContext {
    /// Create a context with unbounded history, counting from zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context whose registries each keep at most `capacity` entries,
    /// evicting the oldest first. `None` keeps everything.
    #[must_use]
    pub fn with_history_capacity(capacity: Option<usize>) -> Self {
        Self {
            history_capacity: capacity,
            ..Self::default()
        }
    }

    /// Mint a fresh innovation ID.
    #[inline]
    pub fn next_id(&mut self) -> InnovationId {
        let id = self.next_innovation;
        self.next_innovation += 1;
        id
    }

    /// The ID the next call to [`next_id`](Self::next_id) will return.
    #[inline]
    #[must_use]
    pub const fn peek_next_id(&self) -> InnovationId {
        self.next_innovation
    }

    /// Previously assigned ID for a `(source, target)` connection, if any.
    #[must_use]
    pub fn lookup_connection(
        &self,
        source: InnovationId,
        target: InnovationId,
    ) -> Option<InnovationId> {
        self.connections.get(&(source, target)).copied()
    }

    /// Record the ID used for a `(source, target)` connection.
    ///
    /// An existing entry for the same endpoints is left untouched.
    pub fn register_connection(
        &mut self,
        source: InnovationId,
        target: InnovationId,
        id: InnovationId,
    ) {
        if self.connections.contains_key(&(source, target)) {
            return;
        }
        self.connections.insert((source, target), id);
        self.connection_order.push_back((source, target));

        if let Some(capacity) = self.history_capacity {
            while self.connection_order.len() > capacity {
                if let Some(oldest) = self.connection_order.pop_front() {
                    self.connections.remove(&oldest);
                    log::trace!("evicted connection history entry {:?}", oldest);
                }
            }
        }
    }

    /// Look up the connection ID for `(source, target)`, minting and
    /// recording a new one if the pair has not been seen.
    pub fn connection_innovation(
        &mut self,
        source: InnovationId,
        target: InnovationId,
    ) -> InnovationId {
        if let Some(id) = self.lookup_connection(source, target) {
            return id;
        }
        let id = self.next_id();
        self.register_connection(source, target, id);
        id
    }

    /// The IDs a previous split of `connection_id` produced, if recorded.
    #[must_use]
    pub fn lookup_split(&self, connection_id: InnovationId) -> Option<SplitRecord> {
        self.splits.get(&connection_id).copied()
    }

    /// Record the IDs produced by splitting `connection_id`.
    ///
    /// The first record for a connection wins.
    pub fn record_split(&mut self, connection_id: InnovationId, record: SplitRecord) {
        if self.splits.contains_key(&connection_id) {
            return;
        }
        self.splits.insert(connection_id, record);
        self.split_order.push_back(connection_id);

        if let Some(capacity) = self.history_capacity {
            while self.split_order.len() > capacity {
                if let Some(oldest) = self.split_order.pop_front() {
                    self.splits.remove(&oldest);
                    log::trace!("evicted split history entry for connection {oldest}");
                }
            }
        }
    }

    /// Forget all recorded structure. The ID counter keeps counting.
    pub fn clear_history(&mut self) {
        self.connections.clear();
        self.connection_order.clear();
        self.splits.clear();
        self.split_order.clear();
    }

    /// Number of recorded connection endpoints.
    #[must_use]
    pub fn connection_history_len(&self) -> usize {
        self.connections.len()
    }

    /// Number of recorded node splits.
    #[must_use]
    pub fn split_history_len(&self) -> usize {
        self.splits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut ctx = EvolutionContext::new();
        assert_eq!(ctx.next_id(), 0);
        assert_eq!(ctx.next_id(), 1);
        assert_eq!(ctx.peek_next_id(), 2);
    }

    #[test]
    fn test_connection_innovation_reused() {
        let mut ctx = EvolutionContext::new();
        let first = ctx.connection_innovation(1, 2);
        let again = ctx.connection_innovation(1, 2);
        assert_eq!(first, again, "same endpoints must share an ID");

        let reversed = ctx.connection_innovation(2, 1);
        assert_ne!(first, reversed, "direction is part of the key");
        assert_eq!(ctx.connection_history_len(), 2);
    }

    #[test]
    fn test_register_does_not_overwrite() {
        let mut ctx = EvolutionContext::new();
        ctx.register_connection(3, 4, 10);
        ctx.register_connection(3, 4, 11);
        assert_eq!(ctx.lookup_connection(3, 4), Some(10));
    }

    #[test]
    fn test_split_history() {
        let mut ctx = EvolutionContext::new();
        assert!(ctx.lookup_split(5).is_none());

        let record = SplitRecord {
            node_id: 20,
            input_connection_id: 21,
            output_connection_id: 22,
        };
        ctx.record_split(5, record);
        ctx.record_split(
            5,
            SplitRecord {
                node_id: 30,
                input_connection_id: 31,
                output_connection_id: 32,
            },
        );
        assert_eq!(ctx.lookup_split(5), Some(record));
    }

    #[test]
    fn test_bounded_history_evicts_oldest() {
        let mut ctx = EvolutionContext::with_history_capacity(Some(2));
        ctx.connection_innovation(0, 1);
        ctx.connection_innovation(0, 2);
        ctx.connection_innovation(0, 3);

        assert_eq!(ctx.connection_history_len(), 2);
        assert!(ctx.lookup_connection(0, 1).is_none());
        assert!(ctx.lookup_connection(0, 3).is_some());
    }

    #[test]
    fn test_clear_history_keeps_counter() {
        let mut ctx = EvolutionContext::new();
        ctx.connection_innovation(0, 1);
        ctx.record_split(
            0,
            SplitRecord {
                node_id: 1,
                input_connection_id: 2,
                output_connection_id: 3,
            },
        );
        let next = ctx.peek_next_id();

        ctx.clear_history();
        assert_eq!(ctx.connection_history_len(), 0);
        assert_eq!(ctx.split_history_len(), 0);
        assert_eq!(ctx.peek_next_id(), next);
    }
}
