//! Always-sorted gene storage.
//!
//! [`GeneList`] keeps its genes strictly ascending by innovation ID at all
//! times. Lookups are binary searches, and insertion places a gene at its
//! sorted position. Crossover correlation and layering both depend on this
//! ordering, so the container never exposes a way to insert out of order.

use std::ops::{Index, IndexMut};
use std::slice;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::gene::{Gene, InnovationId};
use crate::genome::GenomeError;

/// A vector of genes kept strictly ascending by innovation ID.
///
/// Mutable access via [`get_mut`](Self::get_mut) and
/// [`iter_mut`](Self::iter_mut) must not change a gene's innovation ID.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneList<G> {
    genes: Vec<G>,
}

impl<G> Default for GeneList<G> {
    fn default() -> Self {
        Self { genes: Vec::new() }
    }
}

impl<G: Gene> GeneList<G> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty list with room for `capacity` genes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            genes: Vec::with_capacity(capacity),
        }
    }

    /// Build a list from genes in any order.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::DuplicateGene`] if two genes share an ID.
    pub fn from_unsorted(mut genes: Vec<G>) -> Result<Self, GenomeError> {
        genes.sort_by_key(Gene::innovation);
        if let Some(pair) = genes
            .windows(2)
            .find(|pair| pair[0].innovation() == pair[1].innovation())
        {
            return Err(GenomeError::DuplicateGene(pair[0].innovation()));
        }
        Ok(Self { genes })
    }

    /// Number of genes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// Whether the list holds no genes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// The genes as a sorted slice.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[G] {
        &self.genes
    }

    /// Iterate in ascending innovation order.
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, G> {
        self.genes.iter()
    }

    /// Mutable iteration in ascending innovation order.
    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, G> {
        self.genes.iter_mut()
    }

    /// The gene with the highest innovation ID.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&G> {
        self.genes.last()
    }

    /// Binary search for `id`.
    ///
    /// `Ok(index)` if present, otherwise `Err(insert_position)`.
    #[inline]
    pub fn search(&self, id: InnovationId) -> Result<usize, usize> {
        self.genes.binary_search_by_key(&id, Gene::innovation)
    }

    /// Whether a gene with `id` is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: InnovationId) -> bool {
        self.search(id).is_ok()
    }

    /// Look up a gene by innovation ID.
    #[must_use]
    pub fn get(&self, id: InnovationId) -> Option<&G> {
        self.search(id).ok().map(|idx| &self.genes[idx])
    }

    /// Mutable lookup by innovation ID.
    pub fn get_mut(&mut self, id: InnovationId) -> Option<&mut G> {
        match self.search(id) {
            Ok(idx) => Some(&mut self.genes[idx]),
            Err(_) => None,
        }
    }

    /// Insert a gene at its sorted position and return that position.
    ///
    /// New genes usually carry the highest ID so far; that case appends
    /// without searching.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::DuplicateGene`] if the ID is already present.
    pub fn insert(&mut self, gene: G) -> Result<usize, GenomeError> {
        let id = gene.innovation();
        if self.genes.last().is_none_or(|last| last.innovation() < id) {
            self.genes.push(gene);
            return Ok(self.genes.len() - 1);
        }
        match self.search(id) {
            Ok(_) => Err(GenomeError::DuplicateGene(id)),
            Err(pos) => {
                self.genes.insert(pos, gene);
                Ok(pos)
            }
        }
    }

    /// Remove and return the gene with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GenomeError::UnknownGene`] if no such gene exists.
    pub fn remove(&mut self, id: InnovationId) -> Result<G, GenomeError> {
        match self.search(id) {
            Ok(idx) => Ok(self.genes.remove(idx)),
            Err(_) => Err(GenomeError::UnknownGene(id)),
        }
    }

    /// Strictly ascending with no duplicates.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.genes
            .windows(2)
            .all(|pair| pair[0].innovation() < pair[1].innovation())
    }

    /// Innovation IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = InnovationId> + '_ {
        self.genes.iter().map(Gene::innovation)
    }
}

impl<G> Index<usize> for GeneList<G> {
    type Output = G;

    #[inline]
    fn index(&self, index: usize) -> &G {
        &self.genes[index]
    }
}

impl<G> IndexMut<usize> for GeneList<G> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut G {
        &mut self.genes[index]
    }
}

impl<G: Serialize> Serialize for GeneList<G> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.genes.serialize(serializer)
    }
}

impl<'de, G: Gene + Deserialize<'de>> Deserialize<'de> for GeneList<G> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let genes = Vec::<G>::deserialize(deserializer)?;
        Self::from_unsorted(genes).map_err(serde::de::Error::custom)
    }
}

impl<'a, G> IntoIterator for &'a GeneList<G> {
    type Item = &'a G;
    type IntoIter = slice::Iter<'a, G>;

    fn into_iter(self) -> Self::IntoIter {
        self.genes.iter()
    }
}
