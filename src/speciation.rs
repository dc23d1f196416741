//! Speciation: grouping genomes by position in genetic space.
//!
//! A genome's position is a [`CoordinateVector`] of `(innovation, weight)`
//! pairs. A [`DistanceMetric`] measures distance between positions and
//! computes species centroids. [`KMeansSpeciation`] partitions a population
//! into a fixed number of species with a short k-means refinement.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::gene::{ConnectionGene, InnovationId};
use crate::genome::{Genome, GenomeId};

/// Sparse point in genetic space, ascending by innovation ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinateVector {
    coords: Vec<(InnovationId, f64)>,
}

impl CoordinateVector {
    /// Build from pairs in any order. Later duplicates of an ID are dropped.
    #[must_use]
    pub fn new(mut coords: Vec<(InnovationId, f64)>) -> Self {
        coords.sort_by_key(|&(id, _)| id);
        coords.dedup_by_key(|&mut (id, _)| id);
        Self { coords }
    }

    /// Position of a genome with these connection genes.
    #[must_use]
    pub fn from_connections(connections: &[ConnectionGene]) -> Self {
        Self {
            coords: connections
                .iter()
                .map(|conn| (conn.innovation, conn.weight))
                .collect(),
        }
    }

    /// The `(innovation, value)` pairs.
    #[must_use]
    pub fn as_slice(&self) -> &[(InnovationId, f64)] {
        &self.coords
    }

    /// Number of non-zero dimensions stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Whether no dimensions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Distance and centroid computation over [`CoordinateVector`]s.
pub trait DistanceMetric: Send + Sync {
    /// Distance between two positions.
    fn distance(&self, a: &CoordinateVector, b: &CoordinateVector) -> f64;

    /// The point that best represents `points`.
    fn centroid(&self, points: &[&CoordinateVector]) -> CoordinateVector;
}

/// Weighted Manhattan distance.
///
/// A dimension present in both vectors contributes
/// `match_coeff * |a - b|`; one present in only one vector contributes
/// `mismatch_constant + mismatch_coeff * |value|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManhattanDistanceMetric {
    /// Scale for differences between matching dimensions.
    pub match_coeff: f64,
    /// Scale for the magnitude of unmatched dimensions.
    pub mismatch_coeff: f64,
    /// Flat penalty per unmatched dimension.
    pub mismatch_constant: f64,
}

impl Default for ManhattanDistanceMetric {
    fn default() -> Self {
        Self {
            match_coeff: 1.0,
            mismatch_coeff: 0.0,
            mismatch_constant: 10.0,
        }
    }
}

impl DistanceMetric for ManhattanDistanceMetric {
    fn distance(&self, a: &CoordinateVector, b: &CoordinateVector) -> f64 {
        let (a, b) = (a.as_slice(), b.as_slice());
        let mismatch = |value: f64| self.mismatch_constant + self.mismatch_coeff * value.abs();
        let (mut i, mut j) = (0, 0);
        let mut distance = 0.0;

        while i < a.len() && j < b.len() {
            let ((id_a, value_a), (id_b, value_b)) = (a[i], b[j]);
            if id_a == id_b {
                distance += self.match_coeff * (value_a - value_b).abs();
                i += 1;
                j += 1;
            } else if id_a < id_b {
                distance += mismatch(value_a);
                i += 1;
            } else {
                distance += mismatch(value_b);
                j += 1;
            }
        }
        distance += a[i..].iter().map(|&(_, v)| mismatch(v)).sum::<f64>();
        distance += b[j..].iter().map(|&(_, v)| mismatch(v)).sum::<f64>();
        distance
    }

    /// Per-dimension mean, with absent dimensions counting as zero.
    fn centroid(&self, points: &[&CoordinateVector]) -> CoordinateVector {
        match points {
            [] => CoordinateVector::default(),
            [single] => (*single).clone(),
            _ => {
                let mut sums: BTreeMap<InnovationId, f64> = BTreeMap::new();
                for point in points {
                    for &(id, value) in point.as_slice() {
                        *sums.entry(id).or_insert(0.0) += value;
                    }
                }
                let count = points.len() as f64;
                CoordinateVector {
                    coords: sums.into_iter().map(|(id, sum)| (id, sum / count)).collect(),
                }
            }
        }
    }
}

/// A group of genomes competing for the same share of offspring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Species {
    /// Index of this species within the population's species list.
    pub id: usize,
    /// Member genomes. Fittest first once the population has sorted them.
    pub members: Vec<GenomeId>,
    /// Representative position of the members.
    pub centroid: CoordinateVector,
}

impl Species {
    /// An empty species centred on `centroid`.
    #[must_use]
    pub fn new(id: usize, centroid: CoordinateVector) -> Self {
        Self {
            id,
            members: Vec::new(),
            centroid,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the species has gone extinct.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Assigns genomes to species.
pub trait SpeciationStrategy {
    /// Partition `ids` into `species_count` new species.
    fn initialize_speciation<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        ids: &[GenomeId],
        species_count: usize,
        rng: &mut R,
    ) -> Vec<Species>;

    /// Re-partition `ids` into `species`, whose member lists are empty.
    fn speciate_genomes<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        ids: &[GenomeId],
        species: &mut [Species],
        rng: &mut R,
    );

    /// Add newly created genomes to existing, non-empty species.
    fn speciate_offspring<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        offspring: &[GenomeId],
        species: &mut [Species],
        rng: &mut R,
    );
}

/// K-means clustering in genetic space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansSpeciation<M> {
    /// Distance metric used for assignment and centroids.
    pub metric: M,
    /// Upper bound on refinement passes per full speciation.
    pub max_iterations: usize,
}

impl<M: Default> Default for KMeansSpeciation<M> {
    fn default() -> Self {
        Self {
            metric: M::default(),
            max_iterations: 5,
        }
    }
}

impl<M: DistanceMetric> KMeansSpeciation<M> {
    /// Use `metric` with the default iteration bound.
    #[must_use]
    pub fn new(metric: M) -> Self {
        Self {
            metric,
            max_iterations: 5,
        }
    }

    fn nearest(&self, position: &CoordinateVector, species: &[Species]) -> Option<usize> {
        species
            .iter()
            .enumerate()
            .map(|(index, s)| (index, self.metric.distance(position, &s.centroid)))
            .fold(None, |best: Option<(usize, f64)>, (index, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((index, d)),
            })
            .map(|(index, _)| index)
    }

    fn recompute_centroid(&self, genomes: &SlotMap<GenomeId, Genome>, species: &mut Species) {
        let points: Vec<&CoordinateVector> = species
            .members
            .iter()
            .filter_map(|&id| genomes.get(id))
            .map(Genome::position)
            .collect();
        if !points.is_empty() {
            species.centroid = self.metric.centroid(&points);
        }
    }

    /// Fill each empty species with the genome farthest from its own
    /// species' centroid, taken from a species that can spare one.
    fn repopulate_empty(&self, genomes: &SlotMap<GenomeId, Genome>, species: &mut [Species]) {
        for empty in 0..species.len() {
            if !species[empty].is_empty() {
                continue;
            }

            let mut farthest: Option<(usize, usize, f64)> = None;
            for (donor, s) in species.iter().enumerate() {
                if s.len() < 2 {
                    continue;
                }
                for (slot, &id) in s.members.iter().enumerate() {
                    let Some(genome) = genomes.get(id) else {
                        continue;
                    };
                    let d = self.metric.distance(genome.position(), &s.centroid);
                    if farthest.is_none_or(|(_, _, best)| d > best) {
                        farthest = Some((donor, slot, d));
                    }
                }
            }

            let Some((donor, slot, _)) = farthest else {
                continue;
            };
            let id = species[donor].members.swap_remove(slot);
            self.recompute_centroid(genomes, &mut species[donor]);
            species[empty].members.push(id);
            if let Some(genome) = genomes.get(id) {
                species[empty].centroid = genome.position().clone();
            }
        }
    }
}

impl<M: DistanceMetric> SpeciationStrategy for KMeansSpeciation<M> {
    fn initialize_speciation<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        ids: &[GenomeId],
        species_count: usize,
        rng: &mut R,
    ) -> Vec<Species> {
        let positions: Vec<&CoordinateVector> = ids
            .iter()
            .filter_map(|&id| genomes.get(id))
            .map(Genome::position)
            .collect();
        if positions.is_empty() || species_count == 0 {
            return (0..species_count)
                .map(|id| Species::new(id, CoordinateVector::default()))
                .collect();
        }

        // Farthest-point seeding.
        let mut centroids: Vec<CoordinateVector> =
            vec![positions[rng.random_range(0..positions.len())].clone()];
        let mut min_distance: Vec<f64> = positions
            .iter()
            .map(|p| self.metric.distance(p, &centroids[0]))
            .collect();
        while centroids.len() < species_count {
            let (index, _) = min_distance.iter().enumerate().fold(
                (0, f64::NEG_INFINITY),
                |best, (index, &d)| if d > best.1 { (index, d) } else { best },
            );
            let next = positions[index].clone();
            for (slot, p) in positions.iter().enumerate() {
                min_distance[slot] = min_distance[slot].min(self.metric.distance(p, &next));
            }
            centroids.push(next);
        }

        let mut species: Vec<Species> = centroids
            .into_iter()
            .enumerate()
            .map(|(id, centroid)| Species::new(id, centroid))
            .collect();
        self.speciate_genomes(genomes, ids, &mut species, rng);
        species
    }

    fn speciate_genomes<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        ids: &[GenomeId],
        species: &mut [Species],
        _rng: &mut R,
    ) {
        if species.is_empty() {
            return;
        }
        for s in species.iter_mut() {
            s.members.clear();
        }

        for &id in ids {
            if let Some(genome) = genomes.get(id) {
                if let Some(index) = self.nearest(genome.position(), species) {
                    species[index].members.push(id);
                }
            }
        }
        self.repopulate_empty(genomes, species);
        for s in species.iter_mut() {
            self.recompute_centroid(genomes, s);
        }

        for _ in 0..self.max_iterations {
            let mut moves = Vec::new();
            for (from, s) in species.iter().enumerate() {
                for &id in &s.members {
                    let Some(genome) = genomes.get(id) else {
                        continue;
                    };
                    if let Some(to) = self.nearest(genome.position(), species) {
                        if to != from
                            && self.metric.distance(genome.position(), &species[to].centroid)
                                < self.metric.distance(genome.position(), &s.centroid)
                        {
                            moves.push((id, from, to));
                        }
                    }
                }
            }
            if moves.is_empty() {
                break;
            }
            for (id, from, to) in moves {
                species[from].members.retain(|&member| member != id);
                species[to].members.push(id);
            }
            self.repopulate_empty(genomes, species);
            for s in species.iter_mut() {
                self.recompute_centroid(genomes, s);
            }
        }
    }

    fn speciate_offspring<R: Rng>(
        &self,
        genomes: &SlotMap<GenomeId, Genome>,
        offspring: &[GenomeId],
        species: &mut [Species],
        _rng: &mut R,
    ) {
        let mut touched = vec![false; species.len()];
        for &id in offspring {
            if let Some(genome) = genomes.get(id) {
                if let Some(index) = self.nearest(genome.position(), species) {
                    species[index].members.push(id);
                    touched[index] = true;
                }
            }
        }
        for (s, changed) in species.iter_mut().zip(touched) {
            if changed {
                self.recompute_centroid(genomes, s);
            }
        }
    }
}
