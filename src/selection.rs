//! Weighted random selection helpers.
//!
//! [`RouletteWheel`] draws outcomes with probability proportional to their
//! weight and supports removing an outcome after it has been drawn.
//! [`stochastic_round`] rounds a real value up with probability equal to its
//! fractional part, so repeated rounding carries no systematic bias.

use rand::Rng;

/// Weighted selection over a set of outcomes.
///
/// Negative or non-finite weights count as zero. If every weight is zero the
/// wheel falls back to a uniform choice.
#[derive(Debug, Clone, PartialEq)]
pub struct RouletteWheel<T> {
    outcomes: Vec<T>,
    weights: Vec<f64>,
    total: f64,
}

impl<T> RouletteWheel<T> {
    /// Build a wheel from `(outcome, weight)` pairs.
    #[must_use]
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
    {
        let (outcomes, weights): (Vec<T>, Vec<f64>) = entries
            .into_iter()
            .map(|(outcome, weight)| (outcome, sanitize(weight)))
            .unzip();
        let mut wheel = Self {
            outcomes,
            weights,
            total: 0.0,
        };
        wheel.normalize();
        wheel
    }

    fn normalize(&mut self) {
        self.total = self.weights.iter().sum();
        if self.total <= 0.0 || !self.total.is_finite() {
            self.weights.iter_mut().for_each(|w| *w = 1.0);
            self.total = self.weights.len() as f64;
        }
    }

    /// Number of outcomes still on the wheel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no outcomes remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Probability of drawing the outcome at `index`.
    #[must_use]
    pub fn probability(&self, index: usize) -> f64 {
        self.weights
            .get(index)
            .map_or(0.0, |w| if self.total > 0.0 { w / self.total } else { 0.0 })
    }

    /// Draw an outcome index.
    pub fn spin_index<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        if self.outcomes.is_empty() {
            return None;
        }
        let target = rng.random::<f64>() * self.total;
        let mut cumulative = 0.0;
        let mut last_positive = None;
        for (index, &weight) in self.weights.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_positive = Some(index);
            if target < cumulative {
                return Some(index);
            }
        }
        last_positive
    }

    /// Draw an outcome.
    pub fn spin<R: Rng>(&self, rng: &mut R) -> Option<&T> {
        self.spin_index(rng).map(|index| &self.outcomes[index])
    }

    /// Remove the outcome at `index`, renormalizing the rest.
    pub fn remove_index(&mut self, index: usize) -> Option<T> {
        if index >= self.outcomes.len() {
            return None;
        }
        self.weights.remove(index);
        let removed = self.outcomes.remove(index);
        self.normalize();
        Some(removed)
    }
}

impl<T: PartialEq> RouletteWheel<T> {
    /// Remove the first occurrence of `outcome`. Returns whether it was found.
    pub fn remove_outcome(&mut self, outcome: &T) -> bool {
        match self.outcomes.iter().position(|o| o == outcome) {
            Some(index) => self.remove_index(index).is_some(),
            None => false,
        }
    }
}

fn sanitize(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}

/// Round `value` down or up at random, rounding up with probability equal
/// to its fractional part. Negative and non-finite values give 0.
pub fn stochastic_round<R: Rng>(value: f64, rng: &mut R) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let floor = value.floor();
    let fraction = value - floor;
    let round_up = fraction > 0.0 && rng.random::<f64>() < fraction;
    floor as usize + usize::from(round_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_spin_follows_weights() {
        let wheel = RouletteWheel::new([('a', 1.0), ('b', 3.0)]);
        let mut rng = test_rng();
        let b_count = (0..10_000)
            .filter(|_| wheel.spin(&mut rng) == Some(&'b'))
            .count();
        let ratio = b_count as f64 / 10_000.0;
        assert!((ratio - 0.75).abs() < 0.03, "got {ratio}");
    }

    #[test]
    fn test_zero_weight_never_drawn() {
        let wheel = RouletteWheel::new([(0, 0.0), (1, 2.0), (2, 0.0)]);
        let mut rng = test_rng();
        for _ in 0..1_000 {
            assert_eq!(wheel.spin(&mut rng), Some(&1));
        }
    }

    #[test]
    fn test_all_zero_is_uniform() {
        let wheel = RouletteWheel::new([(0, 0.0), (1, 0.0), (2, f64::NAN)]);
        for index in 0..3 {
            assert!((wheel.probability(index) - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_remove_outcome() {
        let mut wheel = RouletteWheel::new([(7, 1.0), (8, 1.0)]);
        assert!(wheel.remove_outcome(&7));
        assert!(!wheel.remove_outcome(&7));
        let mut rng = test_rng();
        for _ in 0..100 {
            assert_eq!(wheel.spin(&mut rng), Some(&8));
        }

        assert!(wheel.remove_outcome(&8));
        assert!(wheel.is_empty());
        assert_eq!(wheel.spin(&mut rng), None);
    }

    #[test]
    fn test_remove_leaves_only_zero_weights_uniform() {
        let mut wheel = RouletteWheel::new([(0, 5.0), (1, 0.0), (2, 0.0)]);
        wheel.remove_index(0);
        assert!((wheel.probability(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stochastic_round_integers_are_exact() {
        let mut rng = test_rng();
        for _ in 0..100 {
            assert_eq!(stochastic_round(4.0, &mut rng), 4);
            assert_eq!(stochastic_round(0.0, &mut rng), 0);
            assert_eq!(stochastic_round(-2.5, &mut rng), 0);
        }
    }

    #[test]
    fn test_stochastic_round_fairness() {
        let mut rng = test_rng();
        let trials = 10_000;
        let fours = (0..trials)
            .filter(|_| stochastic_round(3.5, &mut rng) == 4)
            .count();
        let ratio = fours as f64 / trials as f64;
        assert!((ratio - 0.5).abs() < 0.03, "got {ratio}");
    }

    #[test]
    fn test_stochastic_round_bias() {
        let mut rng = test_rng();
        let trials = 10_000;
        let total: usize = (0..trials).map(|_| stochastic_round(3.7, &mut rng)).sum();
        let mean = total as f64 / trials as f64;
        assert!((mean - 3.7).abs() < 0.03, "got {mean}");
    }
}
