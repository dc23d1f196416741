//! Activation functions for NEAT networks.
//!
//! Activations are a closed set of strategy values rather than a trait
//! hierarchy. A node carries no activation of its own; the genome applies the
//! configured hidden/output activation during evaluation.

use serde::{Deserialize, Serialize};

/// Exponent arguments are clamped to this magnitude before calling `exp`.
pub const EXP_BOUND: f64 = 1.0e20;

/// Clamp a value into `[-EXP_BOUND, EXP_BOUND]`.
#[inline]
#[must_use]
pub fn bound(x: f64) -> f64 {
    x.clamp(-EXP_BOUND, EXP_BOUND)
}

/// `exp` over a bounded argument.
#[inline]
#[must_use]
pub fn bounded_exp(x: f64) -> f64 {
    bound(x).exp()
}

/// Activation function types supported by NEAT nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Activation {
    /// Hyperbolic tangent computed as `2 / (1 + e^(-2x)) - 1`.
    #[default]
    Tanh,
    /// Logistic sigmoid: `1 / (1 + e^(-x))`.
    Sigmoid,
    /// Identity function: f(x) = x
    Identity,
    /// Rectified Linear Unit: f(x) = max(0, x)
    ReLU,
    /// Gaussian: f(x) = e^(-x^2)
    Gaussian,
}

impl Activation {
    /// All available activation functions.
    pub const ALL: [Self; 5] = [
        Self::Tanh,
        Self::Sigmoid,
        Self::Identity,
        Self::ReLU,
        Self::Gaussian,
    ];

    /// Apply this activation function to an input value.
    ///
    /// NaN inputs propagate. Infinite inputs produce the limit value for the
    /// bounded functions.
    #[inline]
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }

        match self {
            Self::Tanh => 2.0 / (1.0 + bounded_exp(-2.0 * x)) - 1.0,
            Self::Sigmoid => 1.0 / (1.0 + bounded_exp(-x)),
            Self::Identity => x,
            Self::ReLU => x.max(0.0),
            Self::Gaussian => {
                if x.is_infinite() || x.abs() > 38.0 {
                    0.0
                } else {
                    (-x * x).exp()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tanh_matches_std() {
        for &x in &[-3.0, -1.0, -0.25, 0.0, 0.5, 2.0, 4.0] {
            let fast = Activation::Tanh.apply(x);
            assert!(
                (fast - f64::tanh(x)).abs() < 1e-12,
                "tanh({x}) = {fast}, std gives {}",
                f64::tanh(x)
            );
        }
    }

    #[test]
    fn test_tanh_extremes_are_finite() {
        assert!((Activation::Tanh.apply(1.0e300) - 1.0).abs() < 1e-12);
        assert!((Activation::Tanh.apply(-1.0e300) + 1.0).abs() < 1e-12);
        assert!((Activation::Tanh.apply(f64::INFINITY) - 1.0).abs() < 1e-12);
        assert!((Activation::Tanh.apply(f64::NEG_INFINITY) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        assert!(Activation::Sigmoid.apply(10.0) > 0.99);
        assert!(Activation::Sigmoid.apply(-10.0) < 0.01);
        assert!(Activation::Sigmoid.apply(-1.0e30).abs() < 1e-12);
    }

    #[test]
    fn test_relu_and_identity() {
        assert!((Activation::ReLU.apply(0.5) - 0.5).abs() < 1e-12);
        assert!(Activation::ReLU.apply(-0.5).abs() < 1e-12);
        assert!((Activation::Identity.apply(-2.0) + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_gaussian() {
        assert!((Activation::Gaussian.apply(0.0) - 1.0).abs() < 1e-12);
        assert!(Activation::Gaussian.apply(3.0) < 0.001);
        assert_eq!(Activation::Gaussian.apply(1.0e10), 0.0);
    }

    #[test]
    fn test_bound() {
        assert_eq!(bound(1.0e30), EXP_BOUND);
        assert_eq!(bound(-1.0e30), -EXP_BOUND);
        assert_eq!(bound(3.0), 3.0);
    }
}
