//! Loss functions consumed by the learner stack.
//!
//! Layers use the loss both for final-prediction bookkeeping and to compute
//! gradients against synthetic, non-ground-truth targets (the feedforward
//! layer trains its hidden units under a temporarily swapped squared loss).
//!
//! # Usage
//!
//! ```
//! use caudal::loss::{loss_by_name, SquaredLoss, LossFunction};
//!
//! let squared = SquaredLoss;
//! assert!((squared.loss(1.5, 1.0) - 0.25).abs() < 1e-6);
//!
//! let logistic = loss_by_name("logistic").unwrap();
//! assert!(logistic.loss(0.0, 1.0) > 0.0);
//! ```

use crate::error::{CaudalError, Result};

/// A differentiable loss over (prediction, label).
pub trait LossFunction: Send {
    /// Loss charged for predicting `prediction` against `label`.
    fn loss(&self, prediction: f32, label: f32) -> f32;

    /// First derivative of the loss with respect to the prediction.
    fn first_derivative(&self, prediction: f32, label: f32) -> f32;

    /// Canonical name, echoed into model metadata.
    fn name(&self) -> &'static str;
}

/// Squared loss: `(p - y)^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredLoss;

impl LossFunction for SquaredLoss {
    fn loss(&self, prediction: f32, label: f32) -> f32 {
        let d = prediction - label;
        d * d
    }

    fn first_derivative(&self, prediction: f32, label: f32) -> f32 {
        2.0 * (prediction - label)
    }

    fn name(&self) -> &'static str {
        "squared"
    }
}

/// Logistic loss over labels in {-1, +1}: `ln(1 + e^(-y p))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl LossFunction for LogisticLoss {
    fn loss(&self, prediction: f32, label: f32) -> f32 {
        (1.0 + (-label * prediction).exp()).ln()
    }

    fn first_derivative(&self, prediction: f32, label: f32) -> f32 {
        -label / (1.0 + (label * prediction).exp())
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}

/// Hinge loss over labels in {-1, +1}: `max(0, 1 - y p)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HingeLoss;

impl LossFunction for HingeLoss {
    fn loss(&self, prediction: f32, label: f32) -> f32 {
        (1.0 - label * prediction).max(0.0)
    }

    fn first_derivative(&self, prediction: f32, label: f32) -> f32 {
        if label * prediction < 1.0 {
            -label
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "hinge"
    }
}

/// Quantile (pinball) loss with parameter tau in (0, 1).
#[derive(Debug, Clone, Copy)]
pub struct QuantileLoss {
    /// Target quantile.
    pub tau: f32,
}

impl LossFunction for QuantileLoss {
    fn loss(&self, prediction: f32, label: f32) -> f32 {
        let d = label - prediction;
        if d > 0.0 {
            self.tau * d
        } else {
            -(1.0 - self.tau) * d
        }
    }

    fn first_derivative(&self, prediction: f32, label: f32) -> f32 {
        if label > prediction {
            -self.tau
        } else {
            1.0 - self.tau
        }
    }

    fn name(&self) -> &'static str {
        "quantile"
    }
}

/// Looks up a loss function by name.
///
/// # Errors
///
/// Returns a configuration error for unknown names.
pub fn loss_by_name(name: &str) -> Result<Box<dyn LossFunction>> {
    match name {
        "squared" => Ok(Box::new(SquaredLoss)),
        "logistic" => Ok(Box::new(LogisticLoss)),
        "hinge" => Ok(Box::new(HingeLoss)),
        "quantile" => Ok(Box::new(QuantileLoss { tau: 0.5 })),
        other => Err(CaudalError::InvalidHyperparameter {
            param: "loss".to_string(),
            value: other.to_string(),
            constraint: "one of squared, logistic, hinge, quantile".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_loss_and_derivative() {
        let l = SquaredLoss;
        assert!((l.loss(3.0, 1.0) - 4.0).abs() < 1e-6);
        assert!((l.first_derivative(3.0, 1.0) - 4.0).abs() < 1e-6);
        assert_eq!(l.loss(1.0, 1.0), 0.0);
    }

    #[test]
    fn test_logistic_loss_symmetry() {
        let l = LogisticLoss;
        // Correctly classified with margin: small loss, small gradient.
        assert!(l.loss(3.0, 1.0) < l.loss(-3.0, 1.0));
        assert!(l.first_derivative(0.0, 1.0) < 0.0);
        assert!(l.first_derivative(0.0, -1.0) > 0.0);
    }

    #[test]
    fn test_hinge_loss_margin() {
        let l = HingeLoss;
        assert_eq!(l.loss(2.0, 1.0), 0.0);
        assert_eq!(l.first_derivative(2.0, 1.0), 0.0);
        assert!((l.loss(0.5, 1.0) - 0.5).abs() < 1e-6);
        assert_eq!(l.first_derivative(0.5, 1.0), -1.0);
    }

    #[test]
    fn test_quantile_loss_asymmetry() {
        let l = QuantileLoss { tau: 0.9 };
        // Under-prediction costs tau per unit, over-prediction 1 - tau.
        assert!((l.loss(0.0, 1.0) - 0.9).abs() < 1e-6);
        assert!((l.loss(1.0, 0.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_loss_by_name() {
        assert_eq!(loss_by_name("squared").unwrap().name(), "squared");
        assert_eq!(loss_by_name("hinge").unwrap().name(), "hinge");
        assert!(loss_by_name("0-1").is_err());
    }
}
