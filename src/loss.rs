//! Loss functions.
//!
//! Small, allocation-free helpers over one sample:
//!
//! - compute logits
//! - compute `d_logits` via [`Loss::backward`]
//! - hand the gradient to an optimizer

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Supported loss functions.
pub enum Loss {
    /// Softmax followed by categorical cross-entropy against a one-hot target.
    ///
    /// Expects raw logits as predictions.
    #[default]
    CategoricalCrossEntropy,
    /// Mean squared error on the softmax probabilities.
    Mse,
}

impl Loss {
    /// Compute the loss for one sample.
    ///
    /// Shape contract: `logits.len() == target.len()`, non-empty.
    #[inline]
    pub fn forward(self, logits: &[f32], target: &[f32]) -> f32 {
        assert_eq!(
            logits.len(),
            target.len(),
            "logits len {} does not match target len {}",
            logits.len(),
            target.len()
        );
        assert!(!logits.is_empty(), "loss requires at least 1 class");

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let sum: f32 = logits.iter().map(|&z| (z - max).exp()).sum();
        match self {
            Loss::CategoricalCrossEntropy => logits
                .iter()
                .zip(target)
                .filter(|&(_, &t)| t != 0.0)
                .map(|(&z, &t)| -t * ((z - max).exp() / sum).max(f32::MIN_POSITIVE).ln())
                .sum(),
            Loss::Mse => {
                let inv = 1.0 / sum;
                let total: f32 = logits
                    .iter()
                    .zip(target)
                    .map(|(&z, &t)| {
                        let d = (z - max).exp() * inv - t;
                        d * d
                    })
                    .sum();
                total / logits.len() as f32
            }
        }
    }

    /// Compute loss + gradient w.r.t. `logits`.
    ///
    /// Writes `dL/d(logits)` into `d_logits` and returns the loss.
    #[inline]
    pub fn backward(self, logits: &[f32], target: &[f32], d_logits: &mut [f32]) -> f32 {
        assert_eq!(
            logits.len(),
            target.len(),
            "logits len {} does not match target len {}",
            logits.len(),
            target.len()
        );
        assert_eq!(
            logits.len(),
            d_logits.len(),
            "logits len {} does not match d_logits len {}",
            logits.len(),
            d_logits.len()
        );
        assert!(!logits.is_empty(), "loss requires at least 1 class");

        softmax_into(logits, d_logits);
        match self {
            Loss::CategoricalCrossEntropy => {
                let mut loss = 0.0_f32;
                for i in 0..logits.len() {
                    let t = target[i];
                    if t != 0.0 {
                        loss -= t * d_logits[i].max(f32::MIN_POSITIVE).ln();
                    }
                    d_logits[i] -= t;
                }
                loss
            }
            Loss::Mse => {
                let k = logits.len();
                let inv_k = 1.0 / k as f32;
                let mut loss = 0.0_f32;
                let mut dot = 0.0_f32;
                for (&p, &t) in d_logits.iter().zip(target) {
                    let diff = p - t;
                    loss = diff.mul_add(diff, loss);
                    dot = diff.mul_add(p, dot);
                }
                // Chain rule through the softmax Jacobian: dp_j/dz_i = p_j (δ_ij - p_i).
                for (p, &t) in d_logits.iter_mut().zip(target) {
                    *p = 2.0 * inv_k * *p * ((*p - t) - dot);
                }
                loss * inv_k
            }
        }
    }
}

/// Numerically stable softmax of `logits` into `out`.
#[inline]
pub fn softmax_into(logits: &[f32], out: &mut [f32]) {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0_f32;
    for (o, &z) in out.iter_mut().zip(logits) {
        *o = (z - max).exp();
        sum += *o;
    }
    let inv = 1.0 / sum;
    for o in out.iter_mut() {
        *o *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let mut out = [0.0_f32; 3];
        softmax_into(&[1000.0, 1000.0, 1000.0], &mut out);
        for p in out {
            assert!((p - 1.0 / 3.0).abs() < 1e-6);
        }
    }

    #[test]
    fn cross_entropy_prefers_correct_class() {
        let target = [1.0_f32, 0.0, 0.0];
        let good = Loss::CategoricalCrossEntropy.forward(&[5.0, 0.0, -1.0], &target);
        let bad = Loss::CategoricalCrossEntropy.forward(&[-1.0, 0.0, 5.0], &target);
        assert!(good < bad);
    }

    #[test]
    fn cross_entropy_gradient_is_softmax_minus_target() {
        let mut d = [0.0_f32; 2];
        let loss = Loss::CategoricalCrossEntropy.backward(&[0.0, 0.0], &[0.0, 1.0], &mut d);
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((d[0] - 0.5).abs() < 1e-6);
        assert!((d[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn forward_agrees_with_backward() {
        let logits = [1.5_f32, -0.5, 0.25, 2.0];
        let target = [0.0_f32, 0.0, 1.0, 0.0];
        let mut d = [0.0_f32; 4];
        for loss in [Loss::CategoricalCrossEntropy, Loss::Mse] {
            let expected = loss.backward(&logits, &target, &mut d);
            assert!((loss.forward(&logits, &target) - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn mse_gradient_matches_finite_difference() {
        let logits = [0.3_f32, -0.2, 0.7];
        let target = [0.0_f32, 1.0, 0.0];
        let mut d = [0.0_f32; 3];
        Loss::Mse.backward(&logits, &target, &mut d);

        let h = 1e-3_f32;
        for i in 0..3 {
            let mut plus = logits;
            plus[i] += h;
            let mut minus = logits;
            minus[i] -= h;
            let numeric = (Loss::Mse.forward(&plus, &target) - Loss::Mse.forward(&minus, &target))
                / (2.0 * h);
            assert!((numeric - d[i]).abs() < 1e-3, "i={i} numeric={numeric} analytic={}", d[i]);
        }
    }
}
