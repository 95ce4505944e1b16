//! Optimizers.
//!
//! Optimizers update a flat parameter buffer in place given a gradient buffer
//! of the same length. Optimizer *state* (momentum / Adam moments) lives
//! outside the model and is allocated once per training run.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Optimizer choice for training.
pub enum Optimizer {
    /// Plain SGD.
    Sgd { lr: f32 },
    /// SGD with momentum.
    SgdMomentum { lr: f32, momentum: f32 },
    /// Adam (bias-corrected).
    Adam {
        lr: f32,
        beta1: f32,
        beta2: f32,
        eps: f32,
    },
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::adam(1e-3)
    }
}

impl Optimizer {
    /// Adam with the usual `beta1 = 0.9`, `beta2 = 0.999`, `eps = 1e-7`.
    pub fn adam(lr: f32) -> Self {
        Optimizer::Adam {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
        }
    }

    pub fn lr(self) -> f32 {
        match self {
            Optimizer::Sgd { lr }
            | Optimizer::SgdMomentum { lr, .. }
            | Optimizer::Adam { lr, .. } => lr,
        }
    }

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        let lr = self.lr();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        match self {
            Optimizer::Sgd { .. } => Ok(()),
            Optimizer::SgdMomentum { momentum, .. } => {
                if !(momentum.is_finite() && (0.0..1.0).contains(&momentum)) {
                    return Err(Error::InvalidConfig(format!(
                        "momentum must be finite and in [0,1), got {momentum}"
                    )));
                }
                Ok(())
            }
            Optimizer::Adam {
                beta1, beta2, eps, ..
            } => {
                if !(beta1.is_finite() && (0.0..1.0).contains(&beta1)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta1 must be finite and in [0,1), got {beta1}"
                    )));
                }
                if !(beta2.is_finite() && (0.0..1.0).contains(&beta2)) {
                    return Err(Error::InvalidConfig(format!(
                        "adam beta2 must be finite and in [0,1), got {beta2}"
                    )));
                }
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `num_params` parameters.
    pub fn state(self, num_params: usize) -> Result<OptimizerState> {
        self.validate()?;
        Ok(OptimizerState {
            optimizer: self,
            t: 0,
            m: match self {
                Optimizer::Sgd { .. } => Vec::new(),
                _ => vec![0.0; num_params],
            },
            v: match self {
                Optimizer::Adam { .. } => vec![0.0; num_params],
                _ => Vec::new(),
            },
        })
    }
}

#[derive(Debug, Clone)]
/// Owned optimizer state.
pub struct OptimizerState {
    optimizer: Optimizer,
    t: u64,
    /// Velocity (momentum) or first moment (Adam).
    m: Vec<f32>,
    /// Second moment (Adam only).
    v: Vec<f32>,
}

impl OptimizerState {
    /// Number of steps applied so far.
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Apply one optimizer step to `params` using `grads`.
    ///
    /// Panics if the buffers do not match the length the state was allocated for.
    pub fn step(&mut self, params: &mut [f32], grads: &[f32]) {
        assert_eq!(
            params.len(),
            grads.len(),
            "params len {} does not match grads len {}",
            params.len(),
            grads.len()
        );
        self.t += 1;

        match self.optimizer {
            Optimizer::Sgd { lr } => {
                for (p, &g) in params.iter_mut().zip(grads) {
                    *p -= lr * g;
                }
            }
            Optimizer::SgdMomentum { lr, momentum } => {
                assert_eq!(self.m.len(), params.len(), "optimizer state size mismatch");
                for ((p, v), &g) in params.iter_mut().zip(&mut self.m).zip(grads) {
                    *v = momentum * *v + g;
                    *p -= lr * *v;
                }
            }
            Optimizer::Adam {
                lr,
                beta1,
                beta2,
                eps,
            } => {
                assert_eq!(self.m.len(), params.len(), "optimizer state size mismatch");
                let corr1 = 1.0 - beta1.powi(self.t as i32);
                let corr2 = 1.0 - beta2.powi(self.t as i32);
                for i in 0..params.len() {
                    let g = grads[i];
                    self.m[i] = beta1 * self.m[i] + (1.0 - beta1) * g;
                    self.v[i] = beta2 * self.v[i] + (1.0 - beta2) * g * g;
                    let m_hat = self.m[i] / corr1;
                    let v_hat = self.v[i] / corr2;
                    params[i] -= lr * m_hat / (v_hat.sqrt() + eps);
                }
            }
        }
    }
}
