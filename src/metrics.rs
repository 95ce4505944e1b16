//! Metrics.
//!
//! Metrics are evaluation helpers reported alongside the loss; they never
//! participate in backprop. Reported values travel as [`Logs`], a name → value
//! map using the conventional names `loss`, `acc`, `val_loss`, `val_acc`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::argmax;
use crate::{Error, Result, Tensor};

pub const LOSS: &str = "loss";
pub const ACCURACY: &str = "acc";
pub const VAL_PREFIX: &str = "val_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Supported evaluation metrics.
pub enum Metric {
    /// Multiclass accuracy (argmax).
    Accuracy,
    /// Top-k accuracy for multiclass classification.
    ///
    /// This metric requires `k <= num_classes`.
    TopKAccuracy { k: usize },
}

impl Metric {
    /// Validate metric parameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Metric::TopKAccuracy { k } => {
                if k == 0 {
                    return Err(Error::InvalidConfig(
                        "TopKAccuracy requires k > 0".to_owned(),
                    ));
                }
            }
            Metric::Accuracy => {}
        }
        Ok(())
    }

    /// Name under which the metric is reported.
    pub fn name(self) -> String {
        match self {
            Metric::Accuracy => ACCURACY.to_owned(),
            Metric::TopKAccuracy { k } => format!("top{k}_acc"),
        }
    }

    /// Evaluate the metric over `[n, classes]` predictions against one-hot targets.
    pub fn compute(self, pred: &Tensor, target: &Tensor) -> Result<f32> {
        if pred.shape() != target.shape() || pred.rank() != 2 {
            return Err(Error::ShapeMismatch(format!(
                "metric needs matching [n, classes] tensors, got {:?} and {:?}",
                pred.shape(),
                target.shape()
            )));
        }
        let n = pred.num_samples();
        if n == 0 {
            return Ok(0.0);
        }

        let mut hits = 0usize;
        for i in 0..n {
            let p = pred.sample(i);
            let class = argmax(target.sample(i));
            let hit = match self {
                Metric::Accuracy => argmax(p) == class,
                Metric::TopKAccuracy { k } => {
                    let score = p[class];
                    // Rank = number of classes strictly ahead of the target class.
                    p.iter().filter(|&&v| v > score).count() < k
                }
            };
            if hit {
                hits += 1;
            }
        }
        Ok(hits as f32 / n as f32)
    }
}

/// Named metric values reported for a batch or an epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Logs(BTreeMap<String, f32>);

impl Logs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f32) {
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: f32) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.get(name).copied()
    }

    pub fn loss(&self) -> Option<f32> {
        self.get(LOSS)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Merge `other` in, prefixing every name with `val_`.
    pub fn extend_validation(&mut self, other: &Logs) {
        for (name, value) in other.iter() {
            self.insert(format!("{VAL_PREFIX}{name}"), value);
        }
    }
}

impl fmt::Display for Logs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value:.4}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(rows: &[[f32; 3]]) -> Tensor {
        Tensor::from_vec(vec![rows.len(), 3], rows.concat()).unwrap()
    }

    #[test]
    fn accuracy_uses_argmax() {
        let pred = tensor(&[[0.1, 0.8, 0.1], [0.7, 0.2, 0.1]]);
        let target = tensor(&[[0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        assert_eq!(Metric::Accuracy.compute(&pred, &target).unwrap(), 0.5);
    }

    #[test]
    fn top_k_counts_near_misses() {
        let pred = tensor(&[[0.5, 0.3, 0.2]]);
        let target = tensor(&[[0.0, 1.0, 0.0]]);
        assert_eq!(
            Metric::TopKAccuracy { k: 1 }.compute(&pred, &target).unwrap(),
            0.0
        );
        assert_eq!(
            Metric::TopKAccuracy { k: 2 }.compute(&pred, &target).unwrap(),
            1.0
        );
        assert!(Metric::TopKAccuracy { k: 0 }.validate().is_err());
    }

    #[test]
    fn logs_display_and_validation_prefix() {
        let mut logs = Logs::new().with(LOSS, 0.5).with(ACCURACY, 0.25);
        let val = Logs::new().with(LOSS, 0.75);
        logs.extend_validation(&val);
        assert_eq!(logs.get("val_loss"), Some(0.75));
        assert_eq!(logs.to_string(), "acc=0.2500 loss=0.5000 val_loss=0.7500");
    }
}
