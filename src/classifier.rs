//! Reference linear softmax classifier.
//!
//! A single dense layer `logits = W · (x / 255) + b` trained with the configured
//! [`Loss`](crate::Loss) and [`Optimizer`](crate::Optimizer). It is deliberately small: it exists so the
//! pipeline can be run end to end without an external tensor library.
//!
//! Parameters are stored in one flat buffer: the `(classes, input_len)`
//! row-major weights followed by the `classes` biases.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{BatchedDataset, PairedDataset};
use crate::loss::softmax_into;
use crate::metrics::LOSS;
use crate::optim::OptimizerState;
use crate::train::{CompileConfig, FitOptions, Model, TrainingObserver};
use crate::{Error, Logs, Metric, Result, Tensor};

pub const MODEL_FORMAT_VERSION: u32 = 1;

const PIXEL_SCALE: f32 = 1.0 / 255.0;

#[derive(Debug, Clone)]
pub struct SoftmaxClassifier {
    input_shape: Vec<usize>,
    input_len: usize,
    classes: usize,
    params: Vec<f32>,
    compiled: Option<Compiled>,
}

#[derive(Debug, Clone)]
struct Compiled {
    config: CompileConfig,
    state: OptimizerState,
}

/// `(input_len, num_params)` for a `[classes, input_len]` weight matrix plus biases.
fn param_layout(input_shape: &[usize], classes: usize) -> Result<(usize, usize)> {
    if input_shape.is_empty() || input_shape.contains(&0) {
        return Err(Error::InvalidConfig(format!(
            "input shape must be non-empty, got {input_shape:?}"
        )));
    }
    if classes == 0 {
        return Err(Error::InvalidConfig("classes must be > 0".to_owned()));
    }
    let overflow = || {
        Error::InvalidConfig(format!(
            "input shape {input_shape:?} with {classes} classes overflows usize"
        ))
    };
    let input_len = input_shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(overflow)?;
    let num_params = input_len
        .checked_mul(classes)
        .and_then(|n| n.checked_add(classes))
        .ok_or_else(overflow)?;
    Ok((input_len, num_params))
}

impl SoftmaxClassifier {
    /// Build a classifier for `[h, w, c]` inputs and `classes` outputs with
    /// small uniform random weights.
    pub fn new_with_seed(input_shape: &[usize], classes: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(input_shape, classes, &mut rng)
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        input_shape: &[usize],
        classes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let (input_len, num_params) = param_layout(input_shape, classes)?;

        // Xavier/Glorot uniform.
        let limit = (6.0 / (input_len + classes) as f32).sqrt();
        let num_weights = num_params - classes;
        let mut params = Vec::with_capacity(num_params);
        for _ in 0..num_weights {
            params.push(rng.gen_range(-limit..limit));
        }
        params.extend(std::iter::repeat_n(0.0, classes));

        Ok(Self {
            input_shape: input_shape.to_vec(),
            input_len,
            classes,
            params,
            compiled: None,
        })
    }

    #[inline]
    pub fn classes(&self) -> usize {
        self.classes
    }

    #[inline]
    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    fn weights(&self) -> &[f32] {
        &self.params[..self.input_len * self.classes]
    }

    fn biases(&self) -> &[f32] {
        &self.params[self.input_len * self.classes..]
    }

    fn logits_into(&self, x: &[f32], out: &mut [f32]) {
        let w = self.weights();
        for (k, (o, &b)) in out.iter_mut().zip(self.biases()).enumerate() {
            let row = &w[k * self.input_len..(k + 1) * self.input_len];
            let mut acc = 0.0_f32;
            for (&wi, &xi) in row.iter().zip(x) {
                acc = wi.mul_add(xi * PIXEL_SCALE, acc);
            }
            *o = acc + b;
        }
    }

    fn check_input(&self, images: &Tensor) -> Result<()> {
        if images.shape().get(1..) != Some(self.input_shape.as_slice()) {
            return Err(Error::ShapeMismatch(format!(
                "model expects [n, {}] inputs, got {:?}",
                self.input_shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                images.shape()
            )));
        }
        Ok(())
    }

    fn check_labels(&self, labels: &Tensor) -> Result<()> {
        if labels.shape().get(1) != Some(&self.classes) {
            return Err(Error::ShapeMismatch(format!(
                "model has {} classes, labels have shape {:?}",
                self.classes,
                labels.shape()
            )));
        }
        Ok(())
    }

    /// One optimizer step over a batch; returns the batch logs.
    fn train_batch(&mut self, images: &Tensor, labels: &Tensor) -> Result<Logs> {
        let compiled = self
            .compiled
            .as_ref()
            .ok_or_else(|| Error::Training("model must be compiled before fit".to_owned()))?;
        let loss_fn = compiled.config.loss;
        let n = images.num_samples();
        if n == 0 {
            return Err(Error::Training("empty batch".to_owned()));
        }

        let mut grads = vec![0.0_f32; self.params.len()];
        let mut logits = vec![0.0_f32; self.classes];
        let mut d_logits = vec![0.0_f32; self.classes];
        let mut probs = vec![0.0_f32; n * self.classes];
        let mut loss_sum = 0.0_f32;
        let inv_n = 1.0 / n as f32;
        let bias_offset = self.input_len * self.classes;

        for i in 0..n {
            let x = images.sample(i);
            let t = labels.sample(i);
            self.logits_into(x, &mut logits);
            softmax_into(&logits, &mut probs[i * self.classes..(i + 1) * self.classes]);
            loss_sum += loss_fn.backward(&logits, t, &mut d_logits);

            for (k, &g) in d_logits.iter().enumerate() {
                let g = g * inv_n;
                let row = &mut grads[k * self.input_len..(k + 1) * self.input_len];
                for (gw, &xi) in row.iter_mut().zip(x) {
                    *gw += g * xi * PIXEL_SCALE;
                }
                grads[bias_offset + k] += g;
            }
        }

        let loss = loss_sum * inv_n;
        if !loss.is_finite() {
            return Err(Error::Training(format!("loss diverged to {loss}")));
        }

        let probs = Tensor::from_vec(vec![n, self.classes], probs)?;
        let mut logs = Logs::new().with(LOSS, loss);
        for metric in &compiled.config.metrics {
            logs.insert(metric.name(), metric.compute(&probs, labels)?);
        }

        let compiled = self
            .compiled
            .as_mut()
            .ok_or_else(|| Error::Training("model must be compiled before fit".to_owned()))?;
        compiled.state.step(&mut self.params, &grads);
        Ok(logs)
    }

    /// Loss and compiled metrics over a whole dataset.
    pub fn evaluate(&self, data: &PairedDataset) -> Result<Logs> {
        let config = self
            .compiled
            .as_ref()
            .map(|c| c.config.clone())
            .unwrap_or_else(|| CompileConfig {
                metrics: vec![Metric::Accuracy],
                ..CompileConfig::default()
            });
        self.check_input(data.images())?;
        self.check_labels(data.labels())?;

        let probs = self.predict(data.images())?;
        let mut logits = vec![0.0_f32; self.classes];
        let mut loss_sum = 0.0_f32;
        for i in 0..data.len() {
            let (x, t) = data.example(i);
            self.logits_into(x, &mut logits);
            loss_sum += config.loss.forward(&logits, t);
        }

        let n = data.len().max(1) as f32;
        let mut logs = Logs::new().with(LOSS, loss_sum / n);
        for metric in &config.metrics {
            logs.insert(metric.name(), metric.compute(&probs, data.labels())?);
        }
        Ok(logs)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        let ser = SerializedClassifier {
            format_version: MODEL_FORMAT_VERSION,
            input_shape: self.input_shape.clone(),
            classes: self.classes,
            params: self.params.clone(),
        };
        serde_json::to_string_pretty(&ser)
            .map_err(|e| Error::Training(format!("failed to serialize model: {e}")))
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedClassifier = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse model json: {e}")))?;
        ser.try_into()
    }

    /// Load a model written by [`Model::save`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }
}

impl Model for SoftmaxClassifier {
    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn compile(&mut self, config: &CompileConfig) -> Result<()> {
        for metric in &config.metrics {
            metric.validate()?;
        }
        let state = config.optimizer.state(self.params.len())?;
        self.compiled = Some(Compiled {
            config: config.clone(),
            state,
        });
        Ok(())
    }

    fn fit(
        &mut self,
        train: &BatchedDataset,
        options: &FitOptions<'_>,
        observer: &mut dyn TrainingObserver,
    ) -> Result<()> {
        if self.compiled.is_none() {
            return Err(Error::Training("model must be compiled before fit".to_owned()));
        }
        self.check_input(train.data().images())?;
        self.check_labels(train.data().labels())?;
        if train.is_empty() {
            return Err(Error::Training("train dataset must not be empty".to_owned()));
        }

        for epoch in 0..options.epochs {
            observer.on_epoch_begin(epoch);

            let mut totals = Logs::new();
            for batch in train.iter_with(options.shuffle_for_epoch(epoch)) {
                let logs = self.train_batch(&batch.images, &batch.labels)?;
                let weight = batch.len() as f32 / train.len() as f32;
                for (name, value) in logs.iter() {
                    let acc = totals.get(name).unwrap_or(0.0);
                    totals.insert(name, acc + value * weight);
                }
                observer.on_batch_end(batch.index, &logs);
            }

            if let Some(validation) = options.validation {
                let val = self.evaluate(validation)?;
                totals.extend_validation(&val);
            }
            observer.on_epoch_end(epoch, &totals);
        }
        Ok(())
    }

    fn predict(&self, input: &Tensor) -> Result<Tensor> {
        self.check_input(input)?;
        let n = input.num_samples();
        let mut out = vec![0.0_f32; n * self.classes];
        let mut logits = vec![0.0_f32; self.classes];
        for i in 0..n {
            self.logits_into(input.sample(i), &mut logits);
            softmax_into(&logits, &mut out[i * self.classes..(i + 1) * self.classes]);
        }
        Tensor::from_vec(vec![n, self.classes], out)
    }

    fn save(&self, destination: &Path) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        std::fs::write(destination, s).map_err(|e| Error::io(destination, e))?;
        log::info!("saved model to {}", destination.display());
        Ok(())
    }
}

/// Versioned on-disk format. Internal fields are not serialized directly so the
/// file format can stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SerializedClassifier {
    format_version: u32,
    input_shape: Vec<usize>,
    classes: usize,
    params: Vec<f32>,
}

impl TryFrom<SerializedClassifier> for SoftmaxClassifier {
    type Error = Error;

    fn try_from(value: SerializedClassifier) -> std::result::Result<Self, Self::Error> {
        if value.format_version != MODEL_FORMAT_VERSION {
            return Err(Error::InvalidConfig(format!(
                "unsupported model format_version {}; expected {}",
                value.format_version, MODEL_FORMAT_VERSION
            )));
        }
        let (input_len, num_params) = param_layout(&value.input_shape, value.classes)?;
        if value.params.len() != num_params {
            return Err(Error::InvalidConfig(format!(
                "params length {} does not match {} for input {:?} and {} classes",
                value.params.len(),
                num_params,
                value.input_shape,
                value.classes
            )));
        }
        if value.params.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig(
                "params must contain only finite values".to_owned(),
            ));
        }
        Ok(SoftmaxClassifier {
            input_shape: value.input_shape,
            input_len,
            classes: value.classes,
            params: value.params,
            compiled: None,
        })
    }
}
