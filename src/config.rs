//! Pipeline configuration.
//!
//! A [`PipelineConfig`] starts from a [`Variant`] preset and may be loaded from
//! a JSON file; any field omitted in the file keeps the value of the preset the
//! file selects.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Shuffle;
use crate::preprocess::{LARGE_SIZE, NATIVE_SIZE, Preprocessor};
use crate::{Error, Optimizer, Result};

/// Model input geometry presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Native 28×28 input, batches of 256.
    #[default]
    Mnist,
    /// 256×256 input (resized), batches of 256, first 100 training samples.
    MnistLarge,
}

impl Variant {
    pub fn input_size(self) -> (usize, usize) {
        match self {
            Variant::Mnist => NATIVE_SIZE,
            Variant::MnistLarge => LARGE_SIZE,
        }
    }

    pub fn batch_size(self) -> usize {
        256
    }

    pub fn sample_limit(self) -> Option<usize> {
        match self {
            Variant::Mnist => None,
            Variant::MnistLarge => Some(100),
        }
    }

    /// Whether the preset trains against the test split as validation data.
    pub fn uses_validation(self) -> bool {
        matches!(self, Variant::Mnist)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub variant: Variant,
    pub batch_size: usize,
    pub epochs: usize,
    pub optimizer: Optimizer,
    /// `None` trains in stored order.
    pub shuffle_seed: Option<u64>,
    /// Keep only the first N samples of each split.
    pub sample_limit: Option<usize>,
    /// `(height, width)` fed to the model.
    pub input_size: (usize, usize),
    pub validation: bool,
    /// Seed for the reference model's initial weights.
    pub init_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

impl PipelineConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            batch_size: variant.batch_size(),
            epochs: 1,
            optimizer: Optimizer::default(),
            shuffle_seed: Some(0),
            sample_limit: variant.sample_limit(),
            input_size: variant.input_size(),
            validation: variant.uses_validation(),
            init_seed: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(Error::InvalidConfig(format!(
                "input_size must be non-empty, got {:?}",
                self.input_size
            )));
        }
        if self.sample_limit == Some(0) {
            return Err(Error::InvalidConfig("sample_limit must be > 0".to_owned()));
        }
        self.optimizer.validate()
    }

    /// Parse a JSON config. Fields missing from `s` take the value of the preset
    /// named by its `variant` field (or the default variant).
    pub fn from_json_str(s: &str) -> Result<Self> {
        let parse_err = |e: serde_json::Error| {
            Error::InvalidConfig(format!("failed to parse config json: {e}"))
        };
        let overrides: serde_json::Value = serde_json::from_str(s).map_err(parse_err)?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(Error::InvalidConfig(
                "config json must be an object".to_owned(),
            ));
        };

        let variant = match overrides.get("variant") {
            Some(v) => Variant::deserialize(v).map_err(parse_err)?,
            None => Variant::default(),
        };
        let mut merged = serde_json::to_value(Self::for_variant(variant)).map_err(parse_err)?;
        if let serde_json::Value::Object(base) = &mut merged {
            base.extend(overrides);
        }

        let cfg = Self::deserialize(merged).map_err(parse_err)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p).map_err(|e| Error::io(p, e))?;
        Self::from_json_str(&s)
    }

    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor {
            limit: self.sample_limit,
            resize: Some(self.input_size),
        }
    }

    pub fn shuffle(&self) -> Shuffle {
        self.shuffle_seed.map_or(Shuffle::None, Shuffle::Seeded)
    }

    /// Per-sample model input shape `[h, w, 1]`.
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_size.0, self.input_size.1, 1]
    }
}
