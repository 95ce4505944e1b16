//! End-to-end dataset construction: fetch → decode → preprocess → assemble.

use crate::archive::{ArchiveKind, ArchiveSource};
use crate::config::PipelineConfig;
use crate::data::{BatchedDataset, PairedDataset, zip};
use crate::idx::{decode_images, decode_labels};
use crate::preprocess::Preprocessor;
use crate::{Result, Tensor};

/// Training batches plus optional validation data.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub train: BatchedDataset,
    pub validation: Option<PairedDataset>,
}

fn fetch_images(source: &dyn ArchiveSource, kind: ArchiveKind) -> Result<Tensor> {
    // The raw archive is dropped as soon as it is decoded.
    let raw = source.fetch(kind)?;
    decode_images(&raw)
}

fn fetch_labels(source: &dyn ArchiveSource, kind: ArchiveKind) -> Result<Tensor> {
    let raw = source.fetch(kind)?;
    decode_labels(&raw)
}

/// Load and pair one split (train or test).
pub fn load_split(
    source: &dyn ArchiveSource,
    images: ArchiveKind,
    labels: ArchiveKind,
    preprocessor: &Preprocessor,
) -> Result<PairedDataset> {
    let paired = zip(fetch_images(source, images)?, fetch_labels(source, labels)?)?;
    preprocessor.apply_paired(paired)
}

/// Build the datasets described by `config`.
pub fn build(source: &dyn ArchiveSource, config: &PipelineConfig) -> Result<Datasets> {
    config.validate()?;
    let preprocessor = config.preprocessor();

    let train = load_split(
        source,
        ArchiveKind::TrainImages,
        ArchiveKind::TrainLabels,
        &preprocessor,
    )?;
    log::info!(
        "train split: {} samples of {:?}",
        train.len(),
        train.sample_shape()
    );

    let validation = if config.validation {
        let test = load_split(
            source,
            ArchiveKind::TestImages,
            ArchiveKind::TestLabels,
            &preprocessor,
        )?;
        log::info!("validation split: {} samples", test.len());
        Some(test)
    } else {
        None
    };

    Ok(Datasets {
        train: train.batch(config.batch_size)?,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::Error;
    use crate::config::Variant;

    struct MemorySource(HashMap<ArchiveKind, Vec<u8>>);

    impl ArchiveSource for MemorySource {
        fn fetch(&self, kind: ArchiveKind) -> Result<Vec<u8>> {
            self.0
                .get(&kind)
                .cloned()
                .ok_or_else(|| Error::Decode(format!("no {kind}")))
        }
    }

    fn images(n: u32, side: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        for word in [0x803, n, side, side] {
            buf.extend_from_slice(&u32::to_be_bytes(word));
        }
        buf.extend((0..n * side * side).map(|v| (v % 256) as u8));
        buf
    }

    fn labels(n: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        for word in [0x801, n] {
            buf.extend_from_slice(&u32::to_be_bytes(word));
        }
        buf.extend((0..n).map(|v| (v % 10) as u8));
        buf
    }

    fn source(train: u32, test: u32) -> MemorySource {
        MemorySource(HashMap::from([
            (ArchiveKind::TrainImages, images(train, 28)),
            (ArchiveKind::TrainLabels, labels(train)),
            (ArchiveKind::TestImages, images(test, 28)),
            (ArchiveKind::TestLabels, labels(test)),
        ]))
    }

    #[test]
    fn builds_native_variant_with_validation() {
        let config = PipelineConfig::for_variant(Variant::Mnist);
        let data = build(&source(300, 10), &config).unwrap();
        assert_eq!(data.train.len(), 300);
        assert_eq!(data.train.batch_size(), 256);
        assert_eq!(data.train.num_batches(), 2);
        assert_eq!(data.train.data().sample_shape(), &[28, 28, 1]);
        assert_eq!(data.validation.unwrap().len(), 10);
    }

    #[test]
    fn large_variant_limits_and_resizes() {
        let config = PipelineConfig {
            sample_limit: Some(3),
            ..PipelineConfig::for_variant(Variant::MnistLarge)
        };
        let data = build(&source(5, 5), &config).unwrap();
        assert_eq!(data.train.len(), 3);
        assert_eq!(data.train.num_batches(), 1);
        assert_eq!(data.train.data().sample_shape(), &[256, 256, 1]);
        assert!(data.validation.is_none());
    }

    #[test]
    fn sample_limit_does_not_hide_count_mismatch() {
        let mut src = source(6, 6);
        src.0.insert(ArchiveKind::TrainLabels, labels(5));
        let config = PipelineConfig {
            sample_limit: Some(3),
            ..PipelineConfig::for_variant(Variant::MnistLarge)
        };
        let err = build(&src, &config).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn mismatched_split_fails_fast() {
        let mut src = source(4, 4);
        src.0.insert(ArchiveKind::TrainLabels, labels(3));
        let err = build(&src, &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }
}
