//! Dataset assembly.
//!
//! `zip` pairs an image tensor with a label tensor by position, and
//! `PairedDataset::batch` partitions the pairs into fixed-size, order-preserving
//! batches. Batches are materialized lazily: each call to `BatchedDataset::iter`
//! walks the dataset again from the first sample.

use std::ops::Range;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::{Error, Result, Tensor};

/// Sample order for one traversal of a [`BatchedDataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shuffle {
    /// Stored order.
    #[default]
    None,
    /// A permutation derived from the seed. The same seed yields the same order.
    Seeded(u64),
}

/// Images and labels paired by sample position.
///
/// - `images` has shape `[len, h, w, c]`
/// - `labels` has shape `[len, classes]`
#[derive(Debug, Clone)]
pub struct PairedDataset {
    images: Tensor,
    labels: Tensor,
}

/// Pair `images` and `labels` element-wise by index.
///
/// Fails if the sample counts differ; the tail is never dropped.
pub fn zip(images: Tensor, labels: Tensor) -> Result<PairedDataset> {
    if images.rank() < 2 {
        return Err(Error::ShapeMismatch(format!(
            "images must have a sample axis, got shape {:?}",
            images.shape()
        )));
    }
    if labels.rank() != 2 {
        return Err(Error::ShapeMismatch(format!(
            "labels must have shape [len, classes], got {:?}",
            labels.shape()
        )));
    }
    if images.num_samples() != labels.num_samples() {
        return Err(Error::ShapeMismatch(format!(
            "images/labels length mismatch: {} vs {}",
            images.num_samples(),
            labels.num_samples()
        )));
    }

    Ok(PairedDataset { images, labels })
}

impl PairedDataset {
    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.images.num_samples()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn images(&self) -> &Tensor {
        &self.images
    }

    #[inline]
    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    /// Per-sample image shape (everything but the sample axis).
    pub fn sample_shape(&self) -> &[usize] {
        &self.images.shape()[1..]
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.labels.shape()[1]
    }

    /// Returns the `idx`-th `(image, label)` pair as flat slices.
    ///
    /// Panics if `idx >= len`.
    pub fn example(&self, idx: usize) -> (&[f32], &[f32]) {
        (self.images.sample(idx), self.labels.sample(idx))
    }

    /// Partition into batches of `batch_size` samples; the last batch may be shorter.
    pub fn batch(self, batch_size: usize) -> Result<BatchedDataset> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(BatchedDataset {
            data: self,
            batch_size,
        })
    }

    /// Keep the first `k` pairs (all of them if `k >= len`).
    pub fn take(self, k: usize) -> PairedDataset {
        if k >= self.len() {
            return self;
        }
        PairedDataset {
            images: self.images.slice_samples(0..k),
            labels: self.labels.slice_samples(0..k),
        }
    }

    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.images, self.labels)
    }
}

/// A paired dataset partitioned into fixed-size batches.
#[derive(Debug, Clone)]
pub struct BatchedDataset {
    data: PairedDataset,
    batch_size: usize,
}

impl BatchedDataset {
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per traversal: `ceil(len / batch_size)`.
    #[inline]
    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &PairedDataset {
        &self.data
    }

    pub fn into_inner(self) -> PairedDataset {
        self.data
    }

    /// Sample range of batch `idx` in stored order.
    pub fn batch_range(&self, idx: usize) -> Range<usize> {
        let start = idx * self.batch_size;
        start..(start + self.batch_size).min(self.data.len())
    }

    /// Traverse the batches in stored order.
    pub fn iter(&self) -> Batches<'_> {
        self.iter_with(Shuffle::None)
    }

    /// Traverse the batches, optionally over a shuffled permutation of the samples.
    ///
    /// The stored order is left untouched; only this traversal is permuted.
    pub fn iter_with(&self, shuffle: Shuffle) -> Batches<'_> {
        let order = match shuffle {
            Shuffle::None => None,
            Shuffle::Seeded(seed) => {
                let mut order: Vec<usize> = (0..self.data.len()).collect();
                let mut rng = StdRng::seed_from_u64(seed);
                order.shuffle(&mut rng);
                Some(order)
            }
        };
        Batches {
            dataset: self,
            order,
            next: 0,
        }
    }
}

impl<'a> IntoIterator for &'a BatchedDataset {
    type Item = Batch;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One batch of paired samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Position of this batch within its traversal.
    pub index: usize,
    /// Source sample indices, in batch order.
    pub indices: Vec<usize>,
    /// `[b, h, w, c]`
    pub images: Tensor,
    /// `[b, classes]`
    pub labels: Tensor,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Lazy batch iterator returned by [`BatchedDataset::iter`].
#[derive(Debug)]
pub struct Batches<'a> {
    dataset: &'a BatchedDataset,
    order: Option<Vec<usize>>,
    next: usize,
}

impl Iterator for Batches<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.next >= self.dataset.num_batches() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let range = self.dataset.batch_range(index);
        let data = &self.dataset.data;
        let batch = match &self.order {
            None => Batch {
                index,
                indices: range.clone().collect(),
                images: data.images.slice_samples(range.clone()),
                labels: data.labels.slice_samples(range),
            },
            Some(order) => {
                let indices = order[range].to_vec();
                Batch {
                    index,
                    images: data.images.gather_samples(&indices),
                    labels: data.labels.gather_samples(&indices),
                    indices,
                }
            }
        };
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.dataset.num_batches().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(len: usize) -> PairedDataset {
        let images = Tensor::from_vec(
            vec![len, 1, 2, 1],
            (0..len * 2).map(|v| v as f32).collect(),
        )
        .unwrap();
        let mut labels = vec![0.0_f32; len * 10];
        for i in 0..len {
            labels[i * 10 + i % 10] = 1.0;
        }
        let labels = Tensor::from_vec(vec![len, 10], labels).unwrap();
        zip(images, labels).unwrap()
    }

    #[test]
    fn zip_rejects_mismatched_lengths() {
        let images = Tensor::zeros(vec![3, 2, 2, 1]).unwrap();
        let labels = Tensor::zeros(vec![2, 10]).unwrap();
        let err = zip(images, labels).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn take_keeps_leading_pairs_aligned() {
        let data = dataset(5).take(3);
        assert_eq!(data.len(), 3);
        assert_eq!(data.labels().num_samples(), 3);
        let (image, label) = data.example(2);
        assert_eq!(image, &[4.0, 5.0]);
        assert_eq!(label[2], 1.0);
        assert_eq!(dataset(2).take(10).len(), 2);
    }

    #[test]
    fn batching_law_holds() {
        for (n, b) in [(10, 3), (9, 3), (1, 32), (100, 32), (7, 7)] {
            let data = dataset(n);
            let original = data.images().data().to_vec();
            let batched = data.batch(b).unwrap();

            assert_eq!(batched.num_batches(), n.div_ceil(b));
            let batches: Vec<Batch> = batched.iter().collect();
            assert_eq!(batches.len(), n.div_ceil(b));

            let mut concat = Vec::new();
            for (i, batch) in batches.iter().enumerate() {
                assert_eq!(batch.index, i);
                assert!(batch.len() <= b);
                concat.extend_from_slice(batch.images.data());
            }
            assert_eq!(concat, original);
        }
    }

    #[test]
    fn final_batch_may_be_short() {
        let batched = dataset(10).batch(4).unwrap();
        let sizes: Vec<usize> = batched.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn iteration_is_restartable_and_deterministic() {
        let batched = dataset(10).batch(4).unwrap();
        let first: Vec<Batch> = batched.iter().collect();
        let second: Vec<Batch> = batched.iter().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn shuffled_traversal_keeps_pairs_aligned() {
        let batched = dataset(20).batch(6).unwrap();
        let mut seen = Vec::new();
        for batch in batched.iter_with(Shuffle::Seeded(7)) {
            for (row, &src) in batch.indices.iter().enumerate() {
                let (image, label) = batched.data().example(src);
                assert_eq!(batch.images.sample(row), image);
                assert_eq!(batch.labels.sample(row), label);
            }
            seen.extend(batch.indices);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());

        // Stored order is untouched.
        let first = batched.iter().next().unwrap();
        assert_eq!(first.indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(matches!(
            dataset(3).batch(0),
            Err(Error::InvalidConfig(_))
        ));
    }
}
