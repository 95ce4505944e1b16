//! Dense row-major tensors.
//!
//! Every pipeline stage exchanges `Tensor` values. The first axis is always the
//! sample axis (`[n, h, w, c]` for images, `[n, classes]` for labels), so most
//! helpers here operate on whole samples ("rows") rather than single elements.

use std::fmt;
use std::ops::Range;

use crate::{Error, Result};

/// An owned `f32` tensor with a row-major layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

fn element_count(shape: &[usize]) -> Result<usize> {
    shape.iter().try_fold(1usize, |acc, &d| {
        acc.checked_mul(d)
            .ok_or_else(|| Error::ShapeMismatch(format!("shape {shape:?} overflows usize")))
    })
}

impl Tensor {
    /// Wrap `data` with `shape`.
    ///
    /// Fails if the shape does not describe exactly `data.len()` elements.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(Error::ShapeMismatch(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let len = element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![0.0; len],
        })
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    #[inline]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Reinterpret the same elements with a new shape. No element is moved.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self> {
        Self::from_vec(shape, self.data)
    }

    /// Flat offset of a multi-dimensional index, or `None` if out of bounds.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &d) in index.iter().zip(&self.shape) {
            if i >= d {
                return None;
            }
            offset = offset * d + i;
        }
        Some(offset)
    }

    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.offset(index).map(|o| self.data[o])
    }

    /// Number of samples (size of the first axis).
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per sample (product of all axes but the first).
    #[inline]
    pub fn sample_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Returns the `idx`-th sample as a flat slice.
    ///
    /// Panics if `idx >= num_samples()`.
    #[inline]
    pub fn sample(&self, idx: usize) -> &[f32] {
        let len = self.sample_len();
        let start = idx * len;
        &self.data[start..start + len]
    }

    /// Copy the samples in `range` into a new tensor.
    ///
    /// Panics if the range is out of bounds.
    pub fn slice_samples(&self, range: Range<usize>) -> Tensor {
        let len = self.sample_len();
        let mut shape = self.shape.clone();
        shape[0] = range.len();
        Tensor {
            shape,
            data: self.data[range.start * len..range.end * len].to_vec(),
        }
    }

    /// Copy the samples at `indices` (in that order) into a new tensor.
    ///
    /// Panics if any index is out of bounds.
    pub fn gather_samples(&self, indices: &[usize]) -> Tensor {
        let len = self.sample_len();
        let mut data = Vec::with_capacity(indices.len() * len);
        for &idx in indices {
            data.extend_from_slice(self.sample(idx));
        }
        let mut shape = self.shape.clone();
        shape[0] = indices.len();
        Tensor { shape, data }
    }

    /// Index of the largest element of each sample. Ties resolve to the first index.
    pub fn argmax_per_sample(&self) -> Vec<usize> {
        (0..self.num_samples())
            .map(|i| argmax(self.sample(i)))
            .collect()
    }
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
        write!(f, "Tensor[{}]", dims.join("x"))
    }
}
