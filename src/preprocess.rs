//! Image preprocessing: sample limiting and bilinear resizing.

use crate::data::{PairedDataset, zip};
use crate::{Error, Result, Tensor};

/// Native MNIST resolution.
pub const NATIVE_SIZE: (usize, usize) = (28, 28);
/// Input resolution of the large model variant.
pub const LARGE_SIZE: (usize, usize) = (256, 256);

fn validate_target(target_h: usize, target_w: usize) -> Result<()> {
    if target_h == 0 || target_w == 0 {
        return Err(Error::ShapeMismatch(format!(
            "resize target must be non-empty, got {target_h}x{target_w}"
        )));
    }
    Ok(())
}

/// Bilinear resize of a single `[h, w, 1]` sample to `[target_h, target_w, 1]`.
///
/// Sampling uses `src = dst * in / out` with edge clamping (no corner alignment,
/// no half-pixel offset), so resizing to the source size is the identity.
pub fn resize(sample: &Tensor, target_h: usize, target_w: usize) -> Result<Tensor> {
    let &[h, w, c] = sample.shape() else {
        return Err(Error::ShapeMismatch(format!(
            "expected a [h, w, 1] sample, got {:?}",
            sample.shape()
        )));
    };
    if c != 1 {
        return Err(Error::ShapeMismatch(format!(
            "resize supports single-channel samples, got {c} channels"
        )));
    }
    validate_target(target_h, target_w)?;

    let mut out = vec![0.0_f32; target_h * target_w];
    resize_plane(sample.data(), h, w, &mut out, target_h, target_w)?;
    Tensor::from_vec(vec![target_h, target_w, 1], out)
}

/// Resize every sample of a `[n, h, w, 1]` batch to `[n, target_h, target_w, 1]`.
///
/// Each sample is resized into a scratch tensor which is copied into the
/// pre-sized output and dropped before the next sample is processed.
pub fn resize_images(images: &Tensor, target_h: usize, target_w: usize) -> Result<Tensor> {
    let &[n, h, w, c] = images.shape() else {
        return Err(Error::ShapeMismatch(format!(
            "expected a [n, h, w, 1] image tensor, got {:?}",
            images.shape()
        )));
    };
    if c != 1 {
        return Err(Error::ShapeMismatch(format!(
            "resize supports single-channel images, got {c} channels"
        )));
    }
    validate_target(target_h, target_w)?;

    let mut out = Tensor::zeros(vec![n, target_h, target_w, 1])?;
    let out_len = target_h * target_w;
    for i in 0..n {
        let sample = Tensor::from_vec(vec![h, w, 1], images.sample(i).to_vec())?;
        let resized = resize(&sample, target_h, target_w)?;
        out.data_mut()[i * out_len..(i + 1) * out_len].copy_from_slice(resized.data());
    }

    log::debug!("resized {n} images from {h}x{w} to {target_h}x{target_w}");
    Ok(out)
}

fn resize_plane(
    src: &[f32],
    h: usize,
    w: usize,
    dst: &mut [f32],
    target_h: usize,
    target_w: usize,
) -> Result<()> {
    if h == 0 || w == 0 {
        return Err(Error::ShapeMismatch(format!(
            "cannot resize an empty {h}x{w} image"
        )));
    }
    let scale_y = h as f32 / target_h as f32;
    let scale_x = w as f32 / target_w as f32;

    for y in 0..target_h {
        let sy = y as f32 * scale_y;
        let y0 = (sy.floor() as usize).min(h - 1);
        let y1 = (y0 + 1).min(h - 1);
        let dy = sy - y0 as f32;

        for x in 0..target_w {
            let sx = x as f32 * scale_x;
            let x0 = (sx.floor() as usize).min(w - 1);
            let x1 = (x0 + 1).min(w - 1);
            let dx = sx - x0 as f32;

            let top = src[y0 * w + x0] + (src[y0 * w + x1] - src[y0 * w + x0]) * dx;
            let bottom = src[y1 * w + x0] + (src[y1 * w + x1] - src[y1 * w + x0]) * dx;
            dst[y * target_w + x] = top + (bottom - top) * dy;
        }
    }
    Ok(())
}

/// Optional preprocessing steps applied to a decoded image tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preprocessor {
    /// Keep only the first `limit` samples.
    pub limit: Option<usize>,
    /// Resize every sample to `(height, width)`.
    pub resize: Option<(usize, usize)>,
}

impl Preprocessor {
    /// Number of samples that survive `limit` out of `n`.
    pub fn kept(&self, n: usize) -> usize {
        self.limit.map_or(n, |limit| limit.min(n))
    }

    /// Apply the limit then, if the target differs from the current size, the resize.
    pub fn apply(&self, images: Tensor) -> Result<Tensor> {
        let n = images.num_samples();
        let kept = self.kept(n);
        let images = if kept < n {
            log::info!("keeping the first {kept} of {n} images");
            images.slice_samples(0..kept)
        } else {
            images
        };

        match self.resize {
            Some((th, tw)) if images.shape().get(1..3) != Some(&[th, tw][..]) => {
                resize_images(&images, th, tw)
            }
            _ => Ok(images),
        }
    }

    /// Limit an already paired dataset, then resize its images.
    ///
    /// Counts are compared by [`zip`] on the full archives, before any limit.
    pub fn apply_paired(&self, data: PairedDataset) -> Result<PairedDataset> {
        let kept = self.kept(data.len());
        let (images, labels) = data.take(kept).into_parts();
        zip(self.apply(images)?, labels)
    }
}
