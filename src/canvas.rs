//! Drawing surface capture.
//!
//! A canvas is an RGBA pixel buffer (4 bytes per pixel, row-major). Capturing
//! reads the **red** channel of every pixel, which on a greyscale drawing equals
//! the intensity, and yields a `[1, h, w, 1]` tensor in `[0, 255]`, the same
//! layout the IDX decoder produces.

use crate::{Error, Result, Tensor};

pub const BYTES_PER_PIXEL: usize = 4;
/// Byte offset of the captured channel within a pixel.
pub const CAPTURE_CHANNEL: usize = 0;

fn rgba_len(width: usize, height: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(|| Error::Capture(format!("{width}x{height} canvas overflows")))
}

/// Convert an RGBA buffer into a `[1, height, width, 1]` sample.
///
/// The buffer is only read.
pub fn capture(pixels: &[u8], width: usize, height: usize) -> Result<Tensor> {
    let expected = rgba_len(width, height)?;
    if width == 0 || height == 0 {
        return Err(Error::Capture(format!("canvas must be non-empty, got {width}x{height}")));
    }
    if pixels.len() != expected {
        return Err(Error::Capture(format!(
            "{width}x{height} canvas needs {expected} RGBA bytes, got {}",
            pixels.len()
        )));
    }

    let data: Vec<f32> = pixels
        .chunks_exact(BYTES_PER_PIXEL)
        .map(|px| f32::from(px[CAPTURE_CHANNEL]))
        .collect();
    Tensor::from_vec(vec![1, height, width, 1], data)
}

/// Like [`capture`], but also checks the canvas against a model's `[h, w, 1]`
/// input shape. No implicit resize is performed.
pub fn capture_for(
    pixels: &[u8],
    width: usize,
    height: usize,
    input_shape: &[usize],
) -> Result<Tensor> {
    if input_shape != [height, width, 1] {
        return Err(Error::Capture(format!(
            "{width}x{height} canvas does not match model input {input_shape:?}"
        )));
    }
    capture(pixels, width, height)
}

/// An owned RGBA drawing surface.
///
/// Strokes are recorded in display coordinates and scaled down by `scale`
/// (the ratio between the on-screen size and the sample size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    width: usize,
    height: usize,
    scale: usize,
    pixels: Vec<u8>,
}

impl Canvas {
    /// Side length of the square brush, in canvas pixels.
    pub const BRUSH: usize = 2;

    pub fn new(width: usize, height: usize, scale: usize) -> Result<Self> {
        if width == 0 || height == 0 || scale == 0 {
            return Err(Error::Capture(format!(
                "canvas size and scale must be > 0, got {width}x{height} at scale {scale}"
            )));
        }
        let mut canvas = Self {
            width,
            height,
            scale,
            pixels: vec![0; rgba_len(width, height)?],
        };
        canvas.clear();
        Ok(canvas)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Fill with opaque black.
    pub fn clear(&mut self) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }
    }

    /// Paint a white brush block at display position `(x, y)`.
    ///
    /// Parts of the brush that fall outside the canvas are clipped.
    pub fn stroke(&mut self, x: usize, y: usize) {
        let cx = x / self.scale;
        let cy = y / self.scale;
        for py in cy..(cy + Self::BRUSH).min(self.height) {
            for px in cx..(cx + Self::BRUSH).min(self.width) {
                let start = (py * self.width + px) * BYTES_PER_PIXEL;
                self.pixels[start..start + BYTES_PER_PIXEL].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }

    /// Render a greyscale sample (one intensity per pixel) as opaque grey.
    pub fn draw_sample(&mut self, intensities: &[f32]) -> Result<()> {
        if intensities.len() != self.width * self.height {
            return Err(Error::Capture(format!(
                "sample of {} pixels does not fit a {}x{} canvas",
                intensities.len(),
                self.width,
                self.height
            )));
        }
        for (px, &v) in self
            .pixels
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(intensities)
        {
            let v = v.clamp(0.0, 255.0) as u8;
            px.copy_from_slice(&[v, v, v, 255]);
        }
        Ok(())
    }

    pub fn capture(&self) -> Result<Tensor> {
        capture(&self.pixels, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_red_channel_only() {
        let pixels = [10, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 0, 1, 2, 3, 4];
        let copy = pixels;
        let t = capture(&pixels, 2, 2).unwrap();
        assert_eq!(t.shape(), &[1, 2, 2, 1]);
        assert_eq!(t.data(), &[10.0, 40.0, 70.0, 1.0]);
        assert_eq!(pixels, copy);
    }

    #[test]
    fn rejects_inconsistent_buffers() {
        assert!(matches!(capture(&[0; 15], 2, 2), Err(Error::Capture(_))));
        assert!(matches!(capture(&[], 0, 0), Err(Error::Capture(_))));
        assert!(matches!(
            capture_for(&[0; 16], 2, 2, &[28, 28, 1]),
            Err(Error::Capture(_))
        ));
        assert!(capture_for(&[0; 16], 2, 2, &[2, 2, 1]).is_ok());
    }

    #[test]
    fn stroke_paints_scaled_clipped_brush() {
        let mut canvas = Canvas::new(4, 4, 20).unwrap();
        canvas.stroke(70, 20);
        let t = canvas.capture().unwrap();
        // (70, 20) / 20 = (3, 1): the brush covers x = 3 only (clipped), y = 1..3.
        assert_eq!(t.get(&[0, 1, 3, 0]), Some(255.0));
        assert_eq!(t.get(&[0, 2, 3, 0]), Some(255.0));
        assert_eq!(t.get(&[0, 1, 2, 0]), Some(0.0));
        assert_eq!(t.data().iter().filter(|&&v| v > 0.0).count(), 2);

        canvas.clear();
        assert!(canvas.capture().unwrap().data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn drawn_sample_captures_back_unchanged() {
        let sample: Vec<f32> = (0..9).map(|v| (v * 20) as f32).collect();
        let mut canvas = Canvas::new(3, 3, 1).unwrap();
        canvas.draw_sample(&sample).unwrap();
        assert_eq!(canvas.capture().unwrap().data(), sample.as_slice());
        assert!(canvas.draw_sample(&[0.0; 4]).is_err());
    }

    #[test]
    fn oversized_canvas_is_a_capture_error() {
        let err = Canvas::new(usize::MAX / 2, 3, 1).unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert!(matches!(
            capture(&[], usize::MAX, 2).unwrap_err(),
            Error::Capture(_)
        ));
    }
}
