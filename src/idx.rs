//! IDX archive decoding.
//!
//! Image archives (`idx3`) carry a 16-byte header of four big-endian `u32`s
//! (magic, sample count, rows, cols) followed by one unsigned byte per pixel,
//! row-major per sample. Label archives (`idx1`) carry an 8-byte header (magic,
//! sample count) followed by one class id per byte.
//!
//! Decoding is a pure function of the buffer. The header magic is reported but
//! never validated; payload lengths are.

use crate::{Error, Result, Tensor};

/// Number of label classes in MNIST-style archives.
pub const NUM_CLASSES: usize = 10;

pub const IMAGE_HEADER_LEN: usize = 16;
pub const LABEL_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u32,
    pub samples: usize,
    pub rows: usize,
    pub cols: usize,
}

impl ImageHeader {
    /// Bytes per sample (`rows * cols`).
    pub fn sample_len(&self) -> Result<usize> {
        self.rows
            .checked_mul(self.cols)
            .ok_or_else(|| Error::Decode(format!("{}x{} image overflows", self.rows, self.cols)))
    }

    /// Expected payload length (`samples * rows * cols`).
    pub fn payload_len(&self) -> Result<usize> {
        self.sample_len()?
            .checked_mul(self.samples)
            .ok_or_else(|| Error::Decode(format!("{} samples overflow", self.samples)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelHeader {
    pub magic: u32,
    /// Count stored in the header. Informational; the payload length is authoritative.
    pub samples: usize,
}

/// Read a big-endian `u32` at `offset`, failing if the buffer is too short.
pub fn read_be_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let end = offset
        .checked_add(4)
        .ok_or_else(|| Error::Decode(format!("offset {offset} overflows")))?;
    let bytes = buf.get(offset..end).ok_or_else(|| {
        Error::Decode(format!(
            "buffer of {} bytes too short to read u32 at offset {offset}",
            buf.len()
        ))
    })?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_be_bytes(word))
}

pub fn read_image_header(buf: &[u8]) -> Result<ImageHeader> {
    Ok(ImageHeader {
        magic: read_be_u32(buf, 0)?,
        samples: read_be_u32(buf, 4)? as usize,
        rows: read_be_u32(buf, 8)? as usize,
        cols: read_be_u32(buf, 12)? as usize,
    })
}

pub fn read_label_header(buf: &[u8]) -> Result<LabelHeader> {
    Ok(LabelHeader {
        magic: read_be_u32(buf, 0)?,
        samples: read_be_u32(buf, 4)? as usize,
    })
}

/// Decode an image archive into a `[samples, rows, cols, 1]` tensor of raw
/// pixel intensities in `[0, 255]`.
///
/// Element `[i, r, c, 0]` is `buf[16 + i*rows*cols + r*cols + c]`.
pub fn decode_images(buf: &[u8]) -> Result<Tensor> {
    let header = read_image_header(buf)?;
    let expected = header.payload_len()?;
    let payload = &buf[IMAGE_HEADER_LEN..];
    if payload.len() != expected {
        return Err(Error::Decode(format!(
            "image payload is {} bytes, header declares {} samples of {}x{} ({expected} bytes)",
            payload.len(),
            header.samples,
            header.rows,
            header.cols
        )));
    }

    let data: Vec<f32> = payload.iter().map(|&b| f32::from(b)).collect();
    log::debug!(
        "decoded {} images of {}x{}",
        header.samples,
        header.rows,
        header.cols
    );
    Tensor::from_vec(vec![header.samples, header.rows, header.cols, 1], data)
}

/// Decode a label archive into a `[samples, NUM_CLASSES]` one-hot tensor.
pub fn decode_labels(buf: &[u8]) -> Result<Tensor> {
    decode_labels_with(buf, NUM_CLASSES)
}

/// Decode a label archive into a `[samples, num_classes]` one-hot tensor.
///
/// The sample count is taken from the payload length. A class id outside
/// `0..num_classes` is a decode error.
pub fn decode_labels_with(buf: &[u8], num_classes: usize) -> Result<Tensor> {
    if num_classes == 0 {
        return Err(Error::InvalidConfig("num_classes must be > 0".to_owned()));
    }
    let header = read_label_header(buf)?;
    let payload = &buf[LABEL_HEADER_LEN..];
    if header.samples != payload.len() {
        log::warn!(
            "label header declares {} samples but payload holds {}",
            header.samples,
            payload.len()
        );
    }

    let mut data = vec![0.0_f32; payload.len() * num_classes];
    for (i, &class) in payload.iter().enumerate() {
        let class = usize::from(class);
        if class >= num_classes {
            return Err(Error::Decode(format!(
                "label {i} has class id {class}, expected < {num_classes}"
            )));
        }
        data[i * num_classes + class] = 1.0;
    }

    log::debug!("decoded {} labels", payload.len());
    Tensor::from_vec(vec![payload.len(), num_classes], data)
}
