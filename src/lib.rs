//! IDX archive decoding and training orchestration for MNIST-style datasets.
//!
//! `mnist-pipeline` turns the four raw IDX archives of an MNIST-style corpus into
//! batched, paired tensors, drives a trainable model over them while recording a
//! per-batch history, and turns a hand-drawn canvas into an inference-ready
//! sample.
//!
//! # Pipeline
//!
//! - [`idx`]: header parsing and decoding into `[n, rows, cols, 1]` image tensors
//!   and `[n, 10]` one-hot label tensors.
//! - [`preprocess`]: optional sample limit and bilinear resize (28×28 → 256×256
//!   for the large variant).
//! - [`data`]: positional pairing and fixed-size, order-preserving batching.
//! - [`train`]: the [`Model`] capability, progress observers and the
//!   [`Orchestrator`] that records the run history.
//! - [`canvas`] and [`format`]: canvas capture and display of a score vector.
//!
//! [`pipeline::build`] wires the first three stages for a [`PipelineConfig`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`; pixel intensities stay in `[0, 255]`.
//! - [`Tensor`] stores elements contiguously in row-major layout with the sample
//!   axis first.
//! - Element `[i, r, c, 0]` of a decoded image tensor is byte
//!   `16 + i*rows*cols + r*cols + c` of the archive.
//!
//! # Execution model
//!
//! Everything runs on the caller's thread. [`Model::fit`] blocks until the run
//! completes; progress observers are invoked inline. An [`Orchestrator`] accepts
//! one run at a time.
//!
//! # Quick start
//!
//! ```rust
//! use mnist_pipeline::{
//!     CompileConfig, FitOptions, Metric, Model, Optimizer, Orchestrator, SoftmaxClassifier,
//!     Tensor, data,
//! };
//!
//! # fn main() -> mnist_pipeline::Result<()> {
//! let images = Tensor::zeros(vec![8, 28, 28, 1])?;
//! let mut labels = Tensor::zeros(vec![8, 10])?;
//! for i in 0..8 {
//!     labels.data_mut()[i * 10 + i % 10] = 1.0;
//! }
//! let train = data::zip(images, labels)?.batch(4)?;
//!
//! let mut model = SoftmaxClassifier::new_with_seed(&[28, 28, 1], 10, 0)?;
//! model.compile(&CompileConfig {
//!     optimizer: Optimizer::Sgd { lr: 0.1 },
//!     metrics: vec![Metric::Accuracy],
//!     ..CompileConfig::default()
//! })?;
//!
//! let history = Orchestrator::new()
//!     .run(&mut model, &train, &FitOptions { epochs: 2, ..FitOptions::default() })
//!     .map_err(|e| e.source)?;
//! assert_eq!(history.len(), 4);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod canvas;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod idx;
pub mod loss;
pub mod metrics;
pub mod optim;
pub mod pipeline;
pub mod preprocess;
pub mod tensor;
pub mod train;

pub use archive::{ArchiveKind, ArchiveSource, DirSource};
pub use canvas::{Canvas, capture};
pub use classifier::SoftmaxClassifier;
pub use config::{PipelineConfig, Variant};
pub use data::{Batch, BatchedDataset, PairedDataset, Shuffle};
pub use error::{Error, Result};
pub use format::{Ranking, ScoreEntry};
pub use idx::{NUM_CLASSES, decode_images, decode_labels};
pub use loss::Loss;
pub use metrics::{Logs, Metric};
pub use optim::{Optimizer, OptimizerState};
pub use preprocess::Preprocessor;
pub use tensor::Tensor;
pub use train::{
    CompileConfig, FitOptions, History, HistoryEntry, Model, Orchestrator, RunError, RunState,
    TrainingObserver,
};
