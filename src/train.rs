//! Training orchestration.
//!
//! The model owns its training loop ([`Model::fit`]); the [`Orchestrator`]
//! hands it a progress sink that records one [`HistoryEntry`] per completed
//! batch and forwards every event to the registered [`TrainingObserver`]s.
//!
//! Events arrive in the order epoch-begin → batch-end × N → epoch-end, one epoch
//! at a time. Observers are invoked synchronously, after the history has been
//! updated, in registration order.
//!
//! An orchestrator runs at most one training run at a time. Calling
//! [`Orchestrator::run`] while a run is in flight (for example from inside a
//! model or an observer) returns [`Error::RunInFlight`] and leaves the history of
//! the active run untouched.

use std::cell::{Cell, RefCell};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{BatchedDataset, PairedDataset, Shuffle};
use crate::{Error, Logs, Loss, Metric, Optimizer, Result, Tensor};

/// Settings passed to [`Model::compile`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompileConfig {
    pub loss: Loss,
    pub optimizer: Optimizer,
    pub metrics: Vec<Metric>,
}

/// Settings for one call to [`Model::fit`].
#[derive(Debug, Clone, Copy)]
pub struct FitOptions<'a> {
    pub epochs: usize,
    /// Applied per epoch traversal; epoch `e` uses `Seeded(seed + e)`.
    pub shuffle: Shuffle,
    /// Evaluated after every epoch and reported with a `val_` prefix.
    pub validation: Option<&'a PairedDataset>,
}

impl Default for FitOptions<'_> {
    fn default() -> Self {
        Self {
            epochs: 1,
            shuffle: Shuffle::None,
            validation: None,
        }
    }
}

impl FitOptions<'_> {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        Ok(())
    }

    /// Sample order to use for epoch `epoch`.
    pub fn shuffle_for_epoch(&self, epoch: usize) -> Shuffle {
        match self.shuffle {
            Shuffle::None => Shuffle::None,
            Shuffle::Seeded(seed) => Shuffle::Seeded(seed.wrapping_add(epoch as u64)),
        }
    }
}

/// Capability of a trainable model.
///
/// Implementations own the numerics. `fit` must report progress through
/// `observer` in epoch-begin → batch-end × N → epoch-end order.
pub trait Model {
    /// Expected per-sample input shape, e.g. `[28, 28, 1]`.
    fn input_shape(&self) -> &[usize];

    fn compile(&mut self, config: &CompileConfig) -> Result<()>;

    fn fit(
        &mut self,
        train: &BatchedDataset,
        options: &FitOptions<'_>,
        observer: &mut dyn TrainingObserver,
    ) -> Result<()>;

    /// Predict `[n, classes]` scores for a `[n, h, w, c]` input.
    fn predict(&self, input: &Tensor) -> Result<Tensor>;

    fn save(&self, destination: &Path) -> Result<()>;
}

/// Progress hooks. Every method defaults to a no-op.
pub trait TrainingObserver {
    fn on_epoch_begin(&mut self, _epoch: usize) {}

    fn on_batch_end(&mut self, _batch: usize, _logs: &Logs) {}

    fn on_epoch_end(&mut self, _epoch: usize, _logs: &Logs) {}
}

/// Metrics reported for one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub epoch: usize,
    pub batch: usize,
    pub logs: Logs,
}

/// Metrics reported at the end of an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub logs: Logs,
}

/// Append-only record of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
    epochs: Vec<EpochSummary>,
}

impl History {
    /// Batch entries in completion order.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn epoch_summaries(&self) -> &[EpochSummary] {
        &self.epochs
    }

    /// Number of batch entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Batch entries recorded during `epoch`.
    pub fn epoch(&self, epoch: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(move |e| e.epoch == epoch)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Training(format!("failed to serialize history: {e}")))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let p = path.as_ref();
        std::fs::write(p, self.to_json()?).map_err(|e| Error::io(p, e))
    }
}

/// Lifecycle of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// The last run failed. A new run may be started.
    Failed,
}

/// A failed training run together with the history collected before the failure.
#[derive(Debug, Error)]
#[error("training run failed after {} batches: {source}", .history.len())]
pub struct RunError {
    #[source]
    pub source: Error,
    pub history: History,
}

/// Drives [`Model::fit`] and records its progress.
#[derive(Default)]
pub struct Orchestrator {
    observers: RefCell<Vec<Box<dyn TrainingObserver>>>,
    state: Cell<RunState>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers are invoked in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn TrainingObserver>) {
        self.observers.get_mut().push(observer);
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state.get() == RunState::Running
    }

    /// Train `model` on `train` for `options.epochs` epochs.
    ///
    /// On success returns the full history. On failure returns a [`RunError`]
    /// holding the entries recorded before the model failed; the orchestrator
    /// is then in [`RunState::Failed`] and accepts a new run.
    pub fn run<M: Model + ?Sized>(
        &self,
        model: &mut M,
        train: &BatchedDataset,
        options: &FitOptions<'_>,
    ) -> std::result::Result<History, RunError> {
        if self.is_running() {
            log::warn!("rejecting training run: another run is in flight");
            return Err(RunError {
                source: Error::RunInFlight,
                history: History::default(),
            });
        }
        if let Err(source) = options.validate() {
            return Err(RunError {
                source,
                history: History::default(),
            });
        }

        let mut guard = RunGuard::start(&self.state);
        log::info!(
            "training for {} epochs over {} samples ({} batches of {})",
            options.epochs,
            train.len(),
            train.num_batches(),
            train.batch_size()
        );

        let mut observers = self.observers.borrow_mut();
        let mut recorder = Recorder {
            history: History::default(),
            observers: observers.as_mut_slice(),
            current_epoch: None,
        };
        let outcome = model.fit(train, options, &mut recorder);
        let history = recorder.history;
        drop(observers);

        match outcome {
            Ok(()) => {
                guard.outcome = RunState::Idle;
                log::info!("training finished after {} batches", history.len());
                Ok(history)
            }
            Err(source) => {
                log::error!(
                    "training failed after {} batches: {source}",
                    history.len()
                );
                Err(RunError { source, history })
            }
        }
    }
}

/// Holds the orchestrator in `Running` for one run.
///
/// On drop the state becomes `outcome`, which stays `Failed` unless the run
/// completed, including when the model panics.
struct RunGuard<'a> {
    state: &'a Cell<RunState>,
    outcome: RunState,
}

impl<'a> RunGuard<'a> {
    fn start(state: &'a Cell<RunState>) -> Self {
        state.set(RunState::Running);
        Self {
            state,
            outcome: RunState::Failed,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.set(self.outcome);
    }
}

/// Progress sink handed to the model for the duration of one run.
struct Recorder<'a> {
    history: History,
    observers: &'a mut [Box<dyn TrainingObserver>],
    current_epoch: Option<usize>,
}

impl TrainingObserver for Recorder<'_> {
    fn on_epoch_begin(&mut self, epoch: usize) {
        if let Some(open) = self.current_epoch {
            log::warn!("epoch {epoch} began before epoch {open} ended");
        }
        self.current_epoch = Some(epoch);
        log::info!("epoch {epoch} started");
        for observer in self.observers.iter_mut() {
            observer.on_epoch_begin(epoch);
        }
    }

    fn on_batch_end(&mut self, batch: usize, logs: &Logs) {
        let epoch = match self.current_epoch {
            Some(epoch) => epoch,
            None => {
                log::warn!("batch {batch} ended outside of an epoch");
                self.history.epochs.last().map_or(0, |s| s.epoch)
            }
        };
        log::debug!("epoch {epoch} batch {batch}: {logs}");
        self.history.entries.push(HistoryEntry {
            epoch,
            batch,
            logs: logs.clone(),
        });
        for observer in self.observers.iter_mut() {
            observer.on_batch_end(batch, logs);
        }
    }

    fn on_epoch_end(&mut self, epoch: usize, logs: &Logs) {
        if self.current_epoch != Some(epoch) {
            log::warn!("epoch {epoch} ended but was never started");
        }
        self.current_epoch = None;
        log::info!("epoch {epoch} finished: {logs}");
        self.history.epochs.push(EpochSummary {
            epoch,
            logs: logs.clone(),
        });
        for observer in self.observers.iter_mut() {
            observer.on_epoch_end(epoch, logs);
        }
    }
}
