//! Train the reference classifier on an MNIST directory.
//!
//! `cargo run --release --example train_mnist -- <data-dir> [epochs]`

use std::env;
use std::process::ExitCode;

use mnist_pipeline::{
    CompileConfig, DirSource, FitOptions, Logs, Metric, Model, Orchestrator, PipelineConfig,
    SoftmaxClassifier, TrainingObserver, pipeline,
};

struct Progress;

impl TrainingObserver for Progress {
    fn on_epoch_end(&mut self, epoch: usize, logs: &Logs) {
        println!("epoch {epoch}: {logs}");
    }
}

fn run(dir: String, epochs: usize) -> mnist_pipeline::Result<()> {
    let config = PipelineConfig {
        epochs,
        ..PipelineConfig::default()
    };
    let data = pipeline::build(&DirSource::new(dir), &config)?;

    let mut model =
        SoftmaxClassifier::new_with_seed(&config.input_shape(), 10, config.init_seed)?;
    model.compile(&CompileConfig {
        optimizer: config.optimizer,
        metrics: vec![Metric::Accuracy],
        ..CompileConfig::default()
    })?;

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_observer(Box::new(Progress));
    let history = orchestrator
        .run(
            &mut model,
            &data.train,
            &FitOptions {
                epochs: config.epochs,
                shuffle: config.shuffle(),
                validation: data.validation.as_ref(),
            },
        )
        .map_err(|e| e.source)?;

    println!("{} batches recorded", history.len());
    Ok(())
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt().try_init();

    let mut args = env::args().skip(1);
    let Some(dir) = args.next() else {
        eprintln!("usage: train_mnist <data-dir> [epochs]");
        return ExitCode::FAILURE;
    };
    let epochs = args.next().and_then(|s| s.parse().ok()).unwrap_or(1);

    match run(dir, epochs) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
