use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use mnist_pipeline::archive::{ArchiveKind, ArchiveSource, DirSource};
use mnist_pipeline::canvas::{Canvas, capture_for};
use mnist_pipeline::idx::{read_image_header, read_label_header};
use mnist_pipeline::metrics::LOSS;
use mnist_pipeline::{
    CompileConfig, FitOptions, Logs, Metric, Model, Orchestrator, PipelineConfig,
    SoftmaxClassifier, TrainingObserver, Variant, decode_images, format, pipeline,
};

#[derive(Debug, Parser)]
#[command(name = "mnist-pipeline", version, about = "Decode, train on and query MNIST-style IDX archives")]
struct Cli {
    /// Log per-batch progress.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    Mnist,
    MnistLarge,
}

impl From<VariantArg> for Variant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::Mnist => Variant::Mnist,
            VariantArg::MnistLarge => Variant::MnistLarge,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the headers of the four archives.
    Inspect {
        #[arg(long)]
        data: PathBuf,
    },
    /// Train the reference classifier.
    Train {
        #[arg(long)]
        data: PathBuf,
        /// JSON pipeline config; flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        /// Where to write the trained model.
        #[arg(long)]
        save: Option<PathBuf>,
        /// Where to write the per-batch history.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Score a canvas (raw RGBA file) or a test-archive sample with a saved model.
    Predict {
        #[arg(long)]
        model: PathBuf,
        /// Raw RGBA pixels, `width * height * 4` bytes.
        #[arg(long, conflicts_with = "sample")]
        canvas: Option<PathBuf>,
        /// Index of a test-archive image to draw onto the canvas.
        #[arg(long, requires = "data")]
        sample: Option<usize>,
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

/// Prints epoch summaries to stdout.
struct EpochPrinter;

impl TrainingObserver for EpochPrinter {
    fn on_epoch_end(&mut self, epoch: usize, logs: &Logs) {
        println!("epoch {epoch}: {logs}");
    }
}

fn inspect(data: PathBuf) -> mnist_pipeline::Result<()> {
    let source = DirSource::new(data);
    for kind in ArchiveKind::ALL {
        let raw = source.fetch(kind)?;
        if kind.is_images() {
            let h = read_image_header(&raw)?;
            println!(
                "{kind}: magic={:#010x} samples={} rows={} cols={}",
                h.magic, h.samples, h.rows, h.cols
            );
        } else {
            let h = read_label_header(&raw)?;
            println!("{kind}: magic={:#010x} samples={}", h.magic, h.samples);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn train(
    data: PathBuf,
    config: Option<PathBuf>,
    variant: Option<VariantArg>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    limit: Option<usize>,
    save: Option<PathBuf>,
    history_path: Option<PathBuf>,
) -> mnist_pipeline::Result<()> {
    let mut cfg = match (config, variant) {
        (Some(path), _) => PipelineConfig::load(path)?,
        (None, Some(v)) => PipelineConfig::for_variant(v.into()),
        (None, None) => PipelineConfig::default(),
    };
    if let Some(epochs) = epochs {
        cfg.epochs = epochs;
    }
    if let Some(batch_size) = batch_size {
        cfg.batch_size = batch_size;
    }
    if limit.is_some() {
        cfg.sample_limit = limit;
    }

    let datasets = pipeline::build(&DirSource::new(data), &cfg)?;

    let mut model = SoftmaxClassifier::new_with_seed(
        &cfg.input_shape(),
        mnist_pipeline::NUM_CLASSES,
        cfg.init_seed,
    )?;
    model.compile(&CompileConfig {
        optimizer: cfg.optimizer,
        metrics: vec![Metric::Accuracy],
        ..CompileConfig::default()
    })?;

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_observer(Box::new(EpochPrinter));

    let options = FitOptions {
        epochs: cfg.epochs,
        shuffle: cfg.shuffle(),
        validation: datasets.validation.as_ref(),
    };
    let history = match orchestrator.run(&mut model, &datasets.train, &options) {
        Ok(history) => history,
        Err(err) => {
            if let Some(path) = &history_path {
                err.history.save_json(path)?;
            }
            return Err(err.source);
        }
    };

    if let Some(last) = history.last() {
        println!(
            "trained {} batches, last batch {LOSS}={:.4}",
            history.len(),
            last.logs.loss().unwrap_or(f32::NAN)
        );
    }
    if let Some(path) = history_path {
        history.save_json(path)?;
    }
    if let Some(path) = save {
        model.save(&path)?;
    }
    Ok(())
}

fn predict(
    model: PathBuf,
    canvas: Option<PathBuf>,
    sample: Option<usize>,
    data: Option<PathBuf>,
) -> mnist_pipeline::Result<()> {
    let model = SoftmaxClassifier::load_json(model)?;
    let &[height, width, _] = model.input_shape() else {
        return Err(mnist_pipeline::Error::ShapeMismatch(format!(
            "model input shape {:?} is not [h, w, c]",
            model.input_shape()
        )));
    };

    let input = match (canvas, sample, data) {
        (Some(path), _, _) => {
            let pixels = std::fs::read(&path).map_err(|e| mnist_pipeline::Error::Io {
                path: path.clone(),
                source: e,
            })?;
            capture_for(&pixels, width, height, model.input_shape())?
        }
        (None, Some(idx), Some(dir)) => {
            let images = decode_images(&DirSource::new(dir).fetch(ArchiveKind::TestImages)?)?;
            if idx >= images.num_samples() {
                return Err(mnist_pipeline::Error::InvalidConfig(format!(
                    "sample {idx} out of range, test archive holds {}",
                    images.num_samples()
                )));
            }
            let mut canvas = Canvas::new(images.shape()[2], images.shape()[1], 1)?;
            canvas.draw_sample(images.sample(idx))?;
            capture_for(canvas.pixels(), canvas.width(), canvas.height(), model.input_shape())?
        }
        _ => {
            return Err(mnist_pipeline::Error::InvalidConfig(
                "predict needs --canvas or --sample with --data".to_owned(),
            ));
        }
    };

    let scores = model.predict(&input)?;
    let ranking = format::format(scores.sample(0));
    print!("{ranking}");
    if let Some(best) = ranking.best() {
        println!("best: {} ({:.2})", best.class, best.score);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    let result = match cli.command {
        Command::Inspect { data } => inspect(data),
        Command::Train {
            data,
            config,
            variant,
            epochs,
            batch_size,
            limit,
            save,
            history,
        } => train(
            data, config, variant, epochs, batch_size, limit, save, history,
        ),
        Command::Predict {
            model,
            canvas,
            sample,
            data,
        } => predict(model, canvas, sample, data),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
