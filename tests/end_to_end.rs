use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use mnist_pipeline::{
    ArchiveKind, ArchiveSource, Canvas, CompileConfig, DirSource, FitOptions, History, Metric,
    Model, Optimizer, Orchestrator, PipelineConfig, Shuffle, SoftmaxClassifier, Variant, format,
    pipeline,
};

const SIDE: usize = 28;

/// Class `c` lights up row band `c` of the image.
fn digit(class: u8) -> Vec<u8> {
    let mut px = vec![0u8; SIDE * SIDE];
    let band = class as usize * 2;
    for r in band..band + 2 {
        px[r * SIDE..(r + 1) * SIDE].fill(255);
    }
    px
}

fn image_archive(classes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for word in [0x0000_0803, classes.len() as u32, SIDE as u32, SIDE as u32] {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    for &c in classes {
        buf.extend(digit(c));
    }
    buf
}

fn label_archive(classes: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    for word in [0x0000_0801, classes.len() as u32] {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    buf.extend_from_slice(classes);
    buf
}

fn write_gz(path: &Path, bytes: &[u8]) {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(bytes).unwrap();
    fs::write(path, enc.finish().unwrap()).unwrap();
}

fn corpus(dir: &Path) {
    let train: Vec<u8> = (0..40).map(|i| (i % 10) as u8).collect();
    let test: Vec<u8> = (0..10).collect();

    fs::write(dir.join("train-images.idx3-ubyte"), image_archive(&train)).unwrap();
    write_gz(&dir.join("train-labels-idx1-ubyte.gz"), &label_archive(&train));
    fs::write(dir.join("t10k-images-idx3-ubyte"), image_archive(&test)).unwrap();
    fs::write(dir.join("t10k-labels.idx1-ubyte"), label_archive(&test)).unwrap();
}

fn train(source: &DirSource, config: &PipelineConfig) -> (SoftmaxClassifier, History) {
    let data = pipeline::build(source, config).unwrap();
    let mut model =
        SoftmaxClassifier::new_with_seed(&config.input_shape(), 10, config.init_seed).unwrap();
    model
        .compile(&CompileConfig {
            optimizer: config.optimizer,
            metrics: vec![Metric::Accuracy],
            ..CompileConfig::default()
        })
        .unwrap();

    let options = FitOptions {
        epochs: config.epochs,
        shuffle: config.shuffle(),
        validation: data.validation.as_ref(),
    };
    let history = Orchestrator::new()
        .run(&mut model, &data.train, &options)
        .unwrap();
    (model, history)
}

#[test]
fn trains_from_directory_and_scores_a_canvas() {
    let dir = tempfile::tempdir().unwrap();
    corpus(dir.path());
    let source = DirSource::new(dir.path());

    let config = PipelineConfig {
        batch_size: 8,
        epochs: 20,
        optimizer: Optimizer::Sgd { lr: 0.05 },
        ..PipelineConfig::for_variant(Variant::Mnist)
    };
    let (model, history) = train(&source, &config);

    assert_eq!(history.len(), 20 * 5);
    let last = history.epoch_summaries().last().unwrap();
    assert_eq!(last.epoch, 19);
    assert_eq!(last.logs.get("val_acc"), Some(1.0));

    let path = dir.path().join("model.json");
    model.save(&path).unwrap();
    let restored = SoftmaxClassifier::load_json(&path).unwrap();

    let mut canvas = Canvas::new(SIDE, SIDE, 1).unwrap();
    let sample: Vec<f32> = digit(7).into_iter().map(f32::from).collect();
    canvas.draw_sample(&sample).unwrap();
    let input = canvas.capture().unwrap();

    let scores = restored.predict(&input).unwrap();
    let ranking = format::format(scores.sample(0));
    assert_eq!(ranking.entries().len(), 10);
    assert_eq!(ranking.best().unwrap().class, 7);
    assert_eq!(ranking.to_string().lines().count(), 10);
    assert!(ranking.to_string().starts_with("0 : "));
}

#[test]
fn seeded_runs_are_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    corpus(dir.path());
    let source = DirSource::new(dir.path());

    let config = PipelineConfig {
        batch_size: 16,
        epochs: 2,
        validation: false,
        ..PipelineConfig::default()
    };
    assert_eq!(config.shuffle(), Shuffle::Seeded(0));

    let (_, a) = train(&source, &config);
    let (_, b) = train(&source, &config);
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn missing_archive_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = DirSource::new(dir.path())
        .fetch(ArchiveKind::TrainImages)
        .unwrap_err();
    assert!(err.to_string().contains("train-images"));
}
