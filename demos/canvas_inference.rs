//! Draw a digit on a canvas and score it with a freshly initialised model.

use mnist_pipeline::{Canvas, Model, SoftmaxClassifier, format};

fn main() -> mnist_pipeline::Result<()> {
    // 28x28 model pixels shown at 10x, as a 280x280 drawing surface would be.
    let mut canvas = Canvas::new(28, 28, 10)?;
    for y in (40..240).step_by(5) {
        canvas.stroke(140, y);
    }

    let input = canvas.capture()?;
    println!("captured {input}");

    let model = SoftmaxClassifier::new_with_seed(&[28, 28, 1], 10, 0)?;
    let scores = model.predict(&input)?;
    print!("{}", format::format(scores.sample(0)));

    canvas.clear();
    Ok(())
}
