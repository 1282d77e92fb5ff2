//! Trains a multi-layer perceptron to classify MNIST handwritten digits
//! using the library provided by `digits_rs`
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run -- -h
//! cargo run -- --data-dir data/mnist
//! cargo run
//! ```
//!
//! Expects the uncompressed MNIST IDX files under `--data-dir`. Without a data
//! directory a synthetic stand-in dataset is used so the binary runs end to end
//! without downloading anything. Learning rate, momentum, batch size, etc. are
//! all configurable.

use std::{cmp::Ordering, error::Error, fs};

use digits_rs::{
    dataloader::DataLoader,
    datasets::{Mnist, N_CLASSES, Split},
    loss::CrossEntropyLoss,
    nn::{Init, Linear, Module, NNError, ReLU, Sequential},
    optim::{Optim, SGD},
    plot::plot_loss_curve,
    values::Value,
};

use clap::Parser;

#[derive(Parser)]
struct Args {
    /// Directory holding the uncompressed MNIST IDX files; a synthetic dataset
    /// is substituted when omitted
    #[clap(short, long)]
    data_dir: Option<String>,
    #[clap(short, long, default_value_t = 5)]
    epochs: usize,
    #[clap(short, long, default_value_t = 64)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 0.01)]
    lr: f32,
    #[clap(short, long, default_value_t = 0.9)]
    momentum: f32,
    #[clap(short, long, default_value_t = 1)]
    print_epochs: usize,
    #[clap(short, long, default_value_t = format!("output"))]
    output_dir: String,
    // Scalar-graph autograd builds one node per arithmetic operation, so wide
    // hidden layers and full 60k-image epochs get slow quickly
    #[clap(long, default_value_t = 32)]
    hidden_units: usize,
    #[clap(long, default_value_t = 2000)]
    train_samples: usize,
    #[clap(long, default_value_t = 500)]
    test_samples: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let (train, test) = match &args.data_dir {
        Some(dir) => (
            Mnist::load(dir, Split::Train)?.take(args.train_samples),
            Mnist::load(dir, Split::Test)?.take(args.test_samples),
        ),
        None => {
            log::warn!("No --data-dir given, falling back to synthetic images");
            (
                Mnist::synthetic(args.train_samples),
                Mnist::synthetic(args.test_samples),
            )
        }
    };
    log::info!(
        "Loaded {} training and {} test samples",
        train.len(),
        test.len()
    );

    let (rows, cols) = train.image_dims();
    let model = Sequential::new(vec![
        Box::new(Linear::new(rows * cols, args.hidden_units)),
        Box::new(ReLU::new()),
        Box::new(Linear::with_init(args.hidden_units, N_CLASSES, Init::Xavier)),
    ]);
    let mut optim = SGD::new(model.parameters(), args.lr, args.momentum);

    let (data, labels) = train.to_training_pairs();
    let data_loader = DataLoader::new(data, labels, args.batch_size, true)?;

    let mut epoch_losses = Vec::with_capacity(args.epochs);
    for epoch in 0..args.epochs {
        let mut epoch_loss = 0.0;
        let mut n_samples = 0;
        for (batch_data, batch_labels) in data_loader.iter() {
            for (sample, label) in batch_data.into_iter().zip(batch_labels.into_iter()) {
                // after the loss is freed, all the intermediate children (that are not model
                // parameters) are also freed because their reference count drops to 0
                let logits = model.forward(sample)?;
                let loss = CrossEntropyLoss::call(&logits, label);
                loss.backward();
                epoch_loss += loss.data();
                n_samples += 1;
            }
            // take steps in minibatches
            optim.step();
            optim.zero_grad();
        }
        let avg_loss = epoch_loss / n_samples as f32;
        epoch_losses.push(avg_loss);
        if epoch % args.print_epochs == 0 || epoch == args.epochs - 1 {
            log::info!("epoch: {}, average loss: {:.4}", epoch + 1, avg_loss);
        }
    }

    let accuracy = evaluate(&model, &test)?;
    log::info!(
        "test accuracy: {:.1}% over {} samples",
        accuracy * 100.0,
        test.len()
    );

    fs::create_dir_all(&args.output_dir)?;
    plot_loss_curve(
        &epoch_losses,
        &format!("{}/loss_curve.png", args.output_dir),
    )?;

    Ok(())
}

/// Fraction of samples whose predicted class (argmax over the logits) matches the label
fn evaluate(model: &Sequential, dataset: &Mnist) -> Result<f32, NNError> {
    let mut n_correct = 0;
    for i in 0..dataset.len() {
        let input = dataset
            .image(i)
            .iter()
            .map(|&p| Value::new(p as f32 / 255.0))
            .collect::<Vec<_>>();
        let logits = model.forward(&input)?;
        let predicted = logits
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.data().partial_cmp(&b.data()).unwrap_or(Ordering::Equal))
            .map(|(class, _)| class)
            .unwrap_or(0);
        if predicted == dataset.label(i) as usize {
            n_correct += 1;
        }
    }
    Ok(n_correct as f32 / dataset.len().max(1) as f32)
}
