//! Fit `y = x` on [-1, 1] with both training algorithms.
//!
//! `RUST_LOG=debug cargo run --example identity_fit -- --epochs 200 --method bfgs`

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use rust_mlp_train::{
    Activation, ConjugateDirectionMethod, ConjugateGradient, Dataset, InverseHessianMethod, Loss,
    LossFunctional, MlpBuilder, QuasiNewtonMethod, TrainingConfig,
};

fn parse_arg<T: FromStr>(args: &[String], key: &str, default: T) -> T {
    let mut i = 0;
    while i + 1 < args.len() {
        if args[i] == key {
            return args[i + 1]
                .parse::<T>()
                .unwrap_or_else(|_| panic!("failed to parse {key}"));
        }
        i += 1;
    }
    default
}

fn main() -> rust_mlp_train::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let epochs = parse_arg(&args, "--epochs", 100usize);
    let hidden = parse_arg(&args, "--hidden", 3usize);
    let seed = parse_arg(&args, "--seed", 0u64);
    let method = parse_arg(&args, "--method", "bfgs".to_owned());
    let loss: Loss = parse_arg(&args, "--loss", "NormalizedSquaredError".to_owned()).parse()?;

    let xs: Vec<Vec<f64>> = (0..21).map(|i| vec![-1.0 + 0.1 * i as f64]).collect();
    let mut data = Dataset::from_rows(&xs, &xs)?;
    data.split_random_with_seed(0.8, 0.2, 0.0, seed)?;

    let mut mlp = MlpBuilder::new(1)?
        .add_layer(hidden, Activation::Tanh)?
        .add_layer(1, Activation::Identity)?
        .build_with_seed(seed)?;

    let mut config = TrainingConfig::default();
    config.stopping.max_epochs = epochs;
    config.stopping.loss_goal = 1e-8;
    config.display_period = 10;

    let report = {
        let mut objective = LossFunctional::new(loss, &mut mlp, &data)?;
        match method.as_str() {
            "pr" | "fr" => {
                let direction = if method == "pr" {
                    ConjugateDirectionMethod::PolakRibiere
                } else {
                    ConjugateDirectionMethod::FletcherReeves
                };
                ConjugateGradient::new(config)
                    .with_method(direction)
                    .train(&mut objective)?
            }
            other => {
                let hessian = match other {
                    "dfp" => InverseHessianMethod::Dfp,
                    _ => InverseHessianMethod::Bfgs,
                };
                QuasiNewtonMethod::new(config)
                    .with_method(hessian)
                    .train(&mut objective)?
            }
        }
    };

    println!(
        "{} after {} epochs: loss={:.3e} validation={:.3e} |g|={:.3e} ({:.3}s)",
        report.stopping_condition,
        report.epochs,
        report.final_loss,
        report.final_validation_loss,
        report.final_gradient_norm,
        report.elapsed_time
    );

    for x in [-0.9, -0.25, 0.0, 0.4, 1.0] {
        let y = mlp.calculate_outputs(&[x])?;
        println!("f({x:+.2}) = {:+.4}", y[0]);
    }

    Ok(())
}
