use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use rust_mlp_train::{
    ConjugateGradient, Dataset, Loss, LossFunctional, Mlp, ObjectiveFunctional,
    QuasiNewtonMethod,
};

fn dataset(n: usize, input_dim: usize, target_dim: usize) -> Dataset {
    let inputs: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            (0..input_dim)
                .map(|j| ((i * 31 + j * 7) % 97) as f64 / 48.5 - 1.0)
                .collect()
        })
        .collect();
    let targets: Vec<Vec<f64>> = inputs
        .iter()
        .map(|x| (0..target_dim).map(|k| x[k % input_dim].sin()).collect())
        .collect();
    Dataset::from_rows(&inputs, &targets).expect("rectangular data")
}

fn mlp_forward_bench(c: &mut Criterion) {
    let mlp = Mlp::new_with_seed(&[16, 32, 32, 4], 0).expect("valid sizes");
    let mut scratch = mlp.scratch();
    let input = vec![0.1_f64; mlp.inputs_number()];

    c.bench_function("mlp_forward_16_32_32_4", |b| {
        b.iter(|| {
            let out = mlp.forward(black_box(&input), &mut scratch);
            black_box(out);
        })
    });
}

fn loss_and_gradient_bench(c: &mut Criterion) {
    let data = dataset(256, 16, 4);

    for loss in [
        Loss::SumSquaredError,
        Loss::NormalizedSquaredError,
        Loss::RootMeanSquaredError,
    ] {
        let mut mlp = Mlp::new_with_seed(&[16, 32, 32, 4], 0).expect("valid sizes");
        let objective = LossFunctional::new(loss, &mut mlp, &data).expect("matching dims");

        c.bench_function(&format!("{loss:?}_loss_256x16"), |b| {
            b.iter(|| black_box(objective.loss().expect("loss")))
        });
        c.bench_function(&format!("{loss:?}_gradient_256x16"), |b| {
            b.iter(|| black_box(objective.gradient().expect("gradient")))
        });
    }
}

fn training_epochs_bench(c: &mut Criterion) {
    let data = dataset(64, 4, 1);
    let base = Mlp::new_with_seed(&[4, 8, 1], 0).expect("valid sizes");

    c.bench_function("conjugate_gradient_20_epochs", |b| {
        b.iter_batched(
            || base.clone(),
            |mut mlp| {
                let mut objective =
                    LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data)
                        .expect("matching dims");
                let mut cg = ConjugateGradient::default();
                cg.config_mut().display = false;
                cg.config_mut().stopping.max_epochs = 20;
                black_box(cg.train(&mut objective).expect("training"))
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("quasi_newton_20_epochs", |b| {
        b.iter_batched(
            || base.clone(),
            |mut mlp| {
                let mut objective =
                    LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data)
                        .expect("matching dims");
                let mut qn = QuasiNewtonMethod::default();
                qn.config_mut().display = false;
                qn.config_mut().stopping.max_epochs = 20;
                black_box(qn.train(&mut objective).expect("training"))
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    mlp_forward_bench,
    loss_and_gradient_bench,
    training_epochs_bench
);
criterion_main!(benches);
