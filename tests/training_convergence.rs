use rust_mlp_train::{
    Activation, ConjugateDirectionMethod, ConjugateGradient, Dataset, Error,
    InverseHessianMethod, Layer, Loss, LossFunctional, Mlp, MlpBuilder, ObjectiveFunctional,
    QuasiNewtonMethod, StoppingCondition, TrainingConfig, TrainingHistory, TrainingRateMethod,
    TrainingReport,
};

fn identity_data(n: usize) -> Dataset {
    let xs: Vec<Vec<f64>> = (0..n)
        .map(|i| vec![-1.0 + 2.0 * i as f64 / (n - 1) as f64])
        .collect();
    Dataset::from_rows(&xs, &xs).unwrap()
}

fn small_net(seed: u64) -> Mlp {
    MlpBuilder::new(1)
        .unwrap()
        .add_layer(3, Activation::Tanh)
        .unwrap()
        .add_layer(1, Activation::Identity)
        .unwrap()
        .build_with_seed(seed)
        .unwrap()
}

fn linear_net(weight: f64, bias: f64) -> Mlp {
    let layer = Layer::from_parts(1, 1, Activation::Identity, vec![weight], vec![bias]).unwrap();
    Mlp::from_layers(vec![layer]).unwrap()
}

fn quiet(max_epochs: usize) -> TrainingConfig {
    let mut config = TrainingConfig {
        display: false,
        ..TrainingConfig::default()
    };
    config.stopping.max_epochs = max_epochs;
    config.reserve.loss = true;
    config.reserve.training_direction = true;
    config
}

#[derive(Debug, Clone, Copy)]
enum Algorithm {
    ConjugateGradient(ConjugateDirectionMethod),
    QuasiNewton(InverseHessianMethod),
}

const ALGORITHMS: [Algorithm; 4] = [
    Algorithm::ConjugateGradient(ConjugateDirectionMethod::PolakRibiere),
    Algorithm::ConjugateGradient(ConjugateDirectionMethod::FletcherReeves),
    Algorithm::QuasiNewton(InverseHessianMethod::Dfp),
    Algorithm::QuasiNewton(InverseHessianMethod::Bfgs),
];

fn train(
    algorithm: Algorithm,
    config: TrainingConfig,
    objective: &mut LossFunctional<'_>,
) -> rust_mlp_train::Result<(TrainingReport, TrainingHistory)> {
    match algorithm {
        Algorithm::ConjugateGradient(method) => {
            let mut cg = ConjugateGradient::new(config).with_method(method);
            let report = cg.train(objective)?;
            Ok((report, cg.history().clone()))
        }
        Algorithm::QuasiNewton(method) => {
            let mut qn = QuasiNewtonMethod::new(config).with_method(method);
            let report = qn.train(objective)?;
            Ok((report, qn.history().clone()))
        }
    }
}

#[test]
fn loss_never_increases_on_identity_fit() {
    let data = identity_data(11);

    for algorithm in ALGORITHMS {
        let mut mlp = small_net(5);
        let mut objective =
            LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data).unwrap();
        let (report, history) = train(algorithm, quiet(40), &mut objective).unwrap();

        assert_eq!(history.loss.len(), report.epochs);
        assert!(history.loss.len() >= 2, "{algorithm:?}: {report:?}");
        assert!(
            history.loss[1] < history.loss[0],
            "{algorithm:?}: first step did not improve {:?}",
            history.loss
        );
        for w in history.loss.windows(2) {
            assert!(w[1] <= w[0], "{algorithm:?}: loss went up {:?}", history.loss);
        }
        let first = history.loss[0];
        assert!(
            report.final_loss < 0.25 * first,
            "{algorithm:?}: {first} -> {}",
            report.final_loss
        );

        for d in &history.training_direction {
            let norm = d.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-9, "{algorithm:?}: |d|={norm}");
        }
    }
}

#[test]
fn saturated_tanh_output_stops_instead_of_diverging() {
    // Both targets are reached exactly once tanh rounds to 1.0, so the loss
    // becomes flat along the first direction.
    let data = Dataset::from_rows(&[vec![1.0], vec![2.0]], &[vec![1.0], vec![1.0]]).unwrap();

    for algorithm in ALGORITHMS {
        let layer = Layer::from_parts(1, 1, Activation::Tanh, vec![0.0], vec![0.0]).unwrap();
        let mut mlp = Mlp::from_layers(vec![layer]).unwrap();
        let mut config = quiet(20);
        config.reserve.training_rate = true;

        let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
        let (report, history) = train(algorithm, config, &mut objective)
            .unwrap_or_else(|e| panic!("{algorithm:?}: {e}"));

        assert!(history.loss[1] < history.loss[0], "{algorithm:?}: {:?}", history.loss);
        assert!(report.final_loss < 1e-12, "{algorithm:?}: {report:?}");
        assert!(report.final_parameters_norm < 1e3, "{algorithm:?}: {report:?}");
        for &rate in &history.training_rate {
            assert!(rate.is_finite() && rate < 1e3, "{algorithm:?}: rate={rate}");
        }
        assert_eq!(history.training_rate.len(), report.epochs);
    }
}

#[test]
fn saturating_classifier_improves_every_epoch() {
    let xs = [-1.0, -0.6, -0.2, 0.2, 0.6, 1.0];
    let inputs: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x]).collect();
    let targets: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x.signum()]).collect();
    let data = Dataset::from_rows(&inputs, &targets).unwrap();

    for algorithm in ALGORITHMS {
        let mut mlp = MlpBuilder::new(1)
            .unwrap()
            .add_layer(3, Activation::Tanh)
            .unwrap()
            .add_layer(1, Activation::Tanh)
            .unwrap()
            .build_with_seed(9)
            .unwrap();
        let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
        let (report, history) = train(algorithm, quiet(60), &mut objective)
            .unwrap_or_else(|e| panic!("{algorithm:?}: {e}"));

        assert!(history.loss.len() >= 2, "{algorithm:?}: {report:?}");
        assert!(history.loss[1] < history.loss[0], "{algorithm:?}: {:?}", history.loss);
        for w in history.loss.windows(2) {
            assert!(w[1] <= w[0], "{algorithm:?}: loss went up {:?}", history.loss);
        }
        assert!(report.final_parameters_norm.is_finite());
    }
}

#[test]
fn trained_parameters_stay_in_the_model() {
    let data = identity_data(9);
    let mut mlp = small_net(1);
    let before = mlp.parameters();

    let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
    let mut qn = QuasiNewtonMethod::new(quiet(10));
    let report = qn.train(&mut objective).unwrap();
    drop(objective);

    assert_ne!(mlp.parameters(), before);
    let objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
    let loss = objective.loss().unwrap();
    assert!((loss - report.final_loss).abs() <= 1e-12 * loss.abs().max(1.0));
}

#[test]
fn increment_norm_criterion_wins_over_max_epochs() {
    let data = identity_data(5);

    for algorithm in ALGORITHMS {
        let mut mlp = small_net(2);
        let before = mlp.parameters();
        let mut config = quiet(0);
        config.stopping.min_parameters_increment_norm = 1e300;

        let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
        let (report, history) = train(algorithm, config, &mut objective).unwrap();
        drop(objective);

        assert_eq!(
            report.stopping_condition,
            StoppingCondition::MinimumParametersIncrementNorm
        );
        assert_eq!(report.epochs, 1);
        assert_eq!(history.loss.len(), 1);
        assert_eq!(mlp.parameters(), before);
    }
}

#[test]
fn loss_goal_wins_over_max_epochs() {
    let data = identity_data(5);
    let mut mlp = small_net(2);
    let mut config = quiet(0);
    config.stopping.loss_goal = 1e9;

    let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
    let mut cg = ConjugateGradient::new(config);
    let report = cg.train(&mut objective).unwrap();
    assert_eq!(report.stopping_condition, StoppingCondition::LossGoal);
    assert_eq!(cg.history().loss.len(), 1);
}

#[test]
fn max_epochs_bounds_the_history() {
    let data = identity_data(7);
    let mut mlp = small_net(3);
    let mut objective =
        LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data).unwrap();
    let mut cg = ConjugateGradient::new(quiet(3));
    let report = cg.train(&mut objective).unwrap();

    assert!(report.epochs <= 4);
    if report.stopping_condition == StoppingCondition::MaximumEpochs {
        assert_eq!(report.epochs, 4);
    }
    assert_eq!(cg.history().loss.len(), report.epochs);
}

#[test]
fn zero_time_budget_stops_on_the_first_epoch() {
    let data = identity_data(5);
    let mut mlp = small_net(4);
    let mut config = quiet(100);
    config.stopping.max_training_time = 0.0;

    let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
    let mut qn = QuasiNewtonMethod::new(config);
    let report = qn.train(&mut objective).unwrap();
    assert_eq!(report.stopping_condition, StoppingCondition::MaximumTrainingTime);
    assert_eq!(report.epochs, 1);
}

#[test]
fn early_stopping_halts_when_validation_loss_rises() {
    // Validation targets are the negated training targets, so fitting the
    // training subset makes the validation loss grow.
    let xs = [-1.0, -0.5, 0.5, 1.0];
    let mut inputs = Vec::new();
    let mut targets = Vec::new();
    for &x in &xs {
        inputs.push(vec![x]);
        targets.push(vec![x]);
    }
    for &x in &xs {
        inputs.push(vec![x]);
        targets.push(vec![-x]);
    }
    let mut data = Dataset::from_rows(&inputs, &targets).unwrap();
    data.set_subsets(vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![]).unwrap();

    for algorithm in ALGORITHMS {
        let mut mlp = linear_net(0.0, 0.0);
        // Fixed short steps keep the increment norm away from zero.
        let mut config = quiet(50);
        config.stopping.early_stopping = true;
        config.reserve.validation_loss = true;
        config.line_search.method = TrainingRateMethod::Fixed;
        config.first_training_rate = 0.1;

        let mut objective = LossFunctional::new(Loss::SumSquaredError, &mut mlp, &data).unwrap();
        let (report, history) = train(algorithm, config, &mut objective).unwrap();

        assert_eq!(
            report.stopping_condition,
            StoppingCondition::ValidationLossIncreased,
            "{algorithm:?}"
        );
        assert_eq!(report.epochs, 2);
        assert!(history.validation_loss[1] > history.validation_loss[0]);
    }
}

#[test]
fn degenerate_normalization_aborts_training() {
    let xs = vec![vec![0.0], vec![1.0], vec![2.0]];
    let ts = vec![vec![1.0], vec![1.0], vec![1.0]];
    let data = Dataset::from_rows(&xs, &ts).unwrap();
    let mut mlp = small_net(0);

    let mut objective =
        LossFunctional::new(Loss::NormalizedSquaredError, &mut mlp, &data).unwrap();
    let err = ConjugateGradient::new(quiet(10))
        .train(&mut objective)
        .unwrap_err();
    assert!(matches!(err, Error::DegenerateNumeric(_)));
}
