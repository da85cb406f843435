use yieldcast::application::ml::{ModelVariant, Trainer, TrainingConfig};
use yieldcast::domain::ml::{FEATURE_NAMES, frame_sequences};
use yieldcast::infrastructure::synthetic::SyntheticSeries;

fn smoke_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 100,
        batch_size: 32,
        learning_rate: 0.005,
        hidden_size: 16,
        num_layers: 2,
        sequence_length: 7,
        dropout: 0.1,
        seed: 7,
        ..TrainingConfig::default()
    }
}

#[test]
fn test_synthetic_series_frames_into_993_pairs() {
    let series = SyntheticSeries::new(1).matrix(1000, 10);
    let framed = frame_sequences(series.view(), 7, Some(&[0, 1])).unwrap();

    assert_eq!(framed.len(), 993);
    assert_eq!(framed.sequence_length(), 7);
    assert_eq!(framed.feature_width(), 10);
    assert_eq!(framed.target_width(), 2);
    // last target is the last row of the series
    assert_eq!(framed.targets[[992, 0]], series[[999, 0]]);
}

#[test]
fn test_loss_decreases_over_training() {
    let series = SyntheticSeries::new(1).matrix(1000, 10);
    let outcome = Trainer::new(smoke_config())
        .unwrap()
        .fit(series.view())
        .unwrap();

    assert_eq!(outcome.history.len(), 100);
    assert_eq!(outcome.train_pairs + outcome.test_pairs, 993);
    assert_eq!(outcome.train_pairs, 794);

    let first = outcome.history[0].train_loss;
    let last = outcome.history[99].train_loss;
    assert!(
        last < first,
        "loss should decrease: epoch 1 = {}, epoch 100 = {}",
        first,
        last
    );

    let metrics = outcome.test_metrics.expect("held-out metrics");
    assert!(metrics.mse.is_finite());
    assert!((0.0..=1.0).contains(&outcome.confidence));
}

#[test]
fn test_attention_variant_learns() {
    let series = SyntheticSeries::new(2).matrix(300, 4);
    let config = TrainingConfig {
        epochs: 30,
        num_layers: 1,
        variant: ModelVariant::Attention,
        ..smoke_config()
    };
    let outcome = Trainer::new(config).unwrap().fit(series.view()).unwrap();

    let first = outcome.history[0].train_loss;
    let last = outcome.final_loss().unwrap();
    assert!(last < first, "epoch 1 = {}, epoch 30 = {}", first, last);
    assert_eq!(outcome.model.config().variant, ModelVariant::Attention);
}

#[test]
fn test_trains_on_engineered_observations() {
    let observations = SyntheticSeries::new(3).observations(200);
    let config = TrainingConfig {
        epochs: 3,
        hidden_size: 8,
        num_layers: 1,
        ..smoke_config()
    };
    let outcome = Trainer::new(config)
        .unwrap()
        .fit_observations(&observations)
        .unwrap();

    // 200 days - 29 warm-up rows - 7 window days
    assert_eq!(outcome.train_pairs + outcome.test_pairs, 164);
    assert_eq!(outcome.normalizer.width(), FEATURE_NAMES.len());
    assert_eq!(outcome.model.config().output_size, 2);
}

#[test]
fn test_training_is_reproducible() {
    let series = SyntheticSeries::new(4).matrix(120, 3);
    let config = TrainingConfig {
        epochs: 5,
        hidden_size: 6,
        ..smoke_config()
    };
    let trainer = Trainer::new(config).unwrap();

    let a = trainer.fit(series.view()).unwrap();
    let b = trainer.fit(series.view()).unwrap();
    assert_eq!(a.history, b.history);
    assert_eq!(a.model, b.model);
    assert_eq!(a.normalizer, b.normalizer);
}
