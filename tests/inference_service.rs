use std::path::Path;
use std::sync::Arc;
use yieldcast::application::ml::{
    InferenceService, ModelContext, Trainer, TrainingConfig, save_artifacts,
};
use yieldcast::domain::errors::InferenceInputError;
use yieldcast::domain::ml::{FEATURE_NAMES, PredictionRequest, engineer_features};
use yieldcast::infrastructure::feature_sources::{
    CsvFeatureSource, InMemoryFeatureSource, write_observations,
};
use yieldcast::infrastructure::synthetic::SyntheticSeries;

fn train_into(dir: &Path) {
    let observations = SyntheticSeries::new(5).observations(150);
    let config = TrainingConfig {
        epochs: 2,
        hidden_size: 8,
        num_layers: 1,
        ..TrainingConfig::default()
    };
    let outcome = Trainer::new(config)
        .unwrap()
        .fit_observations(&observations)
        .unwrap();
    let names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    save_artifacts(dir, &outcome, &names).unwrap();
}

async fn memory_source() -> Arc<InMemoryFeatureSource> {
    let source = InMemoryFeatureSource::new();
    let aave = SyntheticSeries::new(21).observations(60);
    source
        .insert("aave", engineer_features(&aave).unwrap())
        .await;
    Arc::new(source)
}

async fn ready_service(dir: &Path) -> InferenceService {
    train_into(dir);
    let context = Arc::new(ModelContext::new());
    context.load(dir).await.unwrap();
    InferenceService::new(context, memory_source().await)
}

#[tokio::test]
async fn test_aave_prediction_has_all_fields() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path()).await;

    let request = PredictionRequest::new(vec!["aave".to_string()]);
    let response = service.predict(&request).await.unwrap();

    let aave = response.predictions.get("aave").expect("aave prediction");
    assert!(aave.apy.is_finite());
    assert!(aave.volatility.is_finite());
    assert_eq!(aave.horizon_days, 7);

    let json = serde_json::to_value(&response).unwrap();
    let fields = json["predictions"]["aave"].as_object().unwrap();
    for key in ["yield", "volatility", "confidence", "horizon_days"] {
        assert!(fields.contains_key(key), "missing {}", key);
    }
    assert!(fields["yield"].as_f64().unwrap().is_finite());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_unloaded_context_refuses() {
    let service = InferenceService::new(Arc::new(ModelContext::new()), memory_source().await);
    let request = PredictionRequest::new(vec!["aave".to_string()]);

    assert_eq!(
        service.predict(&request).await.unwrap_err(),
        InferenceInputError::ModelNotReady
    );
    let health = service.health().await;
    assert_eq!(health.status, "degraded");
    assert!(!health.model_loaded);
    assert!(service.model_info().await.is_err());
}

#[tokio::test]
async fn test_empty_strategy_list() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path()).await;

    assert_eq!(
        service.predict(&PredictionRequest::new(vec![])).await.unwrap_err(),
        InferenceInputError::EmptyStrategyList
    );
}

#[tokio::test]
async fn test_override_window_is_used_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path()).await;

    // "lido" is unknown to the source, so only the override can serve it
    let window = engineer_features(&SyntheticSeries::new(8).observations(40)).unwrap();
    let request = PredictionRequest::new(vec!["lido".to_string()])
        .with_horizon(30)
        .with_override("lido", window[window.len() - 7..].to_vec());
    let response = service.predict(&request).await.unwrap();
    assert_eq!(response.predictions["lido"].horizon_days, 30);

    let narrow = vec![vec![0.0; 10]; 7];
    let request =
        PredictionRequest::new(vec!["lido".to_string()]).with_override("lido", narrow);
    assert!(matches!(
        service.predict(&request).await,
        Err(InferenceInputError::FeatureWidth {
            expected: 12,
            actual: 10,
            ..
        })
    ));
}

#[tokio::test]
async fn test_unknown_strategy_fails_request() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path()).await;

    let request = PredictionRequest::new(vec!["aave".to_string(), "unknown".to_string()]);
    assert!(matches!(
        service.predict(&request).await,
        Err(InferenceInputError::FeatureSource { .. })
    ));

    let request = PredictionRequest::new(vec!["bad/id".to_string()]);
    assert!(matches!(
        service.predict(&request).await,
        Err(InferenceInputError::InvalidStrategy { .. })
    ));
}

#[tokio::test]
async fn test_health_and_model_info() {
    let dir = tempfile::tempdir().unwrap();
    let service = ready_service(dir.path()).await;

    let health = service.health().await;
    assert_eq!(health.status, "healthy");
    assert!(health.model_loaded);

    let info = service.model_info().await.unwrap();
    assert_eq!(health.model_version, Some(info.version.clone()));
    assert_eq!(info.input_size, 12);
    assert_eq!(info.output_size, 2);
    assert_eq!(info.sequence_length, 7);
    assert_eq!(info.feature_names.len(), 12);
    assert!(info.parameter_count > 0);
}

#[tokio::test]
async fn test_csv_source_end_to_end() {
    let models = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    train_into(models.path());
    write_observations(
        &data.path().join("aave.csv"),
        &SyntheticSeries::new(30).observations(90),
    )
    .unwrap();

    let context = Arc::new(ModelContext::new());
    context.load(models.path()).await.unwrap();
    let service = InferenceService::new(context, Arc::new(CsvFeatureSource::new(data.path())));

    let response = service
        .predict(&PredictionRequest::new(vec!["aave".to_string()]))
        .await
        .unwrap();
    assert!(response.predictions["aave"].apy.is_finite());
}
