use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use yieldcast::application::ml::{InferenceService, ModelContext};
use yieldcast::config::Config;
use yieldcast::domain::ml::PredictionRequest;
use yieldcast::infrastructure::feature_sources::CsvFeatureSource;
use yieldcast::infrastructure::logging::init_tracing;

/// Predict yield and volatility for one or more strategies.
///
/// The request is read as JSON (`{"strategies": [...], "horizon_days": 7}`)
/// from --request, or built from --strategies. The response is written to
/// stdout as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON request file, `-` for stdin
    #[arg(long, conflicts_with = "strategies")]
    request: Option<PathBuf>,

    /// Comma-separated strategy ids
    #[arg(long, value_delimiter = ',')]
    strategies: Vec<String>,

    /// Forecast horizon echoed in the response
    #[arg(long, default_value_t = 7)]
    horizon_days: u32,

    /// Artifact directory [default: $ML_MODEL_DIR or models]
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Directory of <strategy>.csv histories [default: $ML_DATA_DIR or data/strategies]
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Print service health instead of predicting
    #[arg(long)]
    health: bool,

    /// Print the loaded model's description instead of predicting
    #[arg(long)]
    info: bool,
}

fn read_request(args: &Args) -> Result<PredictionRequest> {
    if let Some(path) = &args.request {
        let mut raw = String::new();
        if path.as_os_str() == "-" {
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read request from stdin")?;
        } else {
            raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read request {:?}", path))?;
        }
        return serde_json::from_str(&raw).context("Invalid prediction request");
    }
    if args.strategies.is_empty() {
        bail!("Provide --request or --strategies");
    }
    Ok(PredictionRequest::new(args.strategies.clone()).with_horizon(args.horizon_days))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;
    init_tracing(config.debug);

    let model_dir = args.model_dir.clone().unwrap_or(config.model_dir);
    let data_dir = args.data_dir.clone().unwrap_or(config.data_dir);

    let context = Arc::new(ModelContext::new());
    let service = InferenceService::new(context.clone(), Arc::new(CsvFeatureSource::new(data_dir)));

    let loaded = context.load(&model_dir).await;
    if args.health {
        println!("{}", serde_json::to_string_pretty(&service.health().await)?);
        return Ok(());
    }
    loaded.with_context(|| format!("Failed to load model from {:?}", model_dir))?;

    if args.info {
        let model_info = service.model_info().await?;
        println!("{}", serde_json::to_string_pretty(&model_info)?);
        return Ok(());
    }

    let request = read_request(&args)?;
    info!("Predicting {} strategies", request.strategies.len());
    let response = service.predict(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
