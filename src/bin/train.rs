use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use yieldcast::application::ml::{ModelVariant, Trainer, save_artifacts};
use yieldcast::config::Config;
use yieldcast::domain::ml::FEATURE_NAMES;
use yieldcast::domain::ml::metrics::{max_drawdown, sharpe_ratio};
use yieldcast::infrastructure::feature_sources::read_observations;
use yieldcast::infrastructure::logging::init_tracing;
use yieldcast::infrastructure::synthetic::SyntheticSeries;

/// Train the LSTM yield predictor and write its artifacts.
///
/// Unset flags fall back to the ML_* environment variables, then to the
/// built-in defaults.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of epochs [default: 100]
    #[arg(long)]
    epochs: Option<usize>,

    /// Mini-batch size [default: 32]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Adam learning rate [default: 0.001]
    #[arg(long)]
    learning_rate: Option<f64>,

    /// LSTM hidden size [default: 128]
    #[arg(long)]
    hidden_size: Option<usize>,

    /// Number of stacked LSTM layers [default: 2]
    #[arg(long)]
    num_layers: Option<usize>,

    /// Days per input window [default: 7]
    #[arg(long)]
    sequence_length: Option<usize>,

    /// Dropout probability in [0, 1) [default: 0.2]
    #[arg(long)]
    dropout: Option<f64>,

    /// Pool the LSTM outputs with attention instead of the last step
    #[arg(long)]
    attention: bool,

    /// Share of pairs used for training, in (0, 1] [default: 0.8]
    #[arg(long)]
    train_fraction: Option<f64>,

    /// RNG seed for initialisation, shuffling and dropout [default: 42]
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for the artifacts [default: $ML_MODEL_DIR or models]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// CSV of daily observations (date,apy,tvl,volatility,gas_price,eth_price)
    #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Train on a generated series instead of --input
    #[arg(long)]
    synthetic: bool,

    /// Days of synthetic history to generate
    #[arg(long, default_value_t = 1000)]
    days: usize,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;
    init_tracing(config.debug);

    let mut training = config.training.to_training_config();
    training.epochs = args.epochs.unwrap_or(training.epochs);
    training.batch_size = args.batch_size.unwrap_or(training.batch_size);
    training.learning_rate = args.learning_rate.unwrap_or(training.learning_rate);
    training.hidden_size = args.hidden_size.unwrap_or(training.hidden_size);
    training.num_layers = args.num_layers.unwrap_or(training.num_layers);
    training.sequence_length = args.sequence_length.unwrap_or(training.sequence_length);
    training.dropout = args.dropout.unwrap_or(training.dropout);
    training.train_fraction = args.train_fraction.unwrap_or(training.train_fraction);
    training.seed = args.seed.unwrap_or(training.seed);
    if args.attention {
        training.variant = ModelVariant::Attention;
    }
    let trainer = Trainer::new(training).context("Invalid training configuration")?;
    let output_dir = args.output_dir.unwrap_or(config.model_dir);

    let observations = match (&args.input, args.synthetic) {
        (Some(path), _) => {
            info!("Loading observations from {:?}", path);
            read_observations(path)?
        }
        (None, false) => bail!("Pass --input <csv> or --synthetic"),
        (None, true) => {
            if args.days == 0 {
                bail!("--days must be at least 1");
            }
            info!("Generating {} days of synthetic observations", args.days);
            SyntheticSeries::new(trainer.config().seed).observations(args.days)
        }
    };

    let outcome = trainer
        .fit_observations(&observations)
        .context("Training failed")?;

    let feature_names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
    let manifest = save_artifacts(&output_dir, &outcome, &feature_names)
        .context("Failed to save artifacts")?;

    println!("\nTraining complete");
    println!("  Model version:  {}", manifest.version);
    println!("  Parameters:     {}", outcome.model.parameter_count());
    println!(
        "  Pairs:          {} train / {} held-out",
        outcome.train_pairs, outcome.test_pairs
    );
    if let Some(loss) = outcome.final_loss() {
        println!("  Final loss:     {:.6}", loss);
    }
    if let Some(m) = &outcome.test_metrics {
        println!("  Held-out MSE:   {:.6}", m.mse);
        println!("  Held-out RMSE:  {:.6}", m.rmse);
        println!("  Held-out MAE:   {:.6}", m.mae);
        println!("  Held-out R2:    {:.4}", m.r2);
        match m.mape {
            Some(mape) => println!("  Held-out MAPE:  {:.2}%", mape),
            None => println!("  Held-out MAPE:  n/a"),
        }
    }
    println!("  Confidence:     {:.4}", outcome.confidence);

    let daily_yield: Vec<f64> = observations.iter().map(|o| o.apy / 365.0).collect();
    let tvl: Vec<f64> = observations.iter().map(|o| o.tvl).collect();
    println!(
        "  History:        yield Sharpe {:.2}, TVL max drawdown {:.2}%",
        sharpe_ratio(&daily_yield, 0.0),
        max_drawdown(&tvl) * 100.0
    );
    println!("  Saved to:       {:?}", output_dir);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_must_be_chosen() {
        assert!(Args::try_parse_from(["train"]).is_err());
        assert!(Args::try_parse_from(["train", "--synthetic", "--input", "a.csv"]).is_err());

        let args = Args::try_parse_from(["train", "--synthetic", "--days", "200"]).unwrap();
        assert!(args.synthetic && args.input.is_none());
        assert_eq!(args.days, 200);

        let args = Args::try_parse_from(["train", "--input", "a.csv", "--epochs", "5"]).unwrap();
        assert_eq!(args.input, Some(PathBuf::from("a.csv")));
        assert_eq!(args.epochs, Some(5));
    }
}
