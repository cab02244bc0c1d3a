use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration};
use clap::{Args, Parser, Subcommand};
use nextbar::application::ml::direction_classifier::DirectionClassifier;
use nextbar::application::pipeline::DirectionPipeline;
use nextbar::config::Config;
use nextbar::domain::market::bar::Bar;
use nextbar::domain::ml::signal::DirectionSignal;
use nextbar::domain::ports::BarSource;
use nextbar::infrastructure::csv_bar_source::CsvBarSource;
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Next-bar direction predictor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Symbol to analyze
    #[arg(short, long, default_value = "AAPL")]
    symbol: String,

    /// Directory holding <SYMBOL>.csv bar files (overrides BAR_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Lookback window in minutes (overrides BAR_LOOKBACK_MINUTES)
    #[arg(long)]
    lookback_minutes: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the feature table derived from the bar history
    Features {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Fit the classifier on the bar history and save it
    Train {
        #[command(flatten)]
        source: SourceArgs,

        /// Output path for the model snapshot (overrides ML_MODEL_PATH)
        #[arg(long)]
        model_out: Option<PathBuf>,
    },
    /// Load a saved model and print the signal for the latest bar
    Predict {
        #[command(flatten)]
        source: SourceArgs,

        /// Model snapshot to load (overrides ML_MODEL_PATH)
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Fit on the history, score every row and print the latest signal
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
    },
}

fn init_tracing() {
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();
}

fn load_bars(config: &Config, source: &SourceArgs) -> Result<Vec<Bar>> {
    let data_dir = source
        .data_dir
        .clone()
        .unwrap_or_else(|| config.market_data.data_dir.clone());
    let lookback = match source.lookback_minutes {
        Some(minutes) if minutes > 0 => Duration::minutes(minutes),
        Some(minutes) => bail!("--lookback-minutes must be > 0, got {}", minutes),
        None => config.market_data.lookback(),
    };

    let bar_source = CsvBarSource::new(data_dir);
    let bars = bar_source
        .fetch_bars(&source.symbol, lookback)
        .with_context(|| format!("Failed to fetch bars for {}", source.symbol))?;
    if bars.is_empty() {
        bail!(
            "No bar data for {} from {} source. Nothing to analyze.",
            source.symbol,
            bar_source.name()
        );
    }
    Ok(bars)
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn print_signal(symbol: &str, signal: &DirectionSignal) {
    println!("\n  Latest bar: {}  close {:.4}", format_ts(signal.timestamp), signal.close);
    println!(
        "  {} next bar: {}  (p_up = {:.3})",
        symbol, signal.direction, signal.probability
    );
    if signal.is_buy() {
        println!("  BUY SIGNAL");
    } else {
        println!("  No buy signal");
    }
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Features { source } => {
            let bars = load_bars(&config, &source)?;
            let pipeline = DirectionPipeline::new(&config.indicator_config(), config.gbm_params())?;
            let features = pipeline.features(&bars)?;
            if features.is_empty() {
                bail!(
                    "{} bars loaded, at least {} needed for features",
                    bars.len(),
                    pipeline.extractor().config().min_bars()
                );
            }

            println!(
                "{:<17} {:>10} {:>7} {:>10} {:>10} {:>9} {:>9} {:>8}",
                "time", "close", "rsi", "ema_fast", "ema_slow", "macd", "signal", "atr"
            );
            for fv in &features {
                println!(
                    "{:<17} {:>10.4} {:>7.2} {:>10.4} {:>10.4} {:>9.4} {:>9.4} {:>8.4}",
                    format_ts(fv.timestamp),
                    fv.close,
                    fv.rsi,
                    fv.ema_fast,
                    fv.ema_slow,
                    fv.macd,
                    fv.macd_signal,
                    fv.atr
                );
            }
        }
        Command::Train { source, model_out } => {
            let bars = load_bars(&config, &source)?;
            let mut pipeline =
                DirectionPipeline::new(&config.indicator_config(), config.gbm_params())?;
            let report = pipeline.fit_history(&bars)?;

            let path = model_out.unwrap_or_else(|| config.model.model_path.clone());
            pipeline.classifier().save_to(&path)?;
            println!(
                "Trained on {} rows ({:.1}% up) with features {:?}",
                report.training_rows,
                report.up_ratio * 100.0,
                report.feature_names
            );
            println!("Model saved to {:?}", path);
        }
        Command::Predict { source, model } => {
            let path = model.unwrap_or_else(|| config.model.model_path.clone());
            let classifier = DirectionClassifier::load_from(&path)
                .with_context(|| format!("Failed to load model from {:?}", path))?;
            if classifier.indicators() != &config.indicator_config() {
                warn!(
                    "Model was trained on indicators ({}), ignoring configured ({})",
                    classifier.indicators(),
                    config.indicator_config()
                );
            }
            let pipeline = DirectionPipeline::from_classifier(classifier)?;

            let bars = load_bars(&config, &source)?;
            let signal = pipeline.latest_signal(&bars)?;
            print_signal(&source.symbol, &signal);
        }
        Command::Analyze { source } => {
            let bars = load_bars(&config, &source)?;
            let mut pipeline =
                DirectionPipeline::new(&config.indicator_config(), config.gbm_params())?;
            let report = pipeline.fit_history(&bars)?;

            let features = pipeline.features(&bars)?;
            let predictions = pipeline.predict(&features)?;
            let up_calls = predictions.iter().filter(|&&p| p == 1).count();

            // In-sample agreement with realized direction, for display only
            let offset = bars.len() - features.len();
            let (hits, scored) = predictions
                .iter()
                .enumerate()
                .filter_map(|(row, &p)| {
                    let i = offset + row;
                    bars.get(i + 1)
                        .map(|next| (p == u8::from(next.close > bars[i].close)) as usize)
                })
                .fold((0usize, 0usize), |(h, n), hit| (h + hit, n + 1));

            println!("\n══════════════════════════════════════════════════════");
            println!("  {} DIRECTION ANALYSIS", source.symbol);
            println!("══════════════════════════════════════════════════════");
            println!("  Bars:           {}", report.bars);
            println!("  Training rows:  {}", report.training_rows);
            println!("  Labeled up:     {:.1}%", report.up_ratio * 100.0);
            println!(
                "  Predicted up:   {} / {} rows",
                up_calls,
                predictions.len()
            );
            if scored > 0 {
                println!(
                    "  In-sample hit:  {:.1}%  ({}/{})",
                    hits as f64 / scored as f64 * 100.0,
                    hits,
                    scored
                );
            }

            let signal = pipeline.latest_signal(&bars)?;
            print_signal(&source.symbol, &signal);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: {} trees, depth {}, lr {}, lookback {}m",
        config.model.params.n_estimators,
        config.model.params.max_depth,
        config.model.params.learning_rate,
        config.market_data.lookback_minutes
    );

    run(cli, config)
}
