//! sweep-replay: run the engine over historical bars.
//!
//! Reads CSV bars, runs one clean session per trading day and prints every engine event as a
//! JSON line on stdout. Logs go to stderr (`RUST_LOG` controls the level).

mod bars;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use sweep_core::config::TimeframeMode;
use sweep_core::{Config, ExchangeClock, SessionClock, MINUTE_MS};
use sweep_engine::{replay, DailyRiskGate, JsonLinesSink, SymbolEngine};
use sweep_ingestion::BarResampler;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sweep-replay", about = "Replay historical bars through the sweep engine")]
struct Cli {
    /// Lower-timeframe bars (or the only stream in single mode).
    #[arg(long)]
    bars: PathBuf,

    /// Higher-timeframe bars. Resampled from --bars when omitted.
    #[arg(long)]
    htf: Option<PathBuf>,

    /// TOML config file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the instrument symbol.
    #[arg(long)]
    symbol: Option<String>,

    /// Print the replay summary as JSON on stderr when done.
    #[arg(long, default_value_t = false)]
    summary: bool,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Config::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(symbol) = &cli.symbol {
        config.instrument.symbol = symbol.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let clock: Arc<dyn SessionClock> = Arc::new(ExchangeClock::from_name(&config.instrument.timezone)?);

    let lower = bars::load_bars(&cli.bars)?;
    let htf_ms = i64::from(config.engine.htf_minutes) * MINUTE_MS;
    let (higher, lower) = match (config.engine.mode, &cli.htf) {
        (TimeframeMode::Single, Some(_)) => {
            warn!("--htf is ignored in single-timeframe mode");
            (lower, Vec::new())
        }
        (TimeframeMode::Single, None) => (lower, Vec::new()),
        (TimeframeMode::Dual, Some(path)) => (bars::load_bars(path)?, lower),
        (TimeframeMode::Dual, None) => (BarResampler::resample(&lower, htf_ms), lower),
    };
    info!(
        symbol = %config.instrument.symbol,
        mode = ?config.engine.mode,
        higher = higher.len(),
        lower = lower.len(),
        "bars loaded"
    );

    let gate = Arc::new(DailyRiskGate::new(config.risk.clone(), Arc::clone(&clock)));
    let mut engine = SymbolEngine::new(config, Arc::clone(&clock), gate)?;

    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(io::BufWriter::new(stdout.lock()));
    let summary = replay(&mut engine, clock.as_ref(), &higher, &lower, &mut sink);
    sink.flush().context("flushing events")?;
    if sink.failed() > 0 {
        warn!(failed = sink.failed(), "some events could not be written");
    }

    if cli.summary {
        let mut stderr = io::stderr();
        serde_json::to_writer_pretty(&mut stderr, &summary)?;
        writeln!(stderr)?;
    }
    Ok(())
}
