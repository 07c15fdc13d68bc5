//! TradeGate CLI: inspect engine decisions from TOML/JSON inputs.
//!
//! Commands:
//! - `targets` compute the three profit targets for an entry/stop pair
//! - `check-config` validate an engine config file and print it normalized
//! - `evaluate` replay bars through the engine, optionally resuming a position
//! - `audit` check a reported exit reason against a close price

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tradegate_core::audit::ExitReasonAuditor;
use tradegate_core::domain::{Position, Side};
use tradegate_core::exit::ExitReason;
use tradegate_core::store::MemoryStore;
use tradegate_core::targets::{TargetCalculator, TargetLevel};
use tradegate_core::{BarInput, BarOutcome, DecisionEngine, EngineConfig};

#[derive(Parser)]
#[command(
    name = "tradegate",
    about = "TradeGate CLI: entry qualification and multi-level exit decisions"
)]
struct Cli {
    /// Engine config (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Long,
    Short,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Long => Side::Long,
            SideArg::Short => Side::Short,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute target prices and their monetary values.
    Targets {
        #[arg(long, value_enum)]
        side: SideArg,

        /// Entry price.
        #[arg(long)]
        entry: f64,

        /// Initial stop-loss price.
        #[arg(long)]
        stop: f64,

        /// Position size.
        #[arg(long, default_value_t = 1.0)]
        size: f64,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Validate a config file and print the effective configuration.
    CheckConfig {
        /// Path to the TOML config file.
        path: PathBuf,
    },
    /// Replay a JSON array of bar inputs through the engine.
    Evaluate {
        /// JSON file holding an array of bar inputs.
        #[arg(long)]
        bars: PathBuf,

        /// JSON file holding an open position to resume.
        #[arg(long)]
        position: Option<PathBuf>,

        /// Print one JSON outcome per line instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Audit a reported exit reason against the close price.
    Audit {
        /// JSON file holding the position being closed.
        #[arg(long)]
        position: PathBuf,

        /// Reported reason text (e.g. "target 3 reached").
        #[arg(long)]
        reason: String,

        /// Close price at exit.
        #[arg(long)]
        close: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Targets {
            side,
            entry,
            stop,
            size,
            json,
        } => run_targets(&config, side.into(), entry, stop, size, json),
        Commands::CheckConfig { path } => run_check_config(&path),
        Commands::Evaluate {
            bars,
            position,
            json,
        } => run_evaluate(config, &bars, position.as_deref(), json),
        Commands::Audit {
            position,
            reason,
            close,
        } => run_audit(&config, &position, &reason, close),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn run_targets(
    config: &EngineConfig,
    side: Side,
    entry: f64,
    stop: f64,
    size: f64,
    json: bool,
) -> Result<()> {
    let set = TargetCalculator::new(&config.targets).compute(side, entry, stop, size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    println!("Side:       {side}");
    println!("Entry:      {entry}");
    println!("Stop:       {stop}");
    println!("Risk unit:  {:.5}", set.risk_unit());
    println!("Risk:       {:.2}", set.risk_amount());
    println!("{}", "-".repeat(40));
    for level in TargetLevel::ALL {
        println!(
            "Target {}:   {:<12.5} {:>10.2}",
            level.number(),
            set.price(level),
            set.monetary(level)
        );
    }
    Ok(())
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    println!("# {} is valid", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn run_evaluate(
    config: EngineConfig,
    bars_path: &Path,
    position_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let inputs: Vec<BarInput> = read_json(bars_path)?;
    if inputs.is_empty() {
        bail!("{} contains no bars", bars_path.display());
    }

    let store = match position_path {
        Some(path) => MemoryStore::with_open(read_json::<Position>(path)?),
        None => MemoryStore::new(),
    };
    let mut engine = DecisionEngine::new(config, store)?;
    tracing::info!(
        bars = inputs.len(),
        resumed = engine.position().is_some(),
        "replaying bars"
    );

    for input in &inputs {
        let outcome = engine.on_bar(input);
        if json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else {
            print_outcome(input.bar.index, &outcome);
        }
    }

    if !json {
        print_summary(&engine);
    }
    Ok(())
}

fn print_outcome(bar: usize, outcome: &BarOutcome) {
    let line = match outcome {
        BarOutcome::Skipped { .. } => "skipped (void bar)".to_string(),
        BarOutcome::Rejected(r) => format!("rejected {} at {}: {}", r.code, r.gate, r.detail),
        BarOutcome::AwaitingRisk(entry) => {
            format!("{} entry authorized, no stop/size supplied", entry.side)
        }
        BarOutcome::EntryBlocked { entry, error } => {
            format!("{} entry blocked: {error}", entry.side)
        }
        BarOutcome::Opened { position, entry } => format!(
            "opened {} {} at {} stop {}{}",
            position.id,
            position.side,
            position.entry_price,
            position.current_stop,
            if entry.is_stale() { " (stale)" } else { "" }
        ),
        BarOutcome::Held(decision) => format!(
            "hold, stop {} ({})",
            decision.new_stop_loss(),
            decision.summary()
        ),
        BarOutcome::Closed { trade, .. } => format!(
            "closed {} at {}: {} ({:+.2} pts){}",
            trade.id(),
            trade.exit_price(),
            trade.reason(),
            trade.points(),
            if trade.audit().is_some() {
                " [reason corrected]"
            } else {
                ""
            }
        ),
    };
    println!("bar {bar:>5}  {line}");
}

fn print_summary(engine: &DecisionEngine<MemoryStore>) {
    let closed = engine.store().closed();
    let corrected = closed.iter().filter(|t| t.audit().is_some()).count();
    let points: f64 = closed.iter().map(|t| t.points()).sum();

    println!();
    println!("Closed trades: {}", closed.len());
    println!("Corrected:     {corrected}");
    println!("Total points:  {points:+.2}");
    match engine.position() {
        Some(p) => println!(
            "Open:          {} {} in {}, stop {}",
            p.id, p.side, p.state, p.current_stop
        ),
        None => println!("Open:          none"),
    }
}

fn run_audit(config: &EngineConfig, position_path: &Path, reason: &str, close: f64) -> Result<()> {
    let position: Position = read_json(position_path)?;
    let reported = ExitReason::from(reason);
    let auditor = ExitReasonAuditor::new(&config.audit);

    match auditor.check(&position, &reported, close) {
        None => println!("reason confirmed: {reported}"),
        Some(correction) => {
            println!(
                "reason corrected: {} -> {}",
                correction.original_reason, correction.corrected_reason
            );
            if let Some(claimed) = correction.claimed_price {
                println!("claimed threshold: {claimed}");
            }
            println!("close price:       {}", correction.close_price);
            if let Some(d) = correction.discrepancy {
                println!("discrepancy:       {d:.5}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_targets_command() {
        let cli = Cli::parse_from([
            "tradegate", "targets", "--side", "short", "--entry", "2000", "--stop", "2010",
        ]);
        match cli.command {
            Commands::Targets { side, entry, stop, size, json } => {
                assert_eq!(Side::from(side), Side::Short);
                assert_eq!(entry, 2000.0);
                assert_eq!(stop, 2010.0);
                assert_eq!(size, 1.0);
                assert!(!json);
            }
            _ => panic!("expected targets command"),
        }
    }
}
