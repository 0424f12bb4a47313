//! `fieldwright` command-line interface.
//!
//! `check` validates a formula set, `eval` runs one pass over a record file,
//! and `backfill` replays a date range over an offline snapshot through the
//! real scheduler and pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fieldwright::eval::{FormulaEngine, plan};
use fieldwright::parse::{canonical_formula, parse};
use fieldwright::runtime::{
    Backfill, BackfillRequest, MemoryUpstream, RecordProcessor, RuntimeConfig, Scheduler, Snapshot,
    Upstream,
};
use fieldwright::{DictionaryMap, EvaluationInput, FormulaDefinition, RecordSnapshot};

#[derive(Parser, Debug)]
#[command(name = "fieldwright", version, about = "Computed custom fields for tracked records")]
struct Cli {
    /// Runtime configuration (.yaml, .yml or .json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, whitelist-check and order a formula set.
    Check(CheckArgs),
    /// Evaluate a formula set against one record and print the result.
    Eval(EvalArgs),
    /// Replay formulas over a date range of an offline snapshot.
    Backfill(BackfillArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// JSON array of formula definitions.
    formulas: PathBuf,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// JSON record snapshot.
    #[arg(long)]
    record: PathBuf,

    /// JSON array of formula definitions.
    #[arg(long)]
    formulas: PathBuf,

    /// JSON object of dictionary rules keyed by field.
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// Triggering event, e.g. NEW_TIME_ENTRY. Omit to run every formula.
    #[arg(long)]
    event: Option<String>,
}

#[derive(Args, Debug)]
struct BackfillArgs {
    /// JSON snapshot with `records`, `formulas` and `dictionary`.
    #[arg(long)]
    data: PathBuf,

    /// First day, inclusive (YYYY-MM-DD, UTC).
    #[arg(long)]
    from: NaiveDate,

    /// Last day, inclusive.
    #[arg(long)]
    to: NaiveDate,

    /// Restrict to these subject ids (repeat or comma-separate).
    #[arg(long = "user", value_delimiter = ',')]
    users: Vec<String>,

    /// Compute without writing patches or ledger entries.
    #[arg(long)]
    dry_run: bool,

    /// Write the resulting snapshot here.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {what} from {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {what} in {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(p) => RuntimeConfig::load(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn check(args: CheckArgs) -> Result<()> {
    let formulas: Vec<FormulaDefinition> = read_json(&args.formulas, "formulas")?;

    let mut failures = 0;
    for f in &formulas {
        match canonical_formula(&f.expression) {
            Ok(canonical) => println!("ok     {} -> {}: {canonical}", f.id, f.field_key),
            Err(e) => {
                failures += 1;
                println!("error  {} -> {}: [{}] {e}", f.id, f.field_key, e.kind().code());
            }
        }
    }

    let order = plan(&formulas, None, str::to_string).context("ordering formulas")?;
    println!("order: {}", order.iter().map(|c| c.definition.id.as_str()).collect::<Vec<_>>().join(", "));

    if failures > 0 {
        bail!("{failures} of {} formulas failed to parse", formulas.len());
    }
    Ok(())
}

fn eval(args: EvalArgs, config: &RuntimeConfig) -> Result<()> {
    let record: RecordSnapshot = read_json(&args.record, "record")?;
    let formulas: Vec<FormulaDefinition> = read_json(&args.formulas, "formulas")?;
    let dictionary: DictionaryMap = match &args.dictionary {
        Some(p) => read_json(p, "dictionary")?,
        None => DictionaryMap::new(),
    };

    for f in &formulas {
        if let Ok(ast) = parse(&f.expression) {
            tracing::debug!(formula_id = %f.id, builtins = ?ast.builtins(), "parsed");
        }
    }

    let engine = FormulaEngine::with_overtime_config(config.overtime.clone());
    let result = engine.evaluate(
        &formulas,
        EvaluationInput::new(&record),
        &dictionary,
        args.event.as_deref(),
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn backfill(args: BackfillArgs, config: RuntimeConfig) -> Result<()> {
    let snapshot = Snapshot::from_json_file(&args.data)
        .with_context(|| format!("loading snapshot {}", args.data.display()))?;
    info!(
        records = snapshot.records.len(),
        formulas = snapshot.formulas.len(),
        "snapshot loaded"
    );

    let upstream = MemoryUpstream::shared(snapshot);
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::spawn(config.scheduler.clone(), cancel.clone());
    let processor = RecordProcessor::new(
        FormulaEngine::with_overtime_config(config.overtime.clone()),
        Upstream::from_shared(upstream.clone()),
        scheduler.clone(),
        config.backfill.clone(),
    );

    let request = BackfillRequest {
        from: args.from,
        to: args.to,
        subject_filter: (!args.users.is_empty()).then_some(args.users),
        dry_run: args.dry_run,
    };
    let result = Backfill::new(processor, cancel)
        .run(&request)
        .await
        .context("backfill failed")?;
    scheduler.shutdown();

    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(out) = &args.out {
        let text = serde_json::to_string_pretty(&upstream.snapshot())?;
        std::fs::write(out, text).with_context(|| format!("writing {}", out.display()))?;
        info!(path = %out.display(), "snapshot written");
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Check(args) => check(args),
        Command::Eval(args) => eval(args, &config),
        Command::Backfill(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(backfill(args, config))
        }
    }
}
