// SPDX-License-Identifier: Apache-2.0

//! Replays an engine event trace against a configured searcher and prints
//! every state the searcher selects.

mod replay;
mod report_cli_error;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use depsched::context::Clock;
use depsched::dependency::{DependencyTable, FactFile, ProgramModel};
use depsched::{construct_searcher, ExplorationContext, SearchKind, SearcherConfig};

use crate::replay::Replay;
use crate::report_cli_error::report_cli_error_and_exit;

#[derive(Debug, Parser)]
#[command(name = "depsched-driver")]
#[command(about = "Replays engine events against a state searcher")]
struct Args {
    /// TOML searcher configuration; defaults apply when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON dependency facts (branches, annotations, store locations).
    #[arg(long)]
    facts: Option<PathBuf>,

    /// JSON-lines event trace.
    #[arg(long)]
    trace: PathBuf,

    /// Overrides the configured base strategies; may be repeated.
    #[arg(long = "search")]
    search: Vec<SearchKind>,

    /// Overrides the configured random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Drive time-based searchers from `tick` events instead of the wall
    /// clock.
    #[arg(long, default_value_t = false)]
    #[arg(action = clap::ArgAction::Set)]
    manual_clock: bool,
}

fn load_config(args: &Args) -> Result<SearcherConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            SearcherConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SearcherConfig::default(),
    };
    if !args.search.is_empty() {
        config.search = args.search.clone();
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn load_facts(path: Option<&Path>) -> Result<(DependencyTable, ProgramModel)> {
    let Some(path) = path else {
        return Ok((DependencyTable::default(), ProgramModel::default()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading facts {}", path.display()))?;
    let facts = FactFile::from_json_str(&text)
        .with_context(|| format!("parsing facts {}", path.display()))?;
    let parts = facts.into_parts()?;
    log::info!(
        "loaded dependency facts for {} branches from {}",
        parts.0.len(),
        path.display()
    );
    Ok(parts)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let (dependencies, program) = load_facts(args.facts.as_deref())?;
    let mut ctx = ExplorationContext::new(dependencies, program, config.seed.unwrap_or(0));
    if args.manual_clock {
        ctx.clock = Clock::manual();
    }
    let searcher = construct_searcher(&config, &mut ctx)?;

    let trace = File::open(&args.trace)
        .with_context(|| format!("opening trace {}", args.trace.display()))?;
    let stdout = std::io::stdout();
    let mut replay = Replay::new(ctx, searcher);
    replay.run(BufReader::new(trace), BufWriter::new(stdout.lock()))?;
    log::info!(
        "replayed {} selections; {} states still live",
        replay.selections(),
        replay.ctx.live_state_count()
    );
    Ok(())
}

fn main() {
    let _ = env_logger::builder().try_init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        let trace = args.trace.display().to_string();
        report_cli_error_and_exit(&format!("{:#}", e), vec![("trace", trace.as_str())]);
    }
}
