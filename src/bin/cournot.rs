//! `cournot` binary: run a best-response equilibrium from a JSON run file.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cournot_balance::config::RunConfig;
use cournot_balance::market::linear::{ClosedFormSolver, LinearMarket, LinearMarketSolution};
use cournot_balance::{Equilibrium, SupplierId, TerminationKind, report, run_cournot};

/// Damped best-response (Cournot) equilibrium on a linear market.
#[derive(Parser, Debug, Clone)]
#[command(name = "cournot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON run file (`options` + `market`).
    pub run_file: PathBuf,

    /// Convergence threshold on a sweep's max change.
    #[arg(long)]
    pub tol: Option<f64>,

    /// Maximum number of sweeps.
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Weight of the new best response, in (0, 1].
    #[arg(long)]
    pub damping: Option<f64>,

    /// Product label passed to the strategic objective.
    #[arg(long)]
    pub co2_label: Option<String>,

    /// Processing order, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub order: Option<Vec<String>>,

    /// Write CSV results into this directory.
    #[arg(short, long, env = "COURNOT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table.
    #[default]
    Table,
    /// JSON for scripting.
    Json,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    termination: TerminationKind,
    iterations: usize,
    max_change: f64,
    totals: Vec<(&'a SupplierId, f64)>,
    prices: &'a [f64],
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = RunConfig::from_path(&cli.run_file)?;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid command-line overrides")?;

    let equilibrium = run_cournot(
        &LinearMarket,
        &config.market,
        ClosedFormSolver::new(),
        config.options.clone(),
        &mut (),
    )
    .context("equilibrium run failed")?;

    let mut stdout = io::stdout().lock();
    print_summary(&mut stdout, &equilibrium, cli.format)?;

    if let Some(dir) = &cli.output_dir {
        report::export_results(dir, &equilibrium)
            .with_context(|| format!("exporting results to '{}'", dir.display()))?;
    }
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, cli: &Cli) {
    let opts = &mut config.options;
    if let Some(tol) = cli.tol {
        opts.tol = tol;
    }
    if let Some(max_iter) = cli.max_iter {
        opts.max_iter = max_iter;
    }
    if let Some(damping) = cli.damping {
        opts.damping = damping;
    }
    if let Some(label) = &cli.co2_label {
        opts.co2_label = label.clone();
    }
    if let Some(order) = &cli.order {
        opts.order = Some(order.iter().map(|s| SupplierId::new(s.trim())).collect());
    }
}

fn print_summary(
    out: &mut impl Write,
    eq: &Equilibrium<LinearMarketSolution>,
    format: Format,
) -> anyhow::Result<()> {
    let summary = Summary {
        termination: eq.termination.kind(),
        iterations: eq.termination.iterations(),
        max_change: eq.termination.max_change(),
        totals: eq.state().iter().map(|(id, s)| (id, s.total())).collect(),
        prices: &eq.solution.prices,
    };
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out)?;
        }
        Format::Table => {
            let status = match summary.termination {
                TerminationKind::Converged => "converged",
                TerminationKind::ExhaustedBudget => "iteration budget exhausted",
            };
            writeln!(
                out,
                "{status} after {} iterations (max change {:.3e})",
                summary.iterations, summary.max_change
            )?;
            writeln!(out)?;
            writeln!(out, "{:<16} {:>14} {:>14}", "SUPPLIER", "TOTAL SALES", "PROFIT")?;
            for (id, total) in &summary.totals {
                let profit = eq.solution.profit_of(id).unwrap_or(f64::NAN);
                writeln!(out, "{:<16} {:>14.4} {:>14.4}", id.as_str(), total, profit)?;
            }
            writeln!(out)?;
            writeln!(out, "{:<8} {:>14}", "PERIOD", "PRICE")?;
            for (t, p) in summary.prices.iter().enumerate() {
                writeln!(out, "{t:<8} {p:>14.4}")?;
            }
        }
    }
    Ok(())
}
