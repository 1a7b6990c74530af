// src/report.rs

//! CSV export of a finished run.
//!
//! All files are long-format:
//! - `equilibrium_sales.csv`: `supplier,index,sales` for the final state;
//! - `iterations.csv`: `iteration,max_change` per sweep;
//! - `comparison.csv`: baseline vs strategic sales and their difference;
//! - `prices.csv`: `period,central,strategic,delta` clearing prices;
//! - `profits.csv`: `supplier,central,strategic,delta` from both solves.
//!
//! The last two are written only when the solution exposes prices or profits.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::cournot::{Equilibrium, IterationSummary};
use crate::market::sdk::SolvedModel;
use crate::state::{StrategyState, SupplierId};

pub const SALES_FILE: &str = "equilibrium_sales.csv";
pub const HISTORY_FILE: &str = "iterations.csv";
pub const COMPARISON_FILE: &str = "comparison.csv";
pub const PRICES_FILE: &str = "prices.csv";
pub const PROFITS_FILE: &str = "profits.csv";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create output directory '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("supplier `{supplier}` cannot be compared: {reason}")]
    Mismatch { supplier: SupplierId, reason: String },
    #[error("price series differ in length: {central} central vs {strategic} strategic")]
    PriceMismatch { central: usize, strategic: usize },
}

#[derive(Debug, Serialize)]
struct SalesRow<'a> {
    supplier: &'a str,
    index: usize,
    sales: f64,
}

/// One row of a baseline vs strategic comparison.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SalesDelta {
    pub supplier: SupplierId,
    pub index: usize,
    pub central: f64,
    pub strategic: f64,
    /// `strategic - central`.
    pub delta: f64,
}

/// Clearing price of one period in both solves.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceDelta {
    pub period: usize,
    pub central: f64,
    pub strategic: f64,
    pub delta: f64,
}

/// Profit of one supplier in both solves.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProfitDelta {
    pub supplier: SupplierId,
    pub central: f64,
    pub strategic: f64,
    pub delta: f64,
}

pub fn write_sales_csv(path: impl AsRef<Path>, state: &StrategyState) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (supplier, sales) in state.iter() {
        for (index, &q) in sales.iter().enumerate() {
            wtr.serialize(SalesRow { supplier: supplier.as_str(), index, sales: q })?;
        }
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_history_csv(
    path: impl AsRef<Path>,
    history: &[IterationSummary],
) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for summary in history {
        wtr.serialize(summary)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Pair every supplier of `central` with its entry in `strategic`.
pub fn compare_sales(
    central: &StrategyState,
    strategic: &StrategyState,
) -> Result<Vec<SalesDelta>, ReportError> {
    let mut rows = Vec::new();
    for (supplier, base) in central.iter() {
        let Some(eq) = strategic.get(supplier) else {
            return Err(ReportError::Mismatch {
                supplier: supplier.clone(),
                reason: "missing from the strategic state".to_owned(),
            });
        };
        if eq.len() != base.len() {
            return Err(ReportError::Mismatch {
                supplier: supplier.clone(),
                reason: format!("{} central entries vs {} strategic", base.len(), eq.len()),
            });
        }
        rows.extend(base.iter().zip(eq.iter()).enumerate().map(|(index, (&c, &s))| {
            SalesDelta {
                supplier: supplier.clone(),
                index,
                central: c,
                strategic: s,
                delta: s - c,
            }
        }));
    }
    Ok(rows)
}

pub fn compare_prices(central: &[f64], strategic: &[f64]) -> Result<Vec<PriceDelta>, ReportError> {
    if central.len() != strategic.len() {
        return Err(ReportError::PriceMismatch {
            central: central.len(),
            strategic: strategic.len(),
        });
    }
    Ok(central
        .iter()
        .zip(strategic)
        .enumerate()
        .map(|(period, (&c, &s))| PriceDelta { period, central: c, strategic: s, delta: s - c })
        .collect())
}

/// Profits of `suppliers` in both solutions; suppliers either side does not
/// report are skipped.
pub fn compare_profits<S: SolvedModel>(
    suppliers: &[SupplierId],
    central: &S,
    strategic: &S,
) -> Vec<ProfitDelta> {
    suppliers
        .iter()
        .filter_map(|supplier| {
            let c = central.supplier_profit(supplier)?;
            let s = strategic.supplier_profit(supplier)?;
            Some(ProfitDelta { supplier: supplier.clone(), central: c, strategic: s, delta: s - c })
        })
        .collect()
}

pub fn write_comparison_csv(path: impl AsRef<Path>, rows: &[SalesDelta]) -> Result<(), ReportError> {
    write_rows(path, rows)
}

pub fn write_prices_csv(path: impl AsRef<Path>, rows: &[PriceDelta]) -> Result<(), ReportError> {
    write_rows(path, rows)
}

pub fn write_profits_csv(path: impl AsRef<Path>, rows: &[ProfitDelta]) -> Result<(), ReportError> {
    write_rows(path, rows)
}

fn write_rows<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write every CSV file into `dir` (created if missing).
pub fn export_results<S: SolvedModel>(
    dir: impl AsRef<Path>,
    equilibrium: &Equilibrium<S>,
) -> Result<(), ReportError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let sales = dir.join(SALES_FILE);
    write_sales_csv(&sales, equilibrium.state())?;
    let history = dir.join(HISTORY_FILE);
    write_history_csv(&history, &equilibrium.history)?;
    let comparison = dir.join(COMPARISON_FILE);
    let rows = compare_sales(&equilibrium.baseline, equilibrium.state())?;
    write_comparison_csv(&comparison, &rows)?;

    match (equilibrium.baseline_solution.prices(), equilibrium.solution.prices()) {
        (Some(central), Some(strategic)) => {
            let prices = dir.join(PRICES_FILE);
            write_prices_csv(&prices, &compare_prices(central, strategic)?)?;
            info!(prices = %prices.display(), "prices exported");
        }
        _ => debug!("solution exposes no prices"),
    }

    let suppliers: Vec<SupplierId> = equilibrium.state().suppliers().cloned().collect();
    let profits = compare_profits(&suppliers, &equilibrium.baseline_solution, &equilibrium.solution);
    if profits.is_empty() {
        debug!("solution exposes no profits");
    } else {
        let path = dir.join(PROFITS_FILE);
        write_profits_csv(&path, &profits)?;
        info!(profits = %path.display(), "profits exported");
    }

    info!(
        sales = %sales.display(),
        history = %history.display(),
        comparison = %comparison.display(),
        "results exported"
    );
    Ok(())
}
