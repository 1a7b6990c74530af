// src/market/linear.rs

//! Reference linear market.
//!
//! One product cleared over a number of periods. In period `t`
//! - the price is `p = a - b * (Σ q_i + F)` (`F` = fixed non-strategic supply),
//! - supplier `i` pays `c_i q + d_i q² / 2` for selling `q`, up to its capacity.
//!
//! Every configured supplier is strategic; its sales vector has one entry per
//! period. Two objectives are supported:
//! - [`Objective::Welfare`]: price-taking clearing (the centralized baseline);
//! - [`Objective::Profit`]: one supplier's best response against pinned
//!   competitors, `q = clamp((a - c - b (Q_fixed + F)) / (2b + d), 0, cap)`.
//!
//! [`ClosedFormSolver`] solves both without an optimizer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::error::EquilibriumError;
use crate::market::sdk::{ModelBuilder, SolveOutcome, SolvedModel, Solver, StrategicModel};
use crate::mechanics::convergence;
use crate::state::{SalesVector, StrategyState, SupplierId};

/// Slack allowed when checking pinned sales against `[0, capacity]`.
const FEASIBILITY_TOL: f64 = 1e-9;

fn default_product() -> String {
    "CO2".to_owned()
}

/// Inverse demand of one period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodDemand {
    /// Price at zero quantity (`a`).
    pub intercept: f64,
    /// Price drop per unit sold (`b`).
    pub slope: f64,
    /// Supply of non-strategic rivals, fixed for the whole run (`F`).
    #[serde(default)]
    pub non_strategic_supply: f64,
}

impl PeriodDemand {
    pub fn new(intercept: f64, slope: f64) -> Self {
        Self { intercept, slope, non_strategic_supply: 0.0 }
    }

    pub fn with_non_strategic_supply(mut self, supply: f64) -> Self {
        self.non_strategic_supply = supply;
        self
    }

    /// Market price when strategic suppliers sell `strategic_total` in total.
    pub fn price(&self, strategic_total: f64) -> f64 {
        self.intercept - self.slope * (strategic_total + self.non_strategic_supply)
    }

    fn demand_at(&self, price: f64) -> f64 {
        ((self.intercept - price) / self.slope).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplierSpec {
    pub id: SupplierId,
    /// Linear cost coefficient (`c`).
    pub marginal_cost: f64,
    /// Quadratic cost coefficient (`d`); marginal cost is `c + d q`.
    #[serde(default)]
    pub quadratic_cost: f64,
    /// Per-period sales cap; `None` is unbounded.
    #[serde(default)]
    pub capacity: Option<f64>,
}

impl SupplierSpec {
    pub fn new(id: impl Into<SupplierId>, marginal_cost: f64) -> Self {
        Self {
            id: id.into(),
            marginal_cost,
            quadratic_cost: 0.0,
            capacity: None,
        }
    }

    pub fn with_quadratic_cost(mut self, quadratic_cost: f64) -> Self {
        self.quadratic_cost = quadratic_cost;
        self
    }

    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn cap(&self) -> f64 {
        self.capacity.unwrap_or(f64::INFINITY)
    }

    pub fn cost(&self, q: f64) -> f64 {
        self.marginal_cost * q + 0.5 * self.quadratic_cost * q * q
    }

    /// Price-taking supply at `price`. Flat-cost suppliers jump straight to
    /// capacity (possibly infinite) above their cost.
    fn supply_at(&self, price: f64) -> f64 {
        if self.quadratic_cost > 0.0 {
            ((price - self.marginal_cost) / self.quadratic_cost).clamp(0.0, self.cap())
        } else if price > self.marginal_cost {
            self.cap()
        } else {
            0.0
        }
    }

    /// Profit-maximizing sales against `others` (strategic competitors plus
    /// non-strategic supply already included by the caller).
    fn best_response(&self, period: &PeriodDemand, others: f64) -> f64 {
        let raw = (period.intercept
            - self.marginal_cost
            - period.slope * (others + period.non_strategic_supply))
            / (2.0 * period.slope + self.quadratic_cost);
        raw.clamp(0.0, self.cap())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LinearMarketError {
    #[error("market has no periods")]
    NoPeriods,
    #[error("market has no suppliers")]
    NoSuppliers,
    #[error("duplicate supplier `{0}`")]
    DuplicateSupplier(SupplierId),
    #[error("period {period}: {reason}")]
    InvalidPeriod { period: usize, reason: String },
    #[error("supplier `{supplier}`: {reason}")]
    InvalidSupplier { supplier: SupplierId, reason: String },
}

/// Market data. Every supplier listed is strategic, in the listed order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearMarketConfig {
    /// Product the strategic suppliers sell; the objective label must match it.
    #[serde(default = "default_product")]
    pub product: String,
    pub periods: Vec<PeriodDemand>,
    pub suppliers: Vec<SupplierSpec>,
}

impl LinearMarketConfig {
    pub fn new(
        product: impl Into<String>,
        periods: Vec<PeriodDemand>,
        suppliers: Vec<SupplierSpec>,
    ) -> Self {
        Self { product: product.into(), periods, suppliers }
    }

    pub fn supplier(&self, id: &SupplierId) -> Option<&SupplierSpec> {
        self.suppliers.iter().find(|s| &s.id == id)
    }

    /// Integrity check of demand and supplier data.
    pub fn validate(&self) -> Result<(), LinearMarketError> {
        if self.periods.is_empty() {
            return Err(LinearMarketError::NoPeriods);
        }
        if self.suppliers.is_empty() {
            return Err(LinearMarketError::NoSuppliers);
        }
        for (t, p) in self.periods.iter().enumerate() {
            let bad = |reason: &str| LinearMarketError::InvalidPeriod {
                period: t,
                reason: reason.to_owned(),
            };
            if !p.intercept.is_finite() {
                return Err(bad("intercept must be finite"));
            }
            if !(p.slope.is_finite() && p.slope > 0.0) {
                return Err(bad("slope must be positive and finite"));
            }
            if !(p.non_strategic_supply.is_finite() && p.non_strategic_supply >= 0.0) {
                return Err(bad("non-strategic supply must be non-negative and finite"));
            }
        }
        for (i, s) in self.suppliers.iter().enumerate() {
            if self.suppliers[..i].iter().any(|o| o.id == s.id) {
                return Err(LinearMarketError::DuplicateSupplier(s.id.clone()));
            }
            let bad = |reason: &str| LinearMarketError::InvalidSupplier {
                supplier: s.id.clone(),
                reason: reason.to_owned(),
            };
            if !(s.marginal_cost.is_finite() && s.marginal_cost >= 0.0) {
                return Err(bad("marginal cost must be non-negative and finite"));
            }
            if !(s.quadratic_cost.is_finite() && s.quadratic_cost >= 0.0) {
                return Err(bad("quadratic cost must be non-negative and finite"));
            }
            if let Some(cap) = s.capacity {
                if !(cap.is_finite() && cap >= 0.0) {
                    return Err(bad("capacity must be non-negative and finite"));
                }
            }
        }
        Ok(())
    }

    /// Interior Cournot–Nash equilibrium in closed form, per period.
    ///
    /// Ignores capacities and the non-negativity of sales, so it matches the
    /// loop's fixed point only when neither binds.
    pub fn analytic_equilibrium(&self) -> Result<StrategyState, EquilibriumError> {
        let mut columns = vec![Vec::with_capacity(self.periods.len()); self.suppliers.len()];
        for p in &self.periods {
            let a = p.intercept - p.slope * p.non_strategic_supply;
            let b = p.slope;
            let weighted: f64 = self
                .suppliers
                .iter()
                .map(|s| (a - s.marginal_cost) / (b + s.quadratic_cost))
                .sum();
            let inv: f64 = self.suppliers.iter().map(|s| 1.0 / (b + s.quadratic_cost)).sum();
            let total = weighted / (1.0 + b * inv);
            for (col, s) in columns.iter_mut().zip(&self.suppliers) {
                col.push((a - s.marginal_cost - b * total) / (b + s.quadratic_cost));
            }
        }
        StrategyState::from_entries(
            self.suppliers
                .iter()
                .zip(columns)
                .map(|(s, col)| (s.id.clone(), SalesVector::new(col))),
        )
    }
}

/// Objective of a [`LinearMarketModel`].
#[derive(Clone, Debug, PartialEq)]
pub enum Objective {
    /// Price-taking clearing of every supplier that is not pinned.
    Welfare,
    /// Profit of `supplier` selling `product`; everyone else must be pinned.
    Profit { supplier: SupplierId, product: String },
}

/// One instance of the market, with pinned sales and an objective.
#[derive(Clone, Debug)]
pub struct LinearMarketModel {
    config: LinearMarketConfig,
    fixed: Vec<Option<SalesVector>>,
    objective: Objective,
}

impl LinearMarketModel {
    pub fn new(config: LinearMarketConfig) -> Self {
        let fixed = vec![None; config.suppliers.len()];
        Self { config, fixed, objective: Objective::Welfare }
    }

    pub fn config(&self) -> &LinearMarketConfig {
        &self.config
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn fixed_sales(&self, supplier: &SupplierId) -> Option<&SalesVector> {
        let i = self.config.suppliers.iter().position(|s| &s.id == supplier)?;
        self.fixed[i].as_ref()
    }

    /// Pin one supplier's sales. Returns `false` for an unknown supplier.
    pub fn fix_sales(&mut self, supplier: &SupplierId, sales: SalesVector) -> bool {
        match self.config.suppliers.iter().position(|s| &s.id == supplier) {
            Some(i) => {
                self.fixed[i] = Some(sales);
                true
            }
            None => false,
        }
    }

    fn pin_from(&mut self, state: &StrategyState, excluding: Option<&SupplierId>) {
        for (spec, slot) in self.config.suppliers.iter().zip(self.fixed.iter_mut()) {
            if Some(&spec.id) == excluding {
                continue;
            }
            if let Some(sales) = state.get(&spec.id) {
                *slot = Some(sales.clone());
            }
        }
    }
}

impl StrategicModel for LinearMarketModel {
    fn fix_competitors_sales(&mut self, state: &StrategyState, excluding: &SupplierId) {
        self.pin_from(state, Some(excluding));
    }

    fn fix_all_strategic_sales(&mut self, state: &StrategyState) {
        self.pin_from(state, None);
    }

    fn define_strategic_objective(mut self, supplier: &SupplierId, co2_label: &str) -> Self {
        self.objective = Objective::Profit {
            supplier: supplier.clone(),
            product: co2_label.to_owned(),
        };
        self
    }
}

/// Builder for [`LinearMarketModel`]s; the configuration is the market data.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearMarket;

impl ModelBuilder for LinearMarket {
    type Config = LinearMarketConfig;
    type Model = LinearMarketModel;

    fn strategic_suppliers(&self, config: &LinearMarketConfig) -> Vec<SupplierId> {
        config.suppliers.iter().map(|s| s.id.clone()).collect()
    }

    fn build_model(&self, config: &LinearMarketConfig) -> LinearMarketModel {
        LinearMarketModel::new(config.clone())
    }
}

/// Solved market: per-period prices, sales and per-supplier profits.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinearMarketSolution {
    pub product: String,
    pub prices: Vec<f64>,
    pub sales: Vec<(SupplierId, SalesVector)>,
    pub profits: Vec<(SupplierId, f64)>,
}

impl LinearMarketSolution {
    pub fn price(&self, period: usize) -> Option<f64> {
        self.prices.get(period).copied()
    }

    pub fn sales_of(&self, supplier: &SupplierId) -> Option<&SalesVector> {
        self.sales.iter().find(|(id, _)| id == supplier).map(|(_, s)| s)
    }

    pub fn profit_of(&self, supplier: &SupplierId) -> Option<f64> {
        self.profits.iter().find(|(id, _)| id == supplier).map(|(_, p)| *p)
    }

    /// Strategic sales summed over suppliers in one period.
    pub fn total_sales(&self, period: usize) -> f64 {
        self.sales.iter().filter_map(|(_, s)| s.as_slice().get(period)).sum()
    }
}

impl SolvedModel for LinearMarketSolution {
    fn extract_sales_for_supplier(&self, supplier: &SupplierId) -> Option<SalesVector> {
        self.sales_of(supplier).cloned()
    }

    fn prices(&self) -> Option<&[f64]> {
        Some(&self.prices)
    }

    fn supplier_profit(&self, supplier: &SupplierId) -> Option<f64> {
        self.profit_of(supplier)
    }
}

/// Closed-form solver for [`LinearMarketModel`].
#[derive(Clone, Debug)]
pub struct ClosedFormSolver {
    /// Bisection steps when searching the competitive price.
    pub bisection_steps: usize,
    solves: usize,
}

impl Default for ClosedFormSolver {
    fn default() -> Self {
        Self { bisection_steps: 200, solves: 0 }
    }
}

impl ClosedFormSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `solve` calls so far.
    pub fn solves(&self) -> usize {
        self.solves
    }

    fn check_fixed(&self, model: &LinearMarketModel) -> Result<(), SolveOutcome<LinearMarketSolution>> {
        let periods = model.config.periods.len();
        for (spec, fixed) in model.config.suppliers.iter().zip(&model.fixed) {
            let Some(sales) = fixed else { continue };
            if sales.len() != periods {
                return Err(SolveOutcome::SolverError(format!(
                    "pinned sales for `{}` have {} entries, market has {periods} periods",
                    spec.id,
                    sales.len()
                )));
            }
            if let Some((t, v)) = convergence::first_non_finite(sales.as_slice()) {
                return Err(SolveOutcome::SolverError(format!(
                    "pinned sales for `{}` are non-finite in period {t}: {v}",
                    spec.id
                )));
            }
            let cap = spec.cap();
            if sales
                .iter()
                .any(|&q| q < -FEASIBILITY_TOL || q > cap + FEASIBILITY_TOL)
            {
                debug!(supplier = %spec.id, "pinned sales outside [0, capacity]");
                return Err(SolveOutcome::Infeasible);
            }
        }
        Ok(())
    }

    /// Competitive clearing of the unpinned suppliers in one period.
    fn clear_period(&self, period: &PeriodDemand, free: &[&SupplierSpec], pinned_total: f64) -> Vec<f64> {
        let mut out = vec![0.0; free.len()];
        if free.is_empty() {
            return out;
        }
        let base = pinned_total + period.non_strategic_supply;
        let floor = free.iter().map(|s| s.marginal_cost).fold(f64::INFINITY, f64::min);
        let no_entry_price = period.price(pinned_total);
        if no_entry_price <= floor {
            return out;
        }

        let excess = |p: f64| base + free.iter().map(|s| s.supply_at(p)).sum::<f64>() - period.demand_at(p);
        let (mut lo, mut hi) = (floor, no_entry_price);
        for _ in 0..self.bisection_steps {
            let mid = 0.5 * (lo + hi);
            if excess(mid) >= 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let price = hi;
        let eps = 1e-9 * (1.0 + price.abs());

        // Flat-cost suppliers priced exactly at the margin share what is left.
        let mut marginal = Vec::new();
        let mut served = base;
        for (i, s) in free.iter().enumerate() {
            if s.quadratic_cost > 0.0 {
                out[i] = s.supply_at(price);
            } else if (price - s.marginal_cost).abs() <= eps
                || (s.marginal_cost < price && s.capacity.is_none())
            {
                marginal.push(i);
                continue;
            } else if s.marginal_cost < price {
                out[i] = s.cap();
            }
            served += out[i];
        }
        let mut remaining = (period.demand_at(price) - served).max(0.0);
        marginal.sort_by(|&x, &y| free[x].cap().total_cmp(&free[y].cap()));
        let mut left = marginal.len();
        for i in marginal {
            let q = (remaining / left as f64).min(free[i].cap());
            out[i] = q;
            remaining -= q;
            left -= 1;
        }
        trace!(price, "competitive period cleared");
        out
    }
}

impl Solver<LinearMarketModel> for ClosedFormSolver {
    type Solution = LinearMarketSolution;

    fn solve(&mut self, model: LinearMarketModel) -> SolveOutcome<LinearMarketSolution> {
        self.solves += 1;
        if let Err(e) = model.config.validate() {
            return SolveOutcome::SolverError(format!("invalid market: {e}"));
        }
        if let Err(outcome) = self.check_fixed(&model) {
            return outcome;
        }
        let cfg = &model.config;
        let n_periods = cfg.periods.len();
        let mut columns: Vec<Vec<f64>> = model
            .fixed
            .iter()
            .map(|f| f.as_ref().map_or_else(|| vec![0.0; n_periods], |s| s.as_slice().to_vec()))
            .collect();

        match &model.objective {
            Objective::Welfare => {
                let free: Vec<usize> = (0..cfg.suppliers.len())
                    .filter(|&i| model.fixed[i].is_none())
                    .collect();
                let specs: Vec<&SupplierSpec> = free.iter().map(|&i| &cfg.suppliers[i]).collect();
                for (t, period) in cfg.periods.iter().enumerate() {
                    let pinned_total: f64 = model
                        .fixed
                        .iter()
                        .flatten()
                        .map(|s| s[t])
                        .sum();
                    let cleared = self.clear_period(period, &specs, pinned_total);
                    for (&i, q) in free.iter().zip(cleared) {
                        columns[i][t] = q;
                    }
                }
            }
            Objective::Profit { supplier, product } => {
                if product != &cfg.product {
                    return SolveOutcome::SolverError(format!(
                        "unknown product label `{product}`; market clears `{}`",
                        cfg.product
                    ));
                }
                let Some(k) = cfg.suppliers.iter().position(|s| &s.id == supplier) else {
                    return SolveOutcome::SolverError(format!("unknown supplier `{supplier}`"));
                };
                if let Some(j) = (0..cfg.suppliers.len()).find(|&j| j != k && model.fixed[j].is_none()) {
                    return SolveOutcome::SolverError(format!(
                        "supplier `{}` is neither pinned nor optimizing",
                        cfg.suppliers[j].id
                    ));
                }
                if model.fixed[k].is_none() {
                    let spec = &cfg.suppliers[k];
                    for (t, period) in cfg.periods.iter().enumerate() {
                        let others: f64 = (0..cfg.suppliers.len())
                            .filter(|&j| j != k)
                            .map(|j| columns[j][t])
                            .sum();
                        columns[k][t] = spec.best_response(period, others);
                    }
                }
            }
        }

        let prices: Vec<f64> = cfg
            .periods
            .iter()
            .enumerate()
            .map(|(t, p)| p.price(columns.iter().map(|c| c[t]).sum()))
            .collect();
        let profits: Vec<(SupplierId, f64)> = cfg
            .suppliers
            .iter()
            .zip(&columns)
            .map(|(s, col)| {
                let profit: f64 = col
                    .iter()
                    .zip(&prices)
                    .map(|(&q, &p)| p * q - s.cost(q))
                    .sum();
                (s.id.clone(), profit)
            })
            .collect();
        debug!(objective = ?model.objective, "linear market solved");

        SolveOutcome::Optimal(LinearMarketSolution {
            product: cfg.product.clone(),
            prices,
            sales: cfg
                .suppliers
                .iter()
                .zip(columns)
                .map(|(s, col)| (s.id.clone(), SalesVector::new(col)))
                .collect(),
            profits,
        })
    }
}
