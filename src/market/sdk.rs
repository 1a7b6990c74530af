// src/market/sdk.rs

//! # Market SDK
//!
//! Collaborator protocol between the best-response loop and a market model.
//! The loop never formulates or solves anything itself; it drives four small
//! traits that a market implementation provides.
//!
//! ## What a market implementation provides
//!
//! 1) **[`ModelBuilder`]**: `build_model(&config) -> Model`
//!    - Pure in the configuration: every call returns a fresh, independent
//!      model. The loop calls it once per solve (baseline, once per supplier
//!      per sweep, and once for finalization).
//!    - `strategic_suppliers(&config)` returns the strategic set in its
//!      configured order. That order is the default processing order.
//!
//! 2) **[`StrategicModel`]**: the three reformulations the loop needs
//!    - `fix_competitors_sales(state, excluding)`: pin every strategic
//!      supplier except `excluding` to its entry in `state`.
//!    - `fix_all_strategic_sales(state)`: pin everyone (finalization).
//!    - `define_strategic_objective(supplier, co2_label)`: consume the model
//!      and return it with `supplier`'s profit as the objective. The label is
//!      opaque to the loop and forwarded untouched.
//!
//! 3) **[`Solver`]**: `solve(model) -> SolveOutcome`
//!    - Blocking; `Infeasible` and `SolverError` are both fatal to the run.
//!
//! 4) **[`SolvedModel`]**: per-supplier sales extraction from a solution.
//!    Markets that clear a price may also expose `prices()` and
//!    `supplier_profit()`; both default to `None` and only feed the export.
//!
//! ## Observers (optional)
//! Implement [`Observer`] to watch a run without touching the loop:
//!
//! - `on_baseline(&state)`: initial strategy state after the baseline solve.
//! - `on_best_response(&update)`: one supplier's damped update was written.
//! - `on_iteration(&summary)`: a sweep finished (`iteration`, `max_change`).
//! - `on_termination(kind, iterations)`: converged or budget exhausted.
//!
//! `()` is the no-op observer; [`IterationHistory`] records the summaries.
//!
//! ## Determinism
//! Suppliers are processed strictly one at a time. Keep `build_model` free of
//! hidden state so two runs over the same configuration are identical.

use crate::cournot::{IterationSummary, TerminationKind};
use crate::error::{EquilibriumError, SolveContext};
use crate::state::{SalesVector, StrategyState, SupplierId};

/// What a solve returns.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveOutcome<S> {
    Optimal(S),
    Infeasible,
    SolverError(String),
}

/// Builds fresh market models from configuration.
pub trait ModelBuilder {
    type Config;
    type Model: StrategicModel;

    /// Strategic suppliers in configured order.
    fn strategic_suppliers(&self, config: &Self::Config) -> Vec<SupplierId>;

    fn build_model(&self, config: &Self::Config) -> Self::Model;
}

/// Reformulations applied to a freshly built model.
pub trait StrategicModel: Sized {
    /// Pin every strategic supplier except `excluding` to its value in `state`.
    fn fix_competitors_sales(&mut self, state: &StrategyState, excluding: &SupplierId);

    /// Pin every strategic supplier to its value in `state`.
    fn fix_all_strategic_sales(&mut self, state: &StrategyState);

    /// Replace the objective with `supplier`'s profit maximization.
    fn define_strategic_objective(self, supplier: &SupplierId, co2_label: &str) -> Self;
}

/// Solves models to optimality.
pub trait Solver<M> {
    type Solution: SolvedModel;

    fn solve(&mut self, model: M) -> SolveOutcome<Self::Solution>;
}

impl<M, S: Solver<M> + ?Sized> Solver<M> for &mut S {
    type Solution = S::Solution;

    fn solve(&mut self, model: M) -> SolveOutcome<Self::Solution> {
        (**self).solve(model)
    }
}

/// Read access to a solved model.
pub trait SolvedModel {
    fn extract_sales_for_supplier(&self, supplier: &SupplierId) -> Option<SalesVector>;

    /// Sales of every supplier in `suppliers`, in that order.
    fn extract_current_sales(
        &self,
        suppliers: &[SupplierId],
        context: &SolveContext,
    ) -> Result<StrategyState, EquilibriumError> {
        let mut entries = Vec::with_capacity(suppliers.len());
        for supplier in suppliers {
            let sales = self.extract_sales_for_supplier(supplier).ok_or_else(|| {
                EquilibriumError::MissingSales {
                    supplier: supplier.clone(),
                    context: context.clone(),
                }
            })?;
            entries.push((supplier.clone(), sales));
        }
        StrategyState::from_entries(entries)
    }

    /// Clearing price of the strategic product, one entry per index.
    fn prices(&self) -> Option<&[f64]> {
        None
    }

    fn supplier_profit(&self, _supplier: &SupplierId) -> Option<f64> {
        None
    }
}

/// One supplier's written update inside a sweep.
#[derive(Clone, Debug)]
pub struct SupplierUpdate<'a> {
    pub iteration: usize,
    pub supplier: &'a SupplierId,
    pub sales: &'a SalesVector,
    /// Max absolute componentwise change of this update.
    pub change: f64,
}

/// Watches a run. Every method defaults to a no-op.
pub trait Observer {
    fn on_baseline(&mut self, _state: &StrategyState) {}
    fn on_best_response(&mut self, _update: &SupplierUpdate<'_>) {}
    fn on_iteration(&mut self, _summary: &IterationSummary) {}
    fn on_termination(&mut self, _kind: TerminationKind, _iterations: usize) {}
}

impl Observer for () {}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn on_baseline(&mut self, state: &StrategyState) {
        (**self).on_baseline(state);
    }
    fn on_best_response(&mut self, update: &SupplierUpdate<'_>) {
        (**self).on_best_response(update);
    }
    fn on_iteration(&mut self, summary: &IterationSummary) {
        (**self).on_iteration(summary);
    }
    fn on_termination(&mut self, kind: TerminationKind, iterations: usize) {
        (**self).on_termination(kind, iterations);
    }
}

/// Records every iteration summary.
#[derive(Clone, Debug, Default)]
pub struct IterationHistory {
    pub summaries: Vec<IterationSummary>,
    pub termination: Option<(TerminationKind, usize)>,
}

impl IterationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest `max_change` seen across all recorded sweeps.
    pub fn peak_change(&self) -> f64 {
        self.summaries
            .iter()
            .map(|s| s.max_change)
            .fold(0.0, f64::max)
    }
}

impl Observer for IterationHistory {
    fn on_iteration(&mut self, summary: &IterationSummary) {
        self.summaries.push(*summary);
    }

    fn on_termination(&mut self, kind: TerminationKind, iterations: usize) {
        self.termination = Some((kind, iterations));
    }
}
