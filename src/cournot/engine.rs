//! Best-response iteration engine.
//!
//! Runs the three phases of an equilibrium computation against the collaborator
//! traits of [`crate::market::sdk`]:
//!
//! 1. **Baseline**: one centralized solve; its strategic sales seed the state.
//! 2. **Sweeps**: for every supplier, in processing order, build a fresh
//!    submodel, pin the competitors to the *current* state, swap in the
//!    supplier's profit objective, solve, and write the damped best response
//!    back. Later suppliers in a sweep see the updates of earlier ones
//!    (Gauss–Seidel). Sweeps stop on `max_change < tol` or after `max_iter`.
//! 3. **Finalization**: one solve with every strategic supplier pinned.
//!
//! Every solver failure is fatal. Nothing runs concurrently.

use tracing::{debug, info, warn};

use crate::cournot::options::EquilibriumOptions;
use crate::cournot::outcome::{Equilibrium, IterationSummary, Termination, TerminationKind};
use crate::error::{EquilibriumError, Phase, SolveContext};
use crate::market::sdk::{
    ModelBuilder, Observer, SolveOutcome, SolvedModel, Solver, StrategicModel, SupplierUpdate,
};
use crate::mechanics::{control, convergence};
use crate::refine_det;
use crate::state::{SalesVector, StrategyState, SupplierId};

/// Where the engine is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineState {
    Initializing,
    Iterating,
    Converged,
    ExhaustedBudget,
}

/// Baseline solve result: the solved centralized model and the initial state.
#[derive(Clone, Debug)]
pub struct Baseline<S> {
    pub solution: S,
    pub state: StrategyState,
}

/// The best-response loop bound to one builder, configuration and solver.
pub struct BestResponse<'a, B, S>
where
    B: ModelBuilder,
    S: Solver<B::Model>,
{
    builder: &'a B,
    config: &'a B::Config,
    solver: S,
    options: EquilibriumOptions,
    suppliers: Vec<SupplierId>,
    order: Vec<SupplierId>,
    phase: EngineState,
    history: Vec<IterationSummary>,
}

impl<'a, B, S> BestResponse<'a, B, S>
where
    B: ModelBuilder,
    S: Solver<B::Model>,
{
    /// Validate `options` and resolve the processing order against the
    /// builder's strategic set.
    pub fn new(
        builder: &'a B,
        config: &'a B::Config,
        solver: S,
        options: EquilibriumOptions,
    ) -> Result<Self, EquilibriumError> {
        options.validate()?;
        let suppliers = builder.strategic_suppliers(config);
        let order = options.resolve_order(&suppliers)?;
        Ok(Self {
            builder,
            config,
            solver,
            options,
            suppliers,
            order,
            phase: EngineState::Initializing,
            history: Vec::new(),
        })
    }

    /// Strategic suppliers in configured order (state order).
    pub fn suppliers(&self) -> &[SupplierId] {
        &self.suppliers
    }

    /// Order in which suppliers are processed within a sweep.
    pub fn order(&self) -> &[SupplierId] {
        &self.order
    }

    pub fn engine_state(&self) -> EngineState {
        self.phase
    }

    /// Summaries of the sweeps run by the last [`Self::iterate`].
    pub fn history(&self) -> &[IterationSummary] {
        &self.history
    }

    /// Centralized solve; its strategic sales become the initial state.
    pub fn initialize<O>(&mut self, observer: &mut O) -> Result<Baseline<S::Solution>, EquilibriumError>
    where
        O: Observer + ?Sized,
    {
        self.phase = EngineState::Initializing;
        let context = SolveContext::baseline();
        let model = self.builder.build_model(self.config);
        let solution = optimal(self.solver.solve(model), &context)?;
        let state = solution.extract_current_sales(&self.suppliers, &context)?;
        for (supplier, sales) in state.iter() {
            if let Some((index, value)) = convergence::first_non_finite(sales.as_slice()) {
                return Err(EquilibriumError::NonFiniteBaseline {
                    supplier: supplier.clone(),
                    index,
                    value,
                });
            }
        }
        info!(suppliers = state.len(), "baseline solve complete");
        observer.on_baseline(&state);
        Ok(Baseline { solution, state })
    }

    /// One Gauss–Seidel sweep over all suppliers, updating `state` in place.
    ///
    /// On error the failing supplier's entry is left untouched; entries
    /// written earlier in the sweep stay written.
    pub fn sweep<O>(
        &mut self,
        state: &mut StrategyState,
        iteration: usize,
        observer: &mut O,
    ) -> Result<IterationSummary, EquilibriumError>
    where
        O: Observer + ?Sized,
    {
        let damping = self.options.damping;
        let mut max_change = 0.0_f64;

        for supplier in &self.order {
            let context = SolveContext::iteration(supplier, iteration);
            let q_old = state
                .get(supplier)
                .ok_or_else(|| EquilibriumError::UnknownSupplier(supplier.clone()))?;

            let mut model = self.builder.build_model(self.config);
            model.fix_competitors_sales(state, supplier);
            let model = model.define_strategic_objective(supplier, &self.options.co2_label);
            let solution = optimal(self.solver.solve(model), &context)?;

            let q_new = solution.extract_sales_for_supplier(supplier).ok_or_else(|| {
                EquilibriumError::MissingSales {
                    supplier: supplier.clone(),
                    context: context.clone(),
                }
            })?;
            if q_new.len() != q_old.len() {
                return Err(EquilibriumError::DimensionMismatch {
                    supplier: supplier.clone(),
                    iteration,
                    expected: q_old.len(),
                    found: q_new.len(),
                });
            }
            if let Some((index, value)) = convergence::first_non_finite(q_new.as_slice()) {
                return Err(EquilibriumError::NonFiniteUpdate {
                    supplier: supplier.clone(),
                    iteration,
                    index,
                    value,
                });
            }

            let q_updated = control::damp_all(q_old.as_slice(), q_new.as_slice(), damping);
            if let Some((index, value)) = convergence::first_non_finite(&q_updated) {
                return Err(EquilibriumError::NonFiniteUpdate {
                    supplier: supplier.clone(),
                    iteration,
                    index,
                    value,
                });
            }
            let change = convergence::max_abs_change(&q_updated, q_old.as_slice());
            state.replace(supplier, SalesVector::new(q_updated))?;
            max_change = max_change.max(change);

            debug!(iteration, supplier = %supplier, change, "best response written");
            if let Some(sales) = state.get(supplier) {
                observer.on_best_response(&SupplierUpdate { iteration, supplier, sales, change });
            }
        }

        let summary = IterationSummary { iteration, max_change };
        info!(iteration, max_change, "best-response sweep complete");
        observer.on_iteration(&summary);
        Ok(summary)
    }

    /// Sweep from `state` until `max_change < tol` or `max_iter` sweeps.
    pub fn iterate<O>(
        &mut self,
        state: StrategyState,
        observer: &mut O,
    ) -> Result<Termination, EquilibriumError>
    where
        O: Observer + ?Sized,
    {
        self.phase = EngineState::Iterating;
        self.history.clear();
        let tol = self.options.tol;
        let max_iter = self.options.max_iter;

        let outcome = refine_det(
            state,
            |st: &mut StrategyState, iteration| {
                let summary = self.sweep(st, iteration, &mut *observer)?;
                self.history.push(summary);
                Ok::<_, EquilibriumError>(summary.max_change)
            },
            |max_change: &f64| convergence::within(*max_change, tol),
            max_iter,
        )?;

        let max_change = outcome.metric.unwrap_or(f64::INFINITY);
        let termination = if outcome.converged {
            self.phase = EngineState::Converged;
            info!(iterations = outcome.iters, max_change, "converged to best-response fixed point");
            Termination::Converged {
                state: outcome.theta,
                iterations: outcome.iters,
                max_change,
            }
        } else {
            self.phase = EngineState::ExhaustedBudget;
            warn!(
                iterations = outcome.iters,
                max_change, tol, "iteration budget exhausted without convergence"
            );
            Termination::ExhaustedBudget {
                state: outcome.theta,
                iterations: outcome.iters,
                max_change,
            }
        };
        observer.on_termination(termination.kind(), termination.iterations());
        Ok(termination)
    }

    /// Solve the full model with every strategic supplier pinned to `state`.
    pub fn finalize(&mut self, state: &StrategyState) -> Result<S::Solution, EquilibriumError> {
        let mut model = self.builder.build_model(self.config);
        model.fix_all_strategic_sales(state);
        let solution = optimal(self.solver.solve(model), &SolveContext::finalization())?;
        debug!(suppliers = state.len(), "final solve complete");
        Ok(solution)
    }

    /// Baseline, sweeps and finalization in one call.
    pub fn run<O>(mut self, observer: &mut O) -> Result<Equilibrium<S::Solution>, EquilibriumError>
    where
        O: Observer + ?Sized,
    {
        let Baseline { solution: baseline_solution, state: baseline } =
            self.initialize(&mut *observer)?;
        let termination = self.iterate(baseline.clone(), &mut *observer)?;
        let solution = self.finalize(termination.state())?;
        Ok(Equilibrium {
            baseline,
            baseline_solution,
            termination,
            solution,
            history: self.history,
        })
    }
}

/// Run the full best-response loop.
pub fn run_cournot<B, S, O>(
    builder: &B,
    config: &B::Config,
    solver: S,
    options: EquilibriumOptions,
    observer: &mut O,
) -> Result<Equilibrium<S::Solution>, EquilibriumError>
where
    B: ModelBuilder,
    S: Solver<B::Model>,
    O: Observer + ?Sized,
{
    BestResponse::new(builder, config, solver, options)?.run(observer)
}

fn optimal<T>(outcome: SolveOutcome<T>, context: &SolveContext) -> Result<T, EquilibriumError> {
    match outcome {
        SolveOutcome::Optimal(solution) => Ok(solution),
        SolveOutcome::Infeasible => Err(match (context.phase, &context.supplier, context.iteration) {
            (Phase::Iteration, Some(supplier), Some(iteration)) => {
                EquilibriumError::SubproblemInfeasible {
                    supplier: supplier.clone(),
                    iteration,
                }
            }
            (Phase::Finalization, ..) => EquilibriumError::FinalizationInfeasible,
            _ => EquilibriumError::BaselineInfeasible,
        }),
        SolveOutcome::SolverError(reason) => Err(EquilibriumError::SolverError {
            context: context.clone(),
            reason,
        }),
    }
}
