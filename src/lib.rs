/*!
`cournot_balance`: a damped best-response loop for strategic suppliers.

What it does
- Computes a Cournot equilibrium among strategic suppliers that sit inside a
  larger market-clearing model.
- Each supplier in turn maximizes its own profit with every competitor's
  sales pinned to the current strategy state; the result is blended into the
  state with a damping factor.
- Sweeps repeat until the largest change in one sweep drops below `tol`, or
  until `max_iter` sweeps have been spent.
- A final solve with every strategic supplier pinned yields system-wide
  results.

How to use (call surface only)
- Implement the collaborator traits in [`market::sdk`] for your model:
  * [`ModelBuilder`]: `build_model(&config) -> Model` plus the strategic set;
  * [`StrategicModel`]: pin competitors / pin everyone / swap the objective;
  * [`Solver`]: `solve(Model) -> SolveOutcome`;
  * [`SolvedModel`]: per-supplier sales extraction.
- Call [`run_cournot`] (or drive [`BestResponse`] phase by phase).
- With the default `market-linear` feature, [`market::linear`] provides a
  closed-form reference market implementing all four traits.

What it does NOT do
- No market formulation and no solver internals. Those are yours.
- No concurrency. Suppliers are processed one at a time, in a fixed order,
  and later suppliers see the updates of earlier ones within the same sweep.

The loop control underneath is [`refine_det`], a generic deterministic
refinement driver.
*/

/// Result of a [`refine_det`] run.
#[derive(Clone, Debug)]
pub struct Outcome<T, M> {
    pub theta: T,
    /// Metric reported by the last step, `None` when no step ran.
    pub metric: Option<M>,
    pub iters: usize,
    pub converged: bool,
}

/// Deterministic refinement: apply `step` to θ in place until
/// `converged(metric)` holds or `max_iters` steps have run.
///
/// `step` receives the 1-based iteration index. The first error aborts the
/// run and is returned as is; no step is retried.
pub fn refine_det<T, M, E, Step, Conv>(
    mut theta: T,
    mut step: Step,
    converged: Conv,
    max_iters: usize,
) -> Result<Outcome<T, M>, E>
where
    Step: FnMut(&mut T, usize) -> Result<M, E>,
    Conv: Fn(&M) -> bool,
{
    let mut metric = None;
    for iter in 1..=max_iters {
        let m = step(&mut theta, iter)?;
        let done = converged(&m);
        metric = Some(m);
        if done {
            return Ok(Outcome {
                theta,
                metric,
                iters: iter,
                converged: true,
            });
        }
    }
    Ok(Outcome {
        theta,
        metric,
        iters: max_iters,
        converged: false,
    })
}

pub mod cournot;
pub mod error;
pub mod market;
pub mod mechanics;
pub mod report;
pub mod state;

#[cfg(feature = "market-linear")]
pub mod config;

pub use cournot::{
    Baseline, BestResponse, EngineState, Equilibrium, EquilibriumOptions, IterationSummary, Termination,
    TerminationKind, run_cournot,
};
pub use error::{EquilibriumError, Phase};
pub use market::sdk::{
    IterationHistory, ModelBuilder, Observer, SolveOutcome, SolvedModel, Solver, StrategicModel,
    SupplierUpdate,
};
pub use state::{SalesVector, StrategyState, SupplierId};
