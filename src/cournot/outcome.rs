//! Sweep summaries and run results.

use serde::Serialize;

use crate::state::StrategyState;

/// Summary of one best-response sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IterationSummary {
    /// 1-based sweep index.
    pub iteration: usize,
    /// Max absolute componentwise change over all suppliers in this sweep.
    pub max_change: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationKind {
    Converged,
    ExhaustedBudget,
}

/// How the iteration phase ended. Budget exhaustion is not an error, but it is
/// never reported as convergence either.
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    Converged {
        state: StrategyState,
        iterations: usize,
        max_change: f64,
    },
    ExhaustedBudget {
        state: StrategyState,
        iterations: usize,
        max_change: f64,
    },
}

impl Termination {
    pub fn kind(&self) -> TerminationKind {
        match self {
            Self::Converged { .. } => TerminationKind::Converged,
            Self::ExhaustedBudget { .. } => TerminationKind::ExhaustedBudget,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    pub fn state(&self) -> &StrategyState {
        match self {
            Self::Converged { state, .. } | Self::ExhaustedBudget { state, .. } => state,
        }
    }

    pub fn into_state(self) -> StrategyState {
        match self {
            Self::Converged { state, .. } | Self::ExhaustedBudget { state, .. } => state,
        }
    }

    pub fn iterations(&self) -> usize {
        match self {
            Self::Converged { iterations, .. } | Self::ExhaustedBudget { iterations, .. } => {
                *iterations
            }
        }
    }

    /// `max_change` of the last sweep.
    pub fn max_change(&self) -> f64 {
        match self {
            Self::Converged { max_change, .. } | Self::ExhaustedBudget { max_change, .. } => {
                *max_change
            }
        }
    }
}

/// Final result of a run.
#[derive(Clone, Debug)]
pub struct Equilibrium<S> {
    /// Strategy state extracted from the centralized baseline solve.
    pub baseline: StrategyState,
    /// Solution of the centralized baseline model.
    pub baseline_solution: S,
    pub termination: Termination,
    /// Solution of the final model with every strategic supplier pinned.
    pub solution: S,
    pub history: Vec<IterationSummary>,
}

impl<S> Equilibrium<S> {
    pub fn state(&self) -> &StrategyState {
        self.termination.state()
    }

    pub fn is_converged(&self) -> bool {
        self.termination.is_converged()
    }
}
