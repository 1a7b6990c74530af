//! Error types for the equilibrium loop.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::state::SupplierId;

/// Run phase an error was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Baseline,
    Iteration,
    Finalization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Baseline => "baseline",
            Self::Iteration => "iteration",
            Self::Finalization => "finalization",
        };
        f.write_str(s)
    }
}

/// Where a solve happened: phase, plus supplier and iteration inside the loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveContext {
    pub phase: Phase,
    pub supplier: Option<SupplierId>,
    pub iteration: Option<usize>,
}

impl SolveContext {
    pub fn baseline() -> Self {
        Self { phase: Phase::Baseline, supplier: None, iteration: None }
    }

    pub fn iteration(supplier: &SupplierId, iteration: usize) -> Self {
        Self {
            phase: Phase::Iteration,
            supplier: Some(supplier.clone()),
            iteration: Some(iteration),
        }
    }

    pub fn finalization() -> Self {
        Self { phase: Phase::Finalization, supplier: None, iteration: None }
    }
}

impl fmt::Display for SolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} phase", self.phase)?;
        if let Some(supplier) = &self.supplier {
            write!(f, ", supplier `{supplier}`")?;
        }
        if let Some(iteration) = self.iteration {
            write!(f, ", iteration {iteration}")?;
        }
        Ok(())
    }
}

/// Errors that abort an equilibrium run. All of them are fatal.
#[derive(Debug, Error)]
pub enum EquilibriumError {
    /// The centralized baseline model has no feasible solution.
    #[error("baseline model is infeasible; no strategic iteration attempted")]
    BaselineInfeasible,

    /// A supplier's best-response submodel has no feasible solution.
    #[error("best-response submodel for supplier `{supplier}` is infeasible in iteration {iteration}")]
    SubproblemInfeasible { supplier: SupplierId, iteration: usize },

    /// The solver failed outright.
    #[error("solver failed ({context}): {reason}")]
    SolverError { context: SolveContext, reason: String },

    /// A best response contained NaN or an infinity. Nothing was written.
    #[error(
        "non-finite sales value {value} at index {index} for supplier `{supplier}` in iteration {iteration}"
    )]
    NonFiniteUpdate {
        supplier: SupplierId,
        iteration: usize,
        index: usize,
        value: f64,
    },

    /// The baseline solve produced a non-finite sales value.
    #[error("non-finite baseline sales value {value} at index {index} for supplier `{supplier}`")]
    NonFiniteBaseline {
        supplier: SupplierId,
        index: usize,
        value: f64,
    },

    /// The final model with every strategic supplier pinned is infeasible.
    #[error("final model with all strategic sales fixed is infeasible")]
    FinalizationInfeasible,

    /// A solution did not carry sales for a supplier.
    #[error("solution carries no sales for supplier `{supplier}` ({context})")]
    MissingSales { supplier: SupplierId, context: SolveContext },

    /// A best response changed the dimensionality of a supplier's sales.
    #[error(
        "sales for supplier `{supplier}` have {found} entries in iteration {iteration}, expected {expected}"
    )]
    DimensionMismatch {
        supplier: SupplierId,
        iteration: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid equilibrium options: {0}")]
    InvalidOptions(String),

    #[error("invalid processing order: {0}")]
    InvalidOrder(String),

    #[error("no strategic suppliers configured")]
    NoStrategicSuppliers,

    #[error("duplicate strategic supplier `{0}`")]
    DuplicateSupplier(SupplierId),

    #[error("unknown strategic supplier `{0}`")]
    UnknownSupplier(SupplierId),
}

impl EquilibriumError {
    /// Phase the run failed in, when the error came from a solve phase.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::BaselineInfeasible | Self::NonFiniteBaseline { .. } => Some(Phase::Baseline),
            Self::SubproblemInfeasible { .. }
            | Self::NonFiniteUpdate { .. }
            | Self::DimensionMismatch { .. } => Some(Phase::Iteration),
            Self::FinalizationInfeasible => Some(Phase::Finalization),
            Self::SolverError { context, .. } | Self::MissingSales { context, .. } => {
                Some(context.phase)
            }
            _ => None,
        }
    }

    pub fn supplier(&self) -> Option<&SupplierId> {
        match self {
            Self::SubproblemInfeasible { supplier, .. }
            | Self::NonFiniteUpdate { supplier, .. }
            | Self::NonFiniteBaseline { supplier, .. }
            | Self::MissingSales { supplier, .. }
            | Self::DimensionMismatch { supplier, .. } => Some(supplier),
            Self::SolverError { context, .. } => context.supplier.as_ref(),
            Self::DuplicateSupplier(supplier) | Self::UnknownSupplier(supplier) => Some(supplier),
            _ => None,
        }
    }

    pub fn iteration(&self) -> Option<usize> {
        match self {
            Self::SubproblemInfeasible { iteration, .. }
            | Self::NonFiniteUpdate { iteration, .. }
            | Self::DimensionMismatch { iteration, .. } => Some(*iteration),
            Self::SolverError { context, .. } | Self::MissingSales { context, .. } => {
                context.iteration
            }
            _ => None,
        }
    }
}
