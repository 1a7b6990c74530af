//! Best-response (Cournot) equilibrium loop.
//!
//! - [`options`]: run parameters and their validation.
//! - [`outcome`]: iteration summaries and the tagged termination result.
//! - [`engine`]: baseline → sweeps → finalization.

pub mod engine;
pub mod options;
pub mod outcome;

pub use engine::{Baseline, BestResponse, EngineState, run_cournot};
pub use options::EquilibriumOptions;
pub use outcome::{Equilibrium, IterationSummary, Termination, TerminationKind};
